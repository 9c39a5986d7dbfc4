//! Per-session document state.
//!
//! Each session holds at most one current document and at most one similarity index. The index
//! records the fingerprint of the text it was built from, so a newer upload makes it stale without
//! any explicit invalidation. Sessions are created on first use and evicted once idle or when the
//! registry grows past its cap.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

/// Session used when a client does not name one.
pub const DEFAULT_SESSION: &str = "default";

const MAX_SESSION_ID_LEN: usize = 64;

/// Errors raised while resolving a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Identifier is empty, too long, or contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid session id {0:?}: expected 1-64 characters from [A-Za-z0-9_-]")]
    InvalidId(String),
}

/// Validated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(SessionError::InvalidId(raw.to_string()))
        }
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(DEFAULT_SESSION.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded SHA-256 digest of `text`.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Extracted text of the most recent successful upload.
#[derive(Debug, Clone)]
pub struct SessionDocument {
    /// Stored filename.
    pub filename: String,
    /// Extracted text.
    pub text: Arc<str>,
    /// Fingerprint of `text`.
    pub fingerprint: String,
    /// Time the upload completed.
    pub uploaded_at: OffsetDateTime,
}

impl SessionDocument {
    /// Wrap freshly extracted text, computing its fingerprint.
    pub fn new(filename: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        Self {
            filename: filename.into(),
            fingerprint: fingerprint(&text),
            text,
            uploaded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Handle to vectors stored for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityIndex {
    /// Vector store namespace holding the chunks.
    pub namespace: String,
    /// Fingerprint of the text the index was built from.
    pub fingerprint: String,
    /// Number of chunks embedded.
    pub chunk_count: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Time the build finished.
    pub built_at: OffsetDateTime,
}

/// State held for one session.
#[derive(Debug)]
pub struct Session {
    namespace: String,
    document: Option<SessionDocument>,
    index: Option<SimilarityIndex>,
}

impl Session {
    /// Empty session whose vectors live under `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            document: None,
            index: None,
        }
    }

    /// Vector store namespace owned by this session.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Current document, if any upload has succeeded.
    pub fn document(&self) -> Option<&SessionDocument> {
        self.document.as_ref()
    }

    /// Make `document` current and return the previous one.
    pub fn replace_document(&mut self, document: SessionDocument) -> Option<SessionDocument> {
        self.document.replace(document)
    }

    /// Index built from the current document, if one exists.
    pub fn fresh_index(&self) -> Option<&SimilarityIndex> {
        let document = self.document.as_ref()?;
        self.index
            .as_ref()
            .filter(|index| index.fingerprint == document.fingerprint)
    }

    /// Record a newly built index.
    pub fn install_index(&mut self, index: SimilarityIndex) {
        self.index = Some(index);
    }
}

/// Bounds on how many sessions the registry keeps and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Sessions kept before the least recently used idle ones are evicted.
    pub max_sessions: usize,
    /// Sessions unused for this long are evicted.
    pub idle_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

/// A session dropped from the registry whose vectors still need removing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedSession {
    /// Identifier the session was registered under.
    pub id: SessionId,
    /// Vector store namespace the session owned.
    pub namespace: String,
}

struct SessionEntry {
    state: Arc<Mutex<Session>>,
    namespace: String,
    last_used: Mutex<Instant>,
    recency: AtomicU64,
}

/// Concurrent map of session id to session state.
///
/// Each session sits behind its own mutex so one session's index build never blocks another.
/// Every session gets a fresh namespace, so vectors of an evicted session can be removed without
/// touching a newer session that reuses its id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    clock: AtomicU64,
    limits: SessionLimits,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(SessionLimits::default())
    }
}

impl SessionRegistry {
    /// Create an empty registry with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with explicit limits.
    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            limits,
        }
    }

    /// Look up an existing session, marking it as used.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id)?;
        self.touch(entry).await;
        Some(entry.state.clone())
    }

    /// Look up a session, creating it when absent.
    pub async fn get_or_create(&self, id: &SessionId) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.get(id).await {
            return existing;
        }
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(id.clone()).or_insert_with(|| {
            let namespace = format!("{id}-{}", Uuid::new_v4().simple());
            tracing::debug!(session = %id, namespace = %namespace, "Session created");
            SessionEntry {
                state: Arc::new(Mutex::new(Session::new(namespace.clone()))),
                namespace,
                last_used: Mutex::new(Instant::now()),
                recency: AtomicU64::new(0),
            }
        });
        self.touch(entry).await;
        entry.state.clone()
    }

    /// Drop sessions idle past the timeout, then the least recently used ones beyond the cap.
    ///
    /// A session whose handle is held by an in-flight request is never evicted.
    pub async fn evict(&self) -> Vec<EvictedSession> {
        let mut sessions = self.sessions.write().await;
        let mut idle = Vec::new();
        for (id, entry) in sessions.iter() {
            if Arc::strong_count(&entry.state) == 1
                && entry.last_used.lock().await.elapsed() >= self.limits.idle_timeout
            {
                idle.push(id.clone());
            }
        }

        let mut evicted: Vec<EvictedSession> = idle
            .into_iter()
            .filter_map(|id| remove_entry(&mut sessions, id))
            .collect();

        while sessions.len() > self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| Arc::strong_count(&entry.state) == 1)
                .min_by_key(|(_, entry)| entry.recency.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            let Some(id) = oldest else {
                break;
            };
            evicted.extend(remove_entry(&mut sessions, id));
        }

        if !evicted.is_empty() {
            tracing::info!(
                evicted = evicted.len(),
                remaining = sessions.len(),
                "Evicted sessions"
            );
        }
        evicted
    }

    /// Number of known sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session has been created yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn touch(&self, entry: &SessionEntry) {
        *entry.last_used.lock().await = Instant::now();
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        entry.recency.store(tick, Ordering::Relaxed);
    }
}

fn remove_entry(
    sessions: &mut HashMap<SessionId, SessionEntry>,
    id: SessionId,
) -> Option<EvictedSession> {
    sessions
        .remove(&id)
        .map(|entry| EvictedSession {
            id,
            namespace: entry.namespace,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_for(document: &SessionDocument) -> SimilarityIndex {
        SimilarityIndex {
            namespace: "default".into(),
            fingerprint: document.fingerprint.clone(),
            chunk_count: 1,
            dimension: 4,
            built_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn session_ids_are_validated() {
        assert!(SessionId::parse("default").is_ok());
        assert!(SessionId::parse("user_42-tab").is_ok());
        assert!(SessionId::parse(&"a".repeat(64)).is_ok());
        let too_long = "a".repeat(65);
        for bad in ["", "has space", "slash/y", "dot.dot", too_long.as_str()] {
            assert!(
                matches!(SessionId::parse(bad), Err(SessionError::InvalidId(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(SessionId::default().as_str(), DEFAULT_SESSION);
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fingerprint("a"), fingerprint("a"));
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }

    #[test]
    fn new_upload_makes_index_stale() {
        let mut session = Session::new("default");
        assert!(session.fresh_index().is_none());

        let first = SessionDocument::new("a.csv", "alpha");
        session.replace_document(first.clone());
        session.install_index(index_for(&first));
        assert!(session.fresh_index().is_some());

        let previous = session.replace_document(SessionDocument::new("b.csv", "beta"));
        assert_eq!(previous.map(|doc| doc.filename), Some("a.csv".into()));
        assert!(session.fresh_index().is_none());
    }

    #[test]
    fn reuploading_identical_text_keeps_index_fresh() {
        let mut session = Session::new("default");
        let document = SessionDocument::new("a.csv", "alpha");
        session.replace_document(document.clone());
        session.install_index(index_for(&document));

        session.replace_document(SessionDocument::new("copy.csv", "alpha"));
        assert!(session.fresh_index().is_some());
    }

    #[tokio::test]
    async fn registry_returns_same_session_for_same_id() {
        let registry = SessionRegistry::new();
        let id = SessionId::parse("s1").unwrap();
        assert!(registry.get(&id).await.is_none());

        let first = registry.get_or_create(&id).await;
        let second = registry.get_or_create(&id).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);

        registry.get_or_create(&SessionId::default()).await;
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn every_session_gets_its_own_namespace() {
        let registry = SessionRegistry::new();
        let alice = registry.get_or_create(&SessionId::parse("alice").unwrap()).await;
        let bob = registry.get_or_create(&SessionId::parse("bob").unwrap()).await;

        let alice_ns = alice.lock().await.namespace().to_string();
        let bob_ns = bob.lock().await.namespace().to_string();
        assert!(alice_ns.starts_with("alice-"));
        assert!(bob_ns.starts_with("bob-"));
        assert_ne!(alice_ns, bob_ns);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_unless_in_use() {
        let registry = SessionRegistry::with_limits(SessionLimits {
            max_sessions: 16,
            idle_timeout: Duration::ZERO,
        });
        let idle = SessionId::parse("idle").unwrap();
        let busy = SessionId::parse("busy").unwrap();
        let idle_ns = {
            let handle = registry.get_or_create(&idle).await;
            let namespace = handle.lock().await.namespace().to_string();
            namespace
        };
        let held = registry.get_or_create(&busy).await;

        let evicted = registry.evict().await;
        assert_eq!(
            evicted,
            vec![EvictedSession {
                id: idle.clone(),
                namespace: idle_ns.clone(),
            }]
        );
        assert!(registry.get(&idle).await.is_none());
        assert!(registry.get(&busy).await.is_some());
        drop(held);

        let recreated = registry.get_or_create(&idle).await;
        assert_ne!(recreated.lock().await.namespace(), idle_ns);
    }

    #[tokio::test]
    async fn least_recently_used_sessions_go_first_past_the_cap() {
        let registry = SessionRegistry::with_limits(SessionLimits {
            max_sessions: 2,
            idle_timeout: Duration::from_secs(3600),
        });
        let ids: Vec<SessionId> = ["a", "b", "c"]
            .into_iter()
            .map(|id| SessionId::parse(id).unwrap())
            .collect();
        for id in &ids {
            registry.get_or_create(id).await;
        }
        registry.get(&ids[0]).await;

        let evicted = registry.evict().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, ids[1]);
        assert_eq!(registry.len().await, 2);
        assert!(registry.evict().await.is_empty());
    }
}
