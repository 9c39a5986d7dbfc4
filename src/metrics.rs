use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload and question activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_uploaded: AtomicU64,
    index_builds: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    sessions_evicted: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully extracted upload.
    pub fn record_upload(&self) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a similarity index build and the number of chunks it embedded.
    pub fn record_index_build(&self, chunk_count: u64) {
        self.index_builds.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record sessions dropped by eviction.
    pub fn record_evictions(&self, count: u64) {
        self.sessions_evicted.fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            index_builds: self.index_builds.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Uploads whose text was extracted since startup.
    pub documents_uploaded: u64,
    /// Similarity indexes built (first builds and rebuilds).
    pub index_builds: u64,
    /// Total chunks embedded across all index builds.
    pub chunks_indexed: u64,
    /// Questions answered by the generator.
    pub questions_answered: u64,
    /// Sessions evicted for idleness or to stay under the cap.
    pub sessions_evicted: u64,
}
