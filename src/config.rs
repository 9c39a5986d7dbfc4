use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_MAX_SESSIONS: usize = 256;
const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed for this process.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the Rusty DocQA server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key for the Gemini embedding and generation endpoints.
    pub api_key: Option<String>,
    /// Base URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Generative model answering questions.
    pub generation_model: String,
    /// Decoding temperature for answer generation.
    pub generation_temperature: f32,
    /// Maximum characters per chunk.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Backend storing chunk vectors.
    pub vector_backend: VectorBackend,
    /// Base URL of the Qdrant instance, required for the Qdrant backend.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Prefix for per-session Qdrant collections.
    pub qdrant_collection_prefix: String,
    /// Directory uploaded files are written to.
    pub upload_dir: PathBuf,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
    /// Sessions kept in memory before the least recently used are evicted.
    pub max_sessions: usize,
    /// Seconds a session may sit unused before it is evicted.
    pub session_idle_secs: u64,
    /// Tesseract executable.
    pub tesseract_bin: String,
    /// Poppler `pdftoppm` executable.
    pub pdftoppm_bin: String,
    /// Tesseract language pack.
    pub ocr_language: String,
    /// Rasterization resolution for PDF pages.
    pub pdf_render_dpi: u32,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Gemini embeddings API.
    Gemini,
    /// Deterministic in-process hashing embeddings, useful offline.
    Local,
}

/// Storage used for the similarity index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Brute-force cosine search in process memory.
    Memory,
    /// Remote Qdrant collections.
    Qdrant,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = load_env_optional("EMBEDDING_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))
            })
            .transpose()?
            .unwrap_or(EmbeddingProvider::Gemini);
        let vector_backend = load_env_optional("VECTOR_BACKEND")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("VECTOR_BACKEND".to_string()))
            })
            .transpose()?
            .unwrap_or(VectorBackend::Memory);

        let config = Self {
            api_key: load_env_optional("API_KEY"),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", 768)?,
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            generation_temperature: parse_env_or("GENERATION_TEMPERATURE", 0.3)?,
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", 1000)?,
            text_splitter_chunk_overlap: parse_env_or("TEXT_SPLITTER_CHUNK_OVERLAP", 150)?,
            retrieval_top_k: parse_env_or("RETRIEVAL_TOP_K", 3)?,
            vector_backend,
            qdrant_url: load_env_optional("QDRANT_URL"),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_prefix: load_env_optional("QDRANT_COLLECTION_PREFIX")
                .unwrap_or_else(|| "docqa".to_string()),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("files")),
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_sessions: parse_env_or("MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
            session_idle_secs: parse_env_or("SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?,
            tesseract_bin: load_env_optional("TESSERACT_BIN")
                .unwrap_or_else(|| "tesseract".to_string()),
            pdftoppm_bin: load_env_optional("PDFTOPPM_BIN")
                .unwrap_or_else(|| "pdftoppm".to_string()),
            ocr_language: load_env_optional("OCR_LANGUAGE").unwrap_or_else(|| "eng".to_string()),
            pdf_render_dpi: parse_env_or("PDF_RENDER_DPI", 200)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that individual parsers cannot see.
    ///
    /// Answers always come from Gemini, so `API_KEY` is required whatever the embedding provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            return Err(ConfigError::MissingVariable("API_KEY".to_string()));
        }
        if self.vector_backend == VectorBackend::Qdrant && self.qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".to_string()));
        }
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_SIZE".to_string(),
            ));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".to_string(),
            ));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".to_string()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue("MAX_SESSIONS".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    /// Offline defaults: local embeddings and in-memory vectors. No API key is set, so these
    /// defaults only validate once one is supplied.
    fn default() -> Self {
        Self {
            api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            embedding_provider: EmbeddingProvider::Local,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: 768,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_temperature: 0.3,
            text_splitter_chunk_size: 1000,
            text_splitter_chunk_overlap: 150,
            retrieval_top_k: 3,
            vector_backend: VectorBackend::Memory,
            qdrant_url: None,
            qdrant_api_key: None,
            qdrant_collection_prefix: "docqa".to_string(),
            upload_dir: PathBuf::from("files"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
            tesseract_bin: "tesseract".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            ocr_language: "eng".to_string(),
            pdf_render_dpi: 200,
            server_port: None,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<(), ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        vector_backend = ?config.vector_backend,
        upload_dir = %config.upload_dir.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}
