//! HTTP surface for Rusty DocQA.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /upload/` – Multipart upload with a `file` part. Stores the file, extracts its text
//!   (OCR for PDFs and images, verbatim for CSV), and returns `{ "filename", "text" }`.
//! - `POST /chat/` – JSON `{ "q": "..." }`. Answers from the most recent upload of the session
//!   and returns `{ "answer" }`.
//! - `GET /health` – Liveness check.
//! - `GET /metrics` – Upload, indexing, and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools.
//!
//! Sessions are selected with the optional `x-session-id` header (default `default`). Errors are
//! returned as `{ "error": "..." }` with a status code describing the failure class.

use crate::extraction::ExtractionError;
use crate::processing::{ProcessingApi, ProcessingError};
use crate::session::SessionId;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartError,
        rejection::JsonRejection,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Header carrying the client's session identifier.
pub const SESSION_HEADER: &str = "x-session-id";

/// Build the HTTP router exposing the document QA surface.
///
/// `max_upload_bytes` caps request bodies read through the multipart extractor.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/upload/", post(upload_document::<S>))
        .route("/upload", post(upload_document::<S>))
        .route("/chat/", post(chat::<S>))
        .route("/chat", post(chat::<S>))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Browser clients send credentials, which rules out wildcards; mirror the request instead.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Success response for `POST /upload/`.
#[derive(Serialize)]
struct UploadResponse {
    /// Stored filename.
    filename: String,
    /// Extracted text, verbatim.
    text: String,
}

/// Store an upload and return its extracted text.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: ProcessingApi,
{
    let session = session_from_headers(&headers)?;
    let (filename, bytes) = read_file_part(&mut multipart).await?;
    let outcome = service
        .upload_document(&session, &filename, &bytes)
        .await?;
    tracing::info!(
        session = %session,
        filename = %outcome.filename,
        characters = outcome.text.chars().count(),
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        filename: outcome.filename,
        text: outcome.text,
    }))
}

/// Return the first part named `file` (or carrying a filename) with its contents.
async fn read_file_part(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("file part has no filename".into()))?;
        let bytes = field.bytes().await?;
        return Ok((filename, bytes));
    }
    Err(AppError::BadRequest(
        "multipart body has no `file` part".into(),
    ))
}

/// Request body for `POST /chat/`.
#[derive(Deserialize)]
struct ChatRequest {
    /// Question text.
    q: String,
}

/// Success response for `POST /chat/`.
#[derive(Serialize)]
struct ChatResponse {
    /// Generator output, verbatim.
    answer: String,
}

/// Answer a question from the session's current document.
async fn chat<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: ProcessingApi,
{
    let session = session_from_headers(&headers)?;
    let Json(request) = payload?;
    let outcome = service.ask(&session, &request.q).await?;
    tracing::info!(
        session = %session,
        index_rebuilt = outcome.index_rebuilt,
        context_chunks = outcome.context_chunks,
        "Chat request completed"
    );
    Ok(Json(ChatResponse {
        answer: outcome.answer,
    }))
}

fn session_from_headers(headers: &HeaderMap) -> Result<SessionId, AppError> {
    let Some(value) = headers.get(SESSION_HEADER) else {
        return Ok(SessionId::default());
    };
    let raw = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{SESSION_HEADER} must be ASCII")))?;
    SessionId::parse(raw.trim()).map_err(|err| AppError::Processing(err.into()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload/",
                description: "Multipart upload (`file` part) of a .pdf, .png, .jpg, .jpeg, or .csv file. Response returns { \"filename\": string, \"text\": string } with the extracted text.",
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat/",
                description: "Answer a question from the most recent upload of the session (`x-session-id` header, default `default`). Response returns { \"answer\": string }.",
                request_example: Some(json!({ "q": "What is the invoice total?" })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness check returning { \"status\": \"ok\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload, indexing, and question counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Processing(ProcessingError),
    Multipart(MultipartError),
    Json(JsonRejection),
    BadRequest(String),
}

fn status_for(error: &ProcessingError) -> StatusCode {
    match error {
        ProcessingError::InvalidFilename(_)
        | ProcessingError::Session(_)
        | ProcessingError::EmptyQuestion => StatusCode::BAD_REQUEST,
        ProcessingError::NoDocument => StatusCode::CONFLICT,
        ProcessingError::EmptyDocument => StatusCode::UNPROCESSABLE_ENTITY,
        ProcessingError::Extraction(inner) => match inner {
            ExtractionError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ExtractionError::InvalidText { .. }
            | ExtractionError::ToolFailed { .. }
            | ExtractionError::NoPages { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionError::ToolUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ExtractionError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ProcessingError::Embedding(_)
        | ProcessingError::VectorStore(_)
        | ProcessingError::Generation(_) => StatusCode::BAD_GATEWAY,
        ProcessingError::Storage { .. } | ProcessingError::Chunking(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Processing(error) => (status_for(&error), error.to_string()),
            Self::Multipart(error) => (error.status(), error.body_text()),
            Self::Json(rejection) => (rejection.status(), rejection.body_text()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}

impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        Self::Json(inner)
    }
}
