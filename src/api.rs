//! HTTP surface for docqa.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /load_document/` – Upload a document (multipart `file`) and load it into a session.
//!   Query parameters `start_page`/`end_page` select a PDF page range, `session_id` picks the
//!   session, and `chunk_size` overrides the token budget. The loader is inferred from the file
//!   extension, defaulting to PDF.
//! - `POST /load_txt/`, `POST /load_csv/` – Same as above with the text or CSV loader forced.
//! - `POST /ask_question` – Answer `query` against the session's document.
//! - `POST /summarize` – Summarize the session's document with `chain_type`
//!   (`stuff` | `map_reduce` | `refine`).
//! - `GET /documents` – List uploaded documents.
//! - `GET /sessions/:session_id` – Describe the document loaded into a session.
//! - `GET /metrics` – Observe load, reuse, question, and summary counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! CORS is wide open so browser front ends on any origin can call the API.

use crate::processing::{
    DocumentApi, DocumentEntry, LoadError, LoadOptions, LoadOutcome, LoaderKind, PageRange,
    ProcessingError, SessionInfo, SummaryChain, sanitize::DEFAULT_SESSION_ID,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/load_document/", post(load_document::<S>))
        .route("/load_txt/", post(load_txt::<S>))
        .route("/load_csv/", post(load_csv::<S>))
        .route("/ask_question", post(ask_question::<S>))
        .route("/summarize", post(summarize::<S>))
        .route("/documents", get(list_documents::<S>))
        .route("/sessions/:session_id", get(session_info::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Query parameters shared by the load endpoints.
#[derive(Debug, Default, Deserialize)]
struct LoadParams {
    /// First page to include (zero-based, PDF only).
    #[serde(default)]
    start_page: Option<usize>,
    /// Page after the last one to include (PDF only).
    #[serde(default)]
    end_page: Option<usize>,
    /// Target session (defaults to `"default"`).
    #[serde(default)]
    session_id: Option<String>,
    /// Chunk size override in tokens.
    #[serde(default)]
    chunk_size: Option<usize>,
}

/// Success response for the load endpoints.
#[derive(Serialize)]
struct LoadResponse {
    message: &'static str,
    #[serde(flatten)]
    outcome: LoadOutcome,
}

async fn load_document<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<LoadParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Json<LoadResponse>, AppError>
where
    S: DocumentApi,
{
    let params = query_params(params)?;
    load_upload(service.as_ref(), params, multipart, None).await
}

async fn load_txt<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<LoadParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Json<LoadResponse>, AppError>
where
    S: DocumentApi,
{
    let params = query_params(params)?;
    load_upload(service.as_ref(), params, multipart, Some(LoaderKind::Text)).await
}

async fn load_csv<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<LoadParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Json<LoadResponse>, AppError>
where
    S: DocumentApi,
{
    let params = query_params(params)?;
    load_upload(service.as_ref(), params, multipart, Some(LoaderKind::Csv)).await
}

/// Store the multipart `file` field, then load it into the requested session.
async fn load_upload<S>(
    service: &S,
    params: LoadParams,
    mut multipart: Multipart,
    forced_kind: Option<LoaderKind>,
) -> Result<Json<LoadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(err.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = upload else {
        return Err(AppError::BadRequest("missing multipart field 'file'".into()));
    };

    let session_id = params.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
    let path = service.store_upload(session_id, &file_name, &bytes).await?;
    let kind = forced_kind.unwrap_or_else(|| LoaderKind::from_path(&path).unwrap_or(LoaderKind::Pdf));
    let page_range = PageRange {
        start: params.start_page,
        end: params.end_page,
    };
    let options = LoadOptions {
        kind: Some(kind),
        page_range: (!page_range.is_unbounded()).then_some(page_range),
        chunk_size: params.chunk_size,
    };
    let outcome = service.load_document(session_id, &path, options).await?;
    tracing::info!(
        session = %outcome.session_id,
        source = %outcome.source,
        chunks = outcome.chunk_count,
        rebuilt = outcome.rebuilt,
        "Load request completed"
    );
    Ok(Json(LoadResponse {
        message: "Document loaded successfully.",
        outcome,
    }))
}

/// Unwrap query parameters, reporting malformed ones through the JSON error body.
fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Query parameters for `POST /ask_question`.
#[derive(Debug, Deserialize)]
struct AskParams {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<String>,
}

async fn ask_question<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<AskParams>, QueryRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: DocumentApi,
{
    let params = query_params(params)?;
    let session_id = params.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
    let query = params.query.unwrap_or_default();
    let answer = service.ask_question(session_id, &query).await?;
    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
    }))
}

/// Query parameters for `POST /summarize`.
#[derive(Debug, Deserialize)]
struct SummarizeParams {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    chain_type: Option<String>,
}

#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
    chain_type: SummaryChain,
}

async fn summarize<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<SummarizeParams>, QueryRejection>,
) -> Result<Json<SummarizeResponse>, AppError>
where
    S: DocumentApi,
{
    let params = query_params(params)?;
    let chain = match params.chain_type.as_deref() {
        Some(raw) => raw.parse::<SummaryChain>().map_err(AppError::BadRequest)?,
        None => SummaryChain::default(),
    };
    let session_id = params.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
    let summary = service.summarize(session_id, chain).await?;
    Ok(Json(SummarizeResponse {
        summary,
        chain_type: chain,
    }))
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentEntry>,
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: DocumentApi,
{
    let documents = service.list_documents().await?;
    Ok(Json(DocumentsResponse { documents }))
}

async fn session_info<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, AppError>
where
    S: DocumentApi,
{
    service
        .session_info(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no document loaded in session '{session_id}'")))
}

/// Return the service counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: DocumentApi,
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

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "load_document",
                method: "POST",
                path: "/load_document/",
                description: "Upload a document as multipart field 'file' and load it into a session. The persisted index is reused when the document content is unchanged.",
                request_example: Some(json!({
                    "query": { "start_page": 0, "end_page": 10, "session_id": "default" },
                    "multipart": { "file": "report.pdf" }
                })),
            },
            CommandDescriptor {
                name: "load_txt",
                method: "POST",
                path: "/load_txt/",
                description: "Upload and load a plain text document.",
                request_example: None,
            },
            CommandDescriptor {
                name: "load_csv",
                method: "POST",
                path: "/load_csv/",
                description: "Upload and load a CSV document, one row per chunk.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask_question",
                method: "POST",
                path: "/ask_question",
                description: "Answer a question about the session's document using retrieved chunks.",
                request_example: Some(json!({
                    "query": { "query": "What is the main finding?", "session_id": "default" }
                })),
            },
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Summarize the session's document with chain_type stuff, map_reduce, or refine.",
                request_example: Some(json!({
                    "query": { "session_id": "default", "chain_type": "map_reduce" }
                })),
            },
            CommandDescriptor {
                name: "documents",
                method: "GET",
                path: "/documents",
                description: "List uploaded documents available for loading.",
                request_example: None,
            },
            CommandDescriptor {
                name: "session",
                method: "GET",
                path: "/sessions/:session_id",
                description: "Describe the document loaded into a session, including its content fingerprint.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return load, index reuse, question, and summary counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Processing(ProcessingError),
    BadRequest(String),
    NotFound(String),
}

fn status_for(error: &ProcessingError) -> StatusCode {
    match error {
        ProcessingError::FeatureDisabled(_) => StatusCode::FORBIDDEN,
        ProcessingError::Load(LoadError::Io { .. } | LoadError::Task(_))
        | ProcessingError::Storage { .. }
        | ProcessingError::Index(_)
        | ProcessingError::Retrieval(_)
        | ProcessingError::Embedding(_)
        | ProcessingError::Chat(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ProcessingError::Load(_)
        | ProcessingError::UnsupportedFormat(_)
        | ProcessingError::InvalidUpload(_)
        | ProcessingError::EmptyDocument
        | ProcessingError::NoDocumentLoaded
        | ProcessingError::EmptyQuery => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Processing(error) => {
                let status = status_for(&error);
                if status.is_server_error() {
                    tracing::error!(error = %error, "Request failed");
                }
                (status, error.to_string())
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}
