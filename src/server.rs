//! HTTP API.
//!
//! Exposes the query agent, the persona store and the document corpus as a
//! JSON API, plus the static web interface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Web interface (`static/index.html`) |
//! | `GET`  | `/static/*` | Static assets |
//! | `GET`  | `/health` | Status, version and agent state |
//! | `POST` | `/api/query` | Answer a legal query |
//! | `GET`  | `/api/context` | Current persona |
//! | `PUT`  | `/api/context` | Merge keys into the persona |
//! | `POST` | `/api/documents/upload` | Upload a document (multipart field `file`) |
//! | `GET`  | `/api/documents` | List documents |
//! | `DELETE` | `/api/documents/{filename}` | Delete a document |
//!
//! Uploads and deletes rebuild the retrieval index before responding.
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "invalid input: query must not be empty" }
//! ```
//!
//! Invalid input, malformed JSON bodies and disallowed file types → 400,
//! missing documents or assets → 404, everything else → 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the web interface can
//! be served from elsewhere.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::agent::{AgentHandle, AgentState};
use crate::config::{prepare_document_dir, Config};
use crate::corpus::{Corpus, DocumentInfo};
use crate::error::LegalRagError;
use crate::persona::{Persona, PersonaStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<AgentHandle>,
    pub corpus: Corpus,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(agent: Arc<AgentHandle>, config: &Config) -> Self {
        Self {
            agent,
            corpus: Corpus::new(&config.documents.dir),
            static_dir: config.server.static_dir.clone(),
        }
    }

    fn persona(&self) -> &PersonaStore {
        self.agent.persona()
    }
}

/// Builds the router with every route, CORS and the upload size limit.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/query", post(handle_query))
        .route("/api/context", get(handle_get_context).put(handle_update_context))
        .route(
            "/api/documents/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/{filename}", delete(handle_delete_document))
        .nest_service("/static", static_files)
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Prepares the document directory, builds the backends and the first
/// index, then serves on `[server].bind` until Ctrl-C. Configuration and
/// initialization errors abort startup.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    prepare_document_dir(&config.documents.dir)?;

    let config = Arc::new(config);
    let persona = Arc::new(PersonaStore::new(config.persona.clone()));
    let agent = Arc::new(AgentHandle::start(config.clone(), persona).await?);

    let state = AppState::new(agent, &config);
    let app = build_router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "legal RAG server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    /// False when the failure leaves the service unable to answer queries.
    recoverable: bool,
}

impl AppError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            recoverable: true,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("invalid request body: {}", rejection.body_text()),
            recoverable: true,
        }
    }
}

impl From<LegalRagError> for AppError {
    fn from(err: LegalRagError) -> Self {
        let status = match &err {
            LegalRagError::InvalidInput(_) | LegalRagError::UnsupportedType(_) => {
                StatusCode::BAD_REQUEST
            }
            LegalRagError::NotFound(_) => StatusCode::NOT_FOUND,
            LegalRagError::Configuration(_)
            | LegalRagError::Initialization(_)
            | LegalRagError::QueryProcessing(_)
            | LegalRagError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.recoverable {
            error!(status = self.status.as_u16(), message = %self.message, "agent unavailable");
        } else if self.status.is_server_error() {
            warn!(status = self.status.as_u16(), message = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                detail: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct StatusMessage {
    status: &'static str,
    message: String,
}

// ============ GET / ============

async fn handle_index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LegalRagError::NotFound("index.html not found".to_string()).into())
        }
        Err(e) => Err(AppError::internal(format!("failed to read index.html: {}", e))),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    agent_state: AgentState,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        agent_state: state.agent.state(),
    })
}

// ============ POST /api/query ============

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub legal_context: Persona,
}

async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = payload?;
    let response = state.agent.query(&request.query).await?;
    Ok(Json(QueryResponse {
        response,
        legal_context: state.persona().get(),
    }))
}

// ============ GET / PUT /api/context ============

#[derive(Deserialize, Serialize)]
pub struct ContextBody {
    pub legal_context: Persona,
}

async fn handle_get_context(State(state): State<AppState>) -> Json<ContextBody> {
    Json(ContextBody {
        legal_context: state.persona().get(),
    })
}

async fn handle_update_context(
    State(state): State<AppState>,
    payload: Result<Json<ContextBody>, JsonRejection>,
) -> Result<Json<StatusMessage>, AppError> {
    let Json(request) = payload?;
    state.persona().update(request.legal_context)?;
    Ok(Json(StatusMessage {
        status: "success",
        message: "Legal context updated successfully".to_string(),
    }))
}

// ============ Documents ============

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    message: String,
    filename: String,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentInfo>,
}

/// Handler for `POST /api/documents/upload`.
///
/// Reads the multipart field named `file` (or, failing that, the first field
/// carrying a filename), stores it and rebuilds the index.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| LegalRagError::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let is_file_field = field.name() == Some("file");
        let bytes = field
            .bytes()
            .await
            .map_err(|e| LegalRagError::InvalidInput(format!("failed to read upload: {}", e)))?;
        if is_file_field || upload.is_none() {
            upload = Some((filename, bytes));
        }
        if is_file_field {
            break;
        }
    }

    let (filename, bytes) = upload
        .ok_or_else(|| LegalRagError::InvalidInput("no file in upload".to_string()))?;

    let stored = state.corpus.upload(&filename, &bytes)?;
    state.agent.reinitialize().await?;

    Ok(Json(UploadResponse {
        status: "success",
        message: format!("File {} uploaded successfully", stored),
        filename: stored,
    }))
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.corpus.list()?;
    Ok(Json(DocumentListResponse { documents }))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<StatusMessage>, AppError> {
    let deleted = state.corpus.delete(&filename)?;
    state.agent.reinitialize().await?;
    Ok(Json(StatusMessage {
        status: "success",
        message: format!("File {} deleted successfully", deleted),
    }))
}
