//! HTTP API server.
//!
//! Exposes the chat and document surface over JSON, with the answer itself
//! returned as plain text so clients can render it incrementally.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/message` | Ask a question against a document (plain-text answer) |
//! | `POST` | `/api/documents` | Upload and ingest a document (multipart) |
//! | `GET`  | `/api/documents` | List the caller's documents |
//! | `GET`  | `/api/documents/{id}` | Fetch one document |
//! | `GET`  | `/api/documents/{id}/messages` | Full conversation log for a document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! All `/api` endpoints require `Authorization: Bearer <token>`; tokens are
//! minted with `pagewise token create`.
//!
//! # Error Contract
//!
//! Error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found" } }
//! ```
//!
//! Error codes: `unauthenticated` (401), `bad_request` (400), `not_found`
//! (404), `retrieval_unavailable` (503), `synthesis_failed` (502),
//! `internal` (500). Bodies for 5xx responses carry a generic message; the
//! underlying detail goes to the log only.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend can
//! talk to the API directly.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth;
use crate::completion::create_completion_model;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedding_provider, EmbeddingProvider};
use crate::error::ChatError;
use crate::index::VectorIndex;
use crate::ingest;
use crate::models::{Document, Message, UploadStatus};
use crate::pipeline::ChatPipeline;
use crate::retrieval::VectorRetriever;
use crate::store::{ConversationStore, DocumentStore};
use crate::synthesis::Synthesizer;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    documents: DocumentStore,
    conversation: ConversationStore,
    embedder: Arc<dyn EmbeddingProvider>,
    pipeline: Arc<ChatPipeline>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. Assumes `pagewise init` has been run against the
/// configured database.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    init_tracing();

    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let pool = db::connect(&config).await?;

    let embedder = create_embedding_provider(&config.embedding)?;
    let model = create_completion_model(&config.completion)?;

    let retriever = Arc::new(VectorRetriever::new(
        embedder.clone(),
        VectorIndex::new(pool.clone()),
    ));
    let pipeline = Arc::new(ChatPipeline::new(
        DocumentStore::new(pool.clone()),
        ConversationStore::new(pool.clone()),
        retriever,
        Synthesizer::new(model),
        config.chat.history_limit,
        config.chat.top_k,
    ));

    let state = AppState {
        config: config.clone(),
        pool: pool.clone(),
        documents: DocumentStore::new(pool.clone()),
        conversation: ConversationStore::new(pool),
        embedder,
        pipeline,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Body limit sits above the configured upload cap so oversized uploads
    // get our 400 with a reason instead of a bare 413.
    let body_limit = config.uploads.max_bytes + 1024 * 1024;

    let app = Router::new()
        .route("/api/message", post(handle_send_message))
        .route(
            "/api/documents",
            post(handle_upload_document).get(handle_list_documents),
        )
        .route("/api/documents/{id}", get(handle_get_document))
        .route("/api/documents/{id}/messages", get(handle_list_messages))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    println!("pagewise server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagewise=info"));
    // try_init so embedding the server in tests cannot panic on double init
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 404 Not Found error.
fn not_found() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: "document not found".to_string(),
    }
}

/// Constructs a generic 500, logging the underlying cause.
fn internal_error(err: anyhow::Error) -> AppError {
    tracing::error!(error = format!("{err:#}"), "internal error");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: "internal error".to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Unauthenticated => AppError {
                status: StatusCode::UNAUTHORIZED,
                code: "unauthenticated".to_string(),
                message: "unauthenticated".to_string(),
            },
            ChatError::NotFound => not_found(),
            ChatError::Validation(message) => bad_request(message),
            ChatError::RetrievalUnavailable(detail) => {
                tracing::error!(error = %detail, "retrieval unavailable");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "retrieval_unavailable".to_string(),
                    message: "retrieval is unavailable for this document".to_string(),
                }
            }
            ChatError::SynthesisFailed(detail) => {
                tracing::error!(error = %detail, "synthesis failed");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "synthesis_failed".to_string(),
                    message: "answer synthesis failed".to_string(),
                }
            }
            ChatError::PersistenceFailed(e) => {
                tracing::error!(error = %e, "store operation failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

// ============ Response shapes ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentResponse {
    id: String,
    name: String,
    status: UploadStatus,
    created_at: i64,
    updated_at: i64,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    id: String,
    text: String,
    is_user_message: bool,
    created_at: i64,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            text: message.text,
            is_user_message: message.is_user_message,
            created_at: message.created_at,
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/message ============

/// JSON request body for `POST /api/message`.
#[derive(Deserialize)]
struct SendMessageBody {
    #[serde(rename = "fileId")]
    file_id: String,
    message: String,
}

/// Handler for `POST /api/message`.
///
/// Runs one chat turn and returns the synthesized answer as a plain-text
/// body. Errors follow the JSON error contract.
async fn handle_send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SendMessageBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let user_id = auth::authenticate(&state.pool, &headers).await?;

    let Json(body) = body.map_err(|e| bad_request(format!("invalid request body: {e}")))?;

    let answer = state
        .pipeline
        .answer(&user_id, &body.file_id, &body.message)
        .await?;

    Ok(answer.into_response())
}

// ============ POST /api/documents ============

/// Handler for `POST /api/documents`.
///
/// Accepts a multipart form with a `file` part (and an optional `name` part
/// overriding the display name) and ingests it inline. The response reports
/// the terminal status; a `FAILED` ingest still answers `201` with the
/// record so the client can surface what happened.
async fn handle_upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let user_id = auth::authenticate(&state.pool, &headers).await?;

    let mut file_name: Option<String> = None;
    let mut name_override: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or_default().to_string().as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {e}")))?;
                bytes = Some(data.to_vec());
            }
            "name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("failed to read name field: {e}")))?;
                if !text.trim().is_empty() {
                    name_override = Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    if file_name.is_none() {
        return Err(bad_request("multipart field 'file' with a filename is required"));
    }
    // The display name decides the format; an override must keep a supported
    // extension or validation below rejects it.
    let file_name = match name_override {
        Some(name) => name,
        None => file_name.unwrap_or_default(),
    };
    let bytes = bytes.unwrap_or_default();

    ingest::validate_upload(&state.config, &file_name, bytes.len())?;

    let outcome = ingest::ingest_document(
        &state.pool,
        state.embedder.clone(),
        &state.config,
        &user_id,
        &file_name,
        &bytes,
    )
    .await
    .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::from(outcome.document)),
    ))
}

// ============ GET /api/documents ============

/// JSON response body for `GET /api/documents`.
#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentResponse>,
}

/// Handler for `GET /api/documents`.
async fn handle_list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DocumentListResponse>, AppError> {
    let user_id = auth::authenticate(&state.pool, &headers).await?;

    let documents = state
        .documents
        .list_for_user(&user_id)
        .await
        .map_err(ChatError::from)?;

    Ok(Json(DocumentListResponse {
        documents: documents.into_iter().map(DocumentResponse::from).collect(),
    }))
}

// ============ GET /api/documents/{id} ============

/// Handler for `GET /api/documents/{id}`.
///
/// Not-owned and nonexistent are both `404`.
async fn handle_get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    let user_id = auth::authenticate(&state.pool, &headers).await?;

    let document = state
        .documents
        .find_owned(&id, &user_id)
        .await
        .map_err(ChatError::from)?
        .ok_or_else(not_found)?;

    Ok(Json(DocumentResponse::from(document)))
}

// ============ GET /api/documents/{id}/messages ============

/// JSON response body for `GET /api/documents/{id}/messages`.
#[derive(Serialize)]
struct MessageListResponse {
    messages: Vec<MessageResponse>,
}

/// Handler for `GET /api/documents/{id}/messages`.
///
/// Returns the full conversation log oldest first, gated on ownership like
/// every other document endpoint.
async fn handle_list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MessageListResponse>, AppError> {
    let user_id = auth::authenticate(&state.pool, &headers).await?;

    state
        .documents
        .find_owned(&id, &user_id)
        .await
        .map_err(ChatError::from)?
        .ok_or_else(not_found)?;

    let messages = state
        .conversation
        .list(&id)
        .await
        .map_err(ChatError::from)?;

    Ok(Json(MessageListResponse {
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}
