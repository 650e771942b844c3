//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST`   | `/chat` | Stream a reply grounded in the stored documents |
//! | `GET`    | `/documents` | List stored documents, newest first |
//! | `DELETE` | `/documents?id=<id>` | Delete one document |
//! | `POST`   | `/upload` | Ingest a multipart `file` field |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every non-200 response carries `{ "error": "<message>" }`. Status codes
//! follow the error kind: validation 400, extraction 422, persistence 500,
//! embedding and generation services 502.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use ragchat_core::chat::ChatOrchestrator;
use ragchat_core::ingest::{Ingestor, Upload};
use ragchat_core::models::{ChatMessage, DocumentSummary};
use ragchat_core::store::DocumentStore;
use ragchat_core::RagError;

use crate::config::Config;
use crate::services::Services;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
    ingestor: Ingestor,
    chat: Arc<ChatOrchestrator>,
}

impl AppState {
    fn new(services: &Services) -> Self {
        Self {
            store: services.store.clone(),
            ingestor: services.ingestor(),
            chat: Arc::new(services.orchestrator()),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn router(services: &Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id));

    Router::new()
        .route("/chat", post(handle_chat))
        .route(
            "/documents",
            get(handle_list_documents).delete(handle_delete_document),
        )
        .route("/upload", post(handle_upload))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(services.config.server.max_upload_bytes))
        .layer(cors)
        .layer(middleware)
        .with_state(AppState::new(services))
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::open(config).await?;
    let app = router(&services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("ragchat listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RagError::Embedding(_) | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(kind = err.kind(), error = %err, "request failed");
        } else {
            tracing::warn!(kind = err.kind(), error = %err, "request rejected");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    system_prompt: Option<String>,
}

/// Handler for `POST /chat`.
///
/// The first stream item is awaited before the status line is committed so
/// a generation service that fails to start yields a 502 instead of an
/// empty 200. Later failures abort the body after the tokens already sent.
async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    let turn = state
        .chat
        .converse(&req.messages, req.system_prompt.as_deref())
        .await?;

    let mut tokens = turn.tokens;
    let first = match tokens.next().await {
        Some(Ok(text)) => Some(text),
        Some(Err(err)) => return Err(err.into()),
        None => None,
    };

    let body = futures::stream::iter(first.map(Ok))
        .chain(tokens)
        .map(|item| {
            item.map_err(|err| {
                tracing::error!(kind = err.kind(), error = %err, "generation interrupted");
                std::io::Error::other(err.to_string())
            })
        });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.store.list().await?;
    Ok(Json(DocumentListResponse { documents }))
}

// ============ DELETE /documents ============

#[derive(Deserialize)]
struct DeleteParams {
    id: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    found: bool,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = params
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RagError::validation("missing document id"))?;

    let outcome = state.store.delete(id).await?;
    tracing::info!(%id, found = outcome.found, "document deleted");
    Ok(Json(DeleteResponse {
        success: true,
        found: outcome.found,
    }))
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    id: String,
    filename: String,
    truncated: bool,
}

/// Handler for `POST /upload`. Reads the multipart field named `file`.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    loop {
        let field = multipart.next_field().await.map_err(|e| AppError {
            status: e.status(),
            message: e.body_text(),
        })?;
        let Some(field) = field else { break };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| AppError {
            status: e.status(),
            message: e.body_text(),
        })?;
        upload = Some(Upload::bytes(filename, bytes.to_vec()));
        break;
    }

    let upload = upload.ok_or_else(|| RagError::validation("no file uploaded"))?;
    tracing::info!(filename = %upload.filename, "upload accepted");

    let receipt = match state.ingestor.ingest(upload).await {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::warn!(kind = err.kind(), "upload failed");
            return Err(err.into());
        }
    };

    Ok(Json(UploadResponse {
        success: true,
        id: receipt.id,
        filename: receipt.filename,
        truncated: receipt.truncated,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
