//! JSON HTTP server.
//!
//! A thin driver over one shared [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, loaded document |
//! | `POST` | `/documents` | Ingest a PDF sent as the raw request body (`?name=paper.pdf`) |
//! | `POST` | `/ask` | `{"question": "..."}` → answer record |
//! | `POST` | `/summary` | Summary of the loaded document |
//! | `GET`  | `/images` | Image catalog |
//! | `GET`  | `/images/{ordinal}` | PNG bytes of the N-th image |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_document", "message": "no document loaded; ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `no_document` (409),
//! `no_content` (422), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::QaError;
use crate::extract::create_extractor;
use crate::models::{Answer, ImageRecord};
use crate::session::{IngestReport, Session};

const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Build the router over a shared session.
pub fn router(session: Arc<Session>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_ingest))
        .route("/ask", post(handle_ask))
        .route("/summary", post(handle_summary))
        .route("/images", get(handle_list_images))
        .route("/images/{ordinal}", get(handle_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(session)
}

/// Serve until the process is terminated.
pub async fn run_server(session: Arc<Session>) -> anyhow::Result<()> {
    let bind_addr = session.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("pdf-qa server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");
    axum::serve(listener, router(session)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Map a session error to a status code by its domain cause.
fn classify(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<QaError>() {
        Some(QaError::NoDocument) => AppError {
            status: StatusCode::CONFLICT,
            code: "no_document",
            message: err.to_string(),
        },
        Some(QaError::ExtractionUnavailable { .. }) => AppError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "no_content",
            message: err.to_string(),
        },
        _ => AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("{:#}", err),
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    llm: String,
    document: Option<String>,
}

async fn handle_health(State(session): State<Arc<Session>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        llm: session.gateway().provider().to_string(),
        document: session.current().await.map(|d| d.document.source.clone()),
    })
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct IngestQuery {
    name: Option<String>,
}

async fn handle_ingest(
    State(session): State<Arc<Session>>,
    Query(query): Query<IngestQuery>,
    body: Bytes,
) -> Result<Json<IngestReport>, AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must contain a PDF"));
    }
    let extractor = create_extractor(&session.config().extraction, None)
        .map_err(|e| bad_request(e.to_string()))?;

    let name = query
        .name
        .as_deref()
        .and_then(|n| std::path::Path::new(n).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());
    let upload_dir = std::env::temp_dir().join(format!("pdfqa-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(|e| classify(e.into()))?;
    let pdf_path = upload_dir.join(&name);
    tokio::fs::write(&pdf_path, &body)
        .await
        .map_err(|e| classify(e.into()))?;

    let result = session.ingest(&pdf_path, extractor.as_ref()).await;
    let _ = tokio::fs::remove_dir_all(&upload_dir).await;

    result.map(Json).map_err(classify)
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(session): State<Arc<Session>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    session.ask(question).await.map(Json).map_err(classify)
}

// ============ POST /summary ============

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
}

async fn handle_summary(
    State(session): State<Arc<Session>>,
) -> Result<Json<SummaryResponse>, AppError> {
    let summary = session.summary().await.map_err(classify)?;
    Ok(Json(SummaryResponse { summary }))
}

// ============ GET /images ============

#[derive(Serialize)]
struct ImageListResponse {
    images: Vec<ImageRecord>,
}

async fn handle_list_images(
    State(session): State<Arc<Session>>,
) -> Result<Json<ImageListResponse>, AppError> {
    let doc = session
        .current()
        .await
        .ok_or_else(|| classify(QaError::NoDocument.into()))?;
    Ok(Json(ImageListResponse {
        images: doc.images.records().to_vec(),
    }))
}

async fn handle_image(
    State(session): State<Arc<Session>>,
    Path(ordinal): Path<u32>,
) -> Result<Response, AppError> {
    let doc = session
        .current()
        .await
        .ok_or_else(|| classify(QaError::NoDocument.into()))?;
    let record = doc
        .images
        .by_ordinal(ordinal)
        .ok_or_else(|| not_found(format!("no image number {}", ordinal)))?;

    let path = session
        .workspace()
        .image_path(&record.path)
        .map_err(classify)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| not_found(format!("{}: {}", record.path, e)))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}
