//! HTTP transport.
//!
//! Thin axum layer over [`KnowledgeBase`]: every handler parses its input,
//! calls one engine operation, and serializes the result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Health check with supported formats |
//! | `GET`    | `/collections` | List collections |
//! | `POST`   | `/upload` | Multipart upload (`file`, `collection`) |
//! | `POST`   | `/query` | Similarity query (`query`, `collection`, `top_k`) |
//! | `DELETE` | `/collections/{name}` | Delete a collection |
//! | `GET`    | `/collections/{name}/stats` | Per-file chunk statistics |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "collection 'docs' not found" } }
//! ```
//!
//! Request errors map to 400 (404 for missing collections) with the full
//! message. Storage and embedding faults map to 500 with a generic message;
//! the detail is logged.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use knowledge_base_core::collection::CollectionName;
use knowledge_base_core::models::{CollectionInfo, CollectionStats, IngestOutcome, QueryResponse};
use knowledge_base_core::KbError;

use crate::app::KnowledgeBase;
use crate::config::Config;
use crate::extract::SUPPORTED_EXTENSIONS;

type AppState = Arc<KnowledgeBase>;

/// Build the router. `max_upload_bytes` bounds request bodies.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/collections", get(handle_list_collections))
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/collections/{name}", delete(handle_delete))
        .route("/collections/{name}/stats", get(handle_stats))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and block until shutdown.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_config(config).await?;
    let app = router(Arc::new(kb), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Knowledge base API listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, base_dir = %config.storage.base_dir.display(), "Server started");

    axum::serve(listener, app).await?;
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<KbError> for AppError {
    fn from(err: KbError) -> Self {
        let status = match &err {
            KbError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_user_error() => StatusCode::BAD_REQUEST,
            _ => {
                tracing::error!(error = %err, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.public_message(),
        }
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct HealthResponse {
    service: String,
    status: String,
    version: String,
    supported_formats: Vec<String>,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "Knowledge Base API".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_formats: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
    })
}

// ============ GET /collections ============

async fn handle_list_collections(
    State(kb): State<AppState>,
) -> Result<Json<Vec<CollectionInfo>>, AppError> {
    Ok(Json(kb.collections().list().await?))
}

// ============ POST /upload ============

/// Handler for `POST /upload`.
///
/// Expects a multipart body with a `file` part (carrying a filename) and a
/// `collection` text part, in any order.
async fn handle_upload(
    State(kb): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut collection: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("file part must carry a filename"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                upload = Some((filename, bytes.to_vec()));
            }
            Some("collection") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid collection field: {}", e)))?;
                collection = Some(text);
            }
            _ => {}
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing 'file' field"))?;
    let collection = collection.ok_or_else(|| bad_request("missing 'collection' field"))?;

    let outcome = kb.pipeline().ingest(bytes, &filename, &collection).await?;
    Ok(Json(outcome))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    collection: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_query(
    State(kb): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let response = kb
        .engine()
        .query(&req.query, &req.collection, req.top_k)
        .await?;
    Ok(Json(response))
}

// ============ DELETE /collections/{name} ============

#[derive(Serialize)]
struct DeleteResponse {
    status: String,
    collection: String,
    message: String,
}

async fn handle_delete(
    State(kb): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let name = CollectionName::parse(&name)?;
    kb.collections().delete(&name).await?;
    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        message: format!("Collection '{}' deleted successfully", name),
        collection: name.to_string(),
    }))
}

// ============ GET /collections/{name}/stats ============

async fn handle_stats(
    State(kb): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CollectionStats>, AppError> {
    let name = CollectionName::parse(&name)?;
    Ok(Json(kb.collections().stats(&name).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let not_found = AppError::from(KbError::NotFound("docs".to_string()));
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.code, "not_found");

        let invalid = AppError::from(KbError::InvalidName("a b".to_string()));
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let storage = AppError::from(KbError::Storage("disk full at /srv".to_string()));
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!storage.message.contains("/srv"));
    }
}
