//! HTTP surface for the scan pipeline (behind the `server` feature).
//!
//! One endpoint does the work: `POST /upload-bill` takes a multipart form
//! with a `bill` file part and a `category` text part, runs [`scan`], and
//! echoes the stored row back to the caller. `GET /health` exists for
//! load-balancer probes.
//!
//! Error responses are always `{"error": "..."}` with the status taken from
//! [`ScanError::http_status`]: 400 when the caller can fix the request, 500
//! when a downstream stage failed.

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::record::{BillRecord, BillUpload};
use crate::scan::{scan, ScanRequest};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Largest accepted request body. Bills are single receipts, not books;
/// anything bigger than this is a mistake or abuse.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: ScanConfig,
}

/// Success body of `POST /upload-bill`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub bill_details: BillRecord,
    pub raw_response: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Wrapper so pipeline errors (and multipart transport errors) can carry an
/// HTTP response. Needed because `IntoResponse` cannot be implemented for
/// `ScanError` directly without pulling axum into the core library.
#[derive(Debug)]
pub enum ApiError {
    Scan(ScanError),
    BadRequest(String),
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        ApiError::Scan(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Scan(e) => StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Scan(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            error!("Request failed ({status}): {detail}");
        } else {
            warn!("Request rejected ({status}): {detail}");
        }
        (status, Json(ErrorBody { error: detail })).into_response()
    }
}

/// `POST /upload-bill` handler.
///
/// Reads the multipart form, then hands off to [`scan`]. Unknown form fields
/// are ignored; a missing `bill` or `category` part maps to the same errors
/// an empty one would.
pub async fn upload_bill(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<BillUpload> = None;
    let mut category: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "bill" => {
                let file_name = field.file_name().unwrap_or("bill").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read bill file: {e}")))?;
                upload = Some(BillUpload::new(bytes.to_vec(), file_name, content_type));
            }
            "category" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read category: {e}")))?;
                category = Some(text);
            }
            _ => {}
        }
    }

    let upload = upload.ok_or(ScanError::MissingFile)?;
    let category = category.ok_or(ScanError::MissingCategory)?;

    let output = scan(ScanRequest::new(upload, category), &state.config).await?;
    Ok(Json(UploadResponse {
        message: "Bill details successfully extracted and stored.".to_string(),
        bill_details: output.record,
        raw_response: output.raw_response,
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the application router.
///
/// The stock axum extractor limit is replaced by one request-body cap of
/// [`MAX_UPLOAD_BYTES`]; oversized uploads are rejected with 413 before the
/// handler runs.
pub fn router(config: ScanConfig) -> Router {
    let state = Arc::new(AppState { config });
    Router::new()
        .route("/upload-bill", post(upload_bill))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on an already-bound listener until shutdown.
pub async fn serve(listener: tokio::net::TcpListener, config: ScanConfig) -> io::Result<()> {
    let app = router(config);
    info!("receipthub listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Resolves when the process receives Ctrl+C (SIGINT) or SIGTERM.
///
/// # Panics
/// Panics if a signal handler cannot be installed, which is an unrecoverable
/// system error at startup.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_map_to_400() {
        assert_eq!(
            ApiError::from(ScanError::MissingFile).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadRequest("truncated body".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn pipeline_errors_map_to_500() {
        assert_eq!(
            ApiError::from(ScanError::EmptyCompletion).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ScanError::NoJsonBlockFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_body_shape() {
        let body = serde_json::to_value(ErrorBody {
            error: "No bill file provided".into(),
        })
        .unwrap();
        assert_eq!(body["error"], "No bill file provided");
    }
}
