//! HTTP surface: `POST /pull` and `GET /healthz`.
//!
//! The handler decodes the JSON body, hands it to the [`Analyzer`], and maps
//! failures onto status codes. Scanner diagnostics are logged here and never
//! sent to the caller.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pullscan_core::{AnalyzeError, Analyzer, ProcessRunner, ScanRequest, ScanResponse};
use tracing::{error, warn};

/// Build the service router around a shared analyzer.
pub fn router<R>(analyzer: Arc<Analyzer<R>>, max_body_bytes: usize) -> Router
where
    R: ProcessRunner + 'static,
{
    Router::new()
        .route("/pull", post(pull::<R>))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(analyzer)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn pull<R>(
    State(analyzer): State<Arc<Analyzer<R>>>,
    body: Bytes,
) -> Result<Json<ScanResponse>, ApiError>
where
    R: ProcessRunner + 'static,
{
    let request: ScanRequest = serde_json::from_slice(&body).map_err(ApiError::Decode)?;
    let outcome = analyzer.analyze(request).await?;
    Ok(Json(ScanResponse::from(outcome)))
}

/// A failed request, rendered as a plain-text error response.
#[derive(Debug)]
pub enum ApiError {
    /// The body was not the expected JSON.
    Decode(serde_json::Error),
    /// The analysis pipeline failed.
    Analyze(AnalyzeError),
}

impl From<AnalyzeError> for ApiError {
    fn from(err: AnalyzeError) -> Self {
        Self::Analyze(err)
    }
}

impl ApiError {
    /// Status code and caller-visible message.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Decode(e) => (StatusCode::BAD_REQUEST, format!("Unable to read body: {e}")),
            Self::Analyze(e @ AnalyzeError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::Analyze(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, format!("Invalid {e}"))
            }
            Self::Analyze(e) => {
                let reason = match e {
                    AnalyzeError::Workspace(_) => "workspace unavailable",
                    AnalyzeError::Scan(_) => "scan failed",
                    _ => "unpack failed",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal error: {reason}"),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        match &self {
            Self::Decode(e) => warn!(error = %e, "unable to decode body"),
            Self::Analyze(e) if status.is_client_error() => {
                warn!(error = %e, "rejected request");
            }
            Self::Analyze(e) => {
                let output = match e {
                    AnalyzeError::Scan(scan) => scan.output(),
                    _ => None,
                };
                error!(error = %e, tool_output = output.unwrap_or(""), "internal error");
            }
        }
        (status, message).into_response()
    }
}
