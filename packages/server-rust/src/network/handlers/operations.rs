//! Operation submission, status, and clear endpoints.
//!
//! Bodies are optional JSON, read as text and parsed by hand so an empty body
//! can stand for `{}`. Every failure is answered as
//! `{"error": "<message>"}` with the status code of the [`OperationError`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use super::AppState;
use crate::service::OperationError;

/// Body of a sync submission answered within its wait budget.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    pub id: String,
    #[schema(example = "Completed")]
    pub status: String,
}

/// Body of an accepted async submission.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AsyncResponse {
    #[schema(example = "Operation started")]
    pub message: String,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// Stored state verbatim: `Pending`, `Completed`, `Failed`, or `Unknown`
    /// when nothing is stored.
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearResponse {
    pub message: String,
    /// Number of status records and result mailboxes deleted.
    pub cleared: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl OperationError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingId => StatusCode::NOT_FOUND,
            Self::InvalidPayload => StatusCode::BAD_REQUEST,
            Self::DuplicateOperation { .. } => StatusCode::CONFLICT,
            Self::Overloaded => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::ExecutionFailed { .. } | Self::StoreUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for OperationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::StoreUnavailable(e) = &self {
            error!(error = %e, "store request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// An absent or blank body is the empty object.
fn parse_payload(body: &[u8]) -> Result<serde_json::Value, OperationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body).map_err(|_| OperationError::InvalidPayload)
}

/// Submit an operation and wait for it to finish.
#[utoipa::path(
    post,
    path = "/operation/sync/{id}",
    params(("id" = String, Path, description = "Caller-chosen operation id")),
    request_body(content = Object, content_type = "application/json", description = "Optional operation payload"),
    responses(
        (status = 200, description = "Operation completed", body = SyncResponse),
        (status = 404, description = "Missing id", body = ErrorBody),
        (status = 408, description = "Wait budget exhausted; the operation keeps running", body = ErrorBody),
        (status = 409, description = "Operation with this ID already exists", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Operation failed or store unavailable", body = ErrorBody),
        (status = 503, description = "Server is shutting down", body = ErrorBody),
    ),
    tag = "operations"
)]
pub async fn submit_sync_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<SyncResponse>, OperationError> {
    let _guard = state
        .shutdown
        .accept_submission()
        .ok_or(OperationError::ShuttingDown)?;
    let payload = parse_payload(body.as_bytes())?;
    info!(id = %id, "received sync operation");

    let outcome = state.gateway.submit_sync(&id, payload).await?;
    Ok(Json(SyncResponse {
        id: outcome.id,
        status: outcome.status.as_str().to_owned(),
    }))
}

/// Submit an operation and return once it is queued.
#[utoipa::path(
    post,
    path = "/operation/async/{id}",
    params(("id" = String, Path, description = "Caller-chosen operation id")),
    request_body(content = Object, content_type = "application/json", description = "Optional operation payload"),
    responses(
        (status = 200, description = "Operation started", body = AsyncResponse),
        (status = 404, description = "Missing id", body = ErrorBody),
        (status = 409, description = "Operation with this ID already exists", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Store unavailable", body = ErrorBody),
        (status = 503, description = "Server is shutting down", body = ErrorBody),
    ),
    tag = "operations"
)]
pub async fn submit_async_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<AsyncResponse>, OperationError> {
    let _guard = state
        .shutdown
        .accept_submission()
        .ok_or(OperationError::ShuttingDown)?;
    let payload = parse_payload(body.as_bytes())?;
    info!(id = %id, "received async operation");

    let accepted = state.gateway.submit_async(&id, payload).await?;
    Ok(Json(AsyncResponse {
        message: "Operation started".to_owned(),
        id: accepted.id,
    }))
}

/// Answers submissions whose id segment is empty.
pub async fn missing_id_handler() -> OperationError {
    OperationError::MissingId
}

/// Fetch the current status of an operation.
#[utoipa::path(
    get,
    path = "/status/{id}",
    params(("id" = String, Path, description = "Operation id")),
    responses(
        (status = 200, description = "Current status, `Unknown` if never submitted", body = StatusResponse),
        (status = 500, description = "Store unavailable", body = ErrorBody),
    ),
    tag = "operations"
)]
pub async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, OperationError> {
    let status = state.gateway.status_text(&id).await?;
    Ok(Json(StatusResponse { status }))
}

/// Delete every stored status and result.
#[utoipa::path(
    post,
    path = "/clear",
    responses(
        (status = 200, description = "All stored statuses and results cleared", body = ClearResponse),
        (status = 500, description = "Store unavailable", body = ErrorBody),
    ),
    tag = "operations"
)]
pub async fn clear_handler(
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, OperationError> {
    let _guard = state.shutdown.in_flight_guard();
    let cleared = state.gateway.clear_all().await?;
    Ok(Json(ClearResponse {
        message: "All stored statuses and results cleared".to_owned(),
        cleared,
    }))
}

#[derive(OpenApi)]
#[openapi(
    info(title = "opgate", description = "Admission-controlled operation gateway"),
    paths(submit_sync_handler, submit_async_handler, status_handler, clear_handler),
    components(schemas(SyncResponse, AsyncResponse, StatusResponse, ClearResponse, ErrorBody)),
    tags((name = "operations", description = "Submit and inspect operations"))
)]
pub struct ApiDoc;
