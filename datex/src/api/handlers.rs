//! Request handlers for the control API.
//!
//! Every handler answers with the same envelope: successes wrap their
//! payload in a `data` field, failures carry a machine-readable `error`
//! kind that also selects the HTTP status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::{JobConfig, ScheduledJobConfig};
use crate::context::ContextStatus;
use crate::errors::{ConfigurationError, DatexError};

use super::ApiState;

/// Lines returned by a `tail` action when no limit is given.
const DEFAULT_TAIL: usize = 100;

/// Error body returned by every failing API call.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind; also selects the HTTP status.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error response of the given kind.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

impl From<ConfigurationError> for ErrorResponse {
    fn from(e: ConfigurationError) -> Self {
        Self::invalid(e.to_string())
    }
}

impl From<DatexError> for ErrorResponse {
    fn from(e: DatexError) -> Self {
        match &e {
            DatexError::Configuration(_) => Self::invalid(e.to_string()),
            DatexError::Processing { component, .. } if component == "service" => {
                Self::new("conflict", e.to_string())
            }
            _ => Self::new("internal_error", e.to_string()),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Success body returned by every completing API call.
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    /// The call's payload.
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    /// Wraps a payload.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Health payload for monitoring probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Fixed at `"up"` while the listener is alive.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Status of every hosted job.
    pub jobs: Vec<ContextStatus>,
}

/// Dispatches `/api/cmd/{command}` for commands that name no job.
pub(super) async fn command(
    State(state): State<ApiState>,
    Path(command): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Response, ErrorResponse> {
    match command.as_str() {
        "start" => {
            let Some(Json(document)) = body else {
                return Err(ErrorResponse::invalid("start needs a job document"));
            };
            let entry = parse_start_body(document)?;
            let status = state.service.start_scheduled(entry)?;
            Ok(SuccessResponse::new(status).into_response())
        }
        "status" => Ok(SuccessResponse::new(state.service.service_status()).into_response()),
        "shutdown" => {
            info!("shutdown commanded");
            state.service.shutdown();
            state.shutdown.notify_one();
            Ok(SuccessResponse::new(state.service.service_status()).into_response())
        }
        other => Err(ErrorResponse::invalid(format!("unknown command '{other}'"))),
    }
}

/// Dispatches `/api/cmd/{command}/{job}` for commands targeting one job.
pub(super) async fn job_command(
    State(state): State<ApiState>,
    Path((command, job)): Path<(String, String)>,
) -> Result<Response, ErrorResponse> {
    match command.as_str() {
        "stop" => {
            let status = state
                .service
                .stop_job(&job)
                .ok_or_else(|| unknown_job(&job))?;
            Ok(SuccessResponse::new(status).into_response())
        }
        "status" => {
            let status = state
                .service
                .job_status(&job)
                .ok_or_else(|| unknown_job(&job))?;
            Ok(SuccessResponse::new(status).into_response())
        }
        other => Err(ErrorResponse::invalid(format!(
            "unknown command '{other}' for job '{job}'"
        ))),
    }
}

fn unknown_job(job: &str) -> ErrorResponse {
    ErrorResponse::not_found(format!("no job named '{job}'"))
}

/// Query options for the log routes.
#[derive(Debug, Default, Deserialize)]
pub(super) struct LogQuery {
    /// Maximum lines returned by `tail`.
    lines: Option<usize>,
    /// Only lines containing this substring.
    contains: Option<String>,
}

/// Dispatches `/api/log/{logname}/{action}`: `tail` returns recent lines,
/// `clear` discards them.
pub(super) async fn log(
    State(state): State<ApiState>,
    Path((logname, action)): Path<(String, String)>,
    Query(query): Query<LogQuery>,
) -> Result<Response, ErrorResponse> {
    let buffer = state
        .logs
        .get(&logname)
        .ok_or_else(|| ErrorResponse::not_found(format!("no log named '{logname}'")))?;
    match action.as_str() {
        "tail" => {
            let lines = buffer.tail(
                query.lines.unwrap_or(DEFAULT_TAIL),
                query.contains.as_deref(),
            );
            Ok(SuccessResponse::new(lines).into_response())
        }
        "clear" => {
            buffer.clear();
            info!(log = %logname, "log cleared");
            Ok(SuccessResponse::new(LogCleared { log: logname }).into_response())
        }
        other => Err(ErrorResponse::invalid(format!(
            "unknown log action '{other}'"
        ))),
    }
}

/// Acknowledgement for a `clear` action.
#[derive(Debug, Serialize)]
pub(super) struct LogCleared {
    log: String,
}

/// Reports service health and the jobs it hosts.
pub(super) async fn health(State(state): State<ApiState>) -> SuccessResponse<HealthResponse> {
    SuccessResponse::new(HealthResponse {
        status: "up".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: state.service.service_status(),
    })
}

/// Fallback for paths no route claims.
pub(super) async fn not_found() -> ErrorResponse {
    ErrorResponse::not_found("no such endpoint")
}

/// Accepts either a service entry (`{"schedule": ..., "job": {...}}`) or a
/// bare job document.
fn parse_start_body(document: Value) -> Result<ScheduledJobConfig, ErrorResponse> {
    let entry = if document.get("job").is_some() {
        serde_json::from_value::<ScheduledJobConfig>(document)
    } else {
        serde_json::from_value::<JobConfig>(document).map(|job| ScheduledJobConfig {
            schedule: None,
            job,
        })
    }
    .map_err(|e| ErrorResponse::invalid(format!("malformed job document: {e}")))?;
    entry.job.check_shape()?;
    Ok(entry)
}
