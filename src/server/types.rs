// Request/response bodies for the HTTP transport
//
// Every response is an envelope: `{ "success": bool, ...data, "error"?: string }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::client::models::ModelInfo;
use crate::client::ChatMessage;
use crate::config::LoopConfig;
use crate::errors::LooperError;
use crate::metrics::MetricsSnapshot;
use crate::registry::LoopSummary;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 200 with `success: true`
pub fn ok<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
        .into_response()
}

/// Failure envelope with no data
pub fn fail(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(Envelope::<()> {
            success: false,
            data: None,
            error: Some(error.into()),
        }),
    )
        .into_response()
}

/// Failure envelope that still carries data (e.g. the not-found status snapshot)
pub fn fail_with<T: Serialize>(status: StatusCode, data: T, error: impl Into<String>) -> Response {
    (
        status,
        Json(Envelope {
            success: false,
            data: Some(data),
            error: Some(error.into()),
        }),
    )
        .into_response()
}

pub fn error_status(err: &LooperError) -> StatusCode {
    match err {
        LooperError::Config(_) | LooperError::Parse(_) => StatusCode::BAD_REQUEST,
        LooperError::LoopClosed(_) => StatusCode::CONFLICT,
        LooperError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LooperError::Api { .. } | LooperError::EmptyResponse | LooperError::Transport(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn from_error(err: &LooperError) -> Response {
    fail(error_status(err), err.to_string())
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
    pub active_loops: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartLoopRequest {
    /// Defaults to the configured project path
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    /// Replaces the configured loop policy; omitted keys take defaults
    #[serde(default)]
    pub config: Option<LoopConfig>,
}

#[derive(Debug, Serialize)]
pub struct StartLoopData {
    pub loop_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LoopListData {
    pub loops: Vec<LoopSummary>,
}

#[derive(Debug, Serialize)]
pub struct StopData {
    pub loop_id: Uuid,
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeData {
    pub loop_id: Uuid,
    pub analysis: String,
}

#[derive(Debug, Serialize)]
pub struct GoalQueuedData {
    pub loop_id: Uuid,
    pub goal: String,
}

#[derive(Debug, Serialize)]
pub struct MetricsData {
    pub loop_id: Uuid,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatData {
    pub response: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsData {
    pub default_model: String,
    pub models: &'static [ModelInfo],
}
