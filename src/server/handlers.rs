// HTTP handlers for loop management and one-shot backend calls

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{
    fail, fail_with, from_error, ok, AnalyzeData, ChatData, ChatRequest, GoalQueuedData,
    HealthData, LoopListData, MetricsData, ModelsData, StartLoopData, StartLoopRequest, StopData,
};
use super::AppState;
use crate::client::models::MODELS;
use crate::goals::Goal;
use crate::monitoring;

fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw)
        .map_err(|_| fail(StatusCode::BAD_REQUEST, format!("Invalid loop id: {}", raw)))
}

fn not_found(id: Uuid) -> Response {
    fail(StatusCode::NOT_FOUND, format!("Loop not found: {}", id))
}

fn bad_body(rejection: JsonRejection) -> Response {
    fail(rejection.status(), rejection.body_text())
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let backend = state.registry.backend();
    ok(HealthData {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: backend.model().to_string(),
        active_loops: state.registry.len().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// GET /metrics (Prometheus text format)
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    match monitoring::encode(&state.prometheus) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    ok(ModelsData {
        default_model: state.registry.backend().model().to_string(),
        models: MODELS,
    })
}

/// GET /v1/loops
pub async fn list_loops(State(state): State<Arc<AppState>>) -> Response {
    ok(LoopListData {
        loops: state.registry.list().await,
    })
}

/// POST /v1/loops
pub async fn start_loop(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    // An empty body starts a loop with the configured defaults
    let request: StartLoopRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartLoopRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return fail(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)),
        }
    };
    match state
        .registry
        .start(request.project_path, request.config)
        .await
    {
        Ok(loop_id) => ok(StartLoopData { loop_id }),
        Err(e) => {
            tracing::warn!("Failed to start loop: {}", e);
            from_error(&e)
        }
    }
}

/// GET /v1/loops/:id
pub async fn loop_status(State(state): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = state.registry.status(id).await;
    if status.is_found() {
        ok(status)
    } else {
        fail_with(StatusCode::NOT_FOUND, status, format!("Loop not found: {}", id))
    }
}

/// DELETE /v1/loops/:id
pub async fn stop_loop(State(state): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if state.registry.stop(id).await {
        ok(StopData {
            loop_id: id,
            stopped: true,
        })
    } else {
        not_found(id)
    }
}

/// POST /v1/loops/:id/analyze
pub async fn analyze_loop(State(state): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.analyze_once(id).await {
        None => not_found(id),
        Some(Ok(analysis)) => ok(AnalyzeData {
            loop_id: id,
            analysis,
        }),
        Some(Err(e)) => {
            tracing::warn!(loop_id = %id, "On-demand analysis failed: {}", e);
            from_error(&e)
        }
    }
}

/// POST /v1/loops/:id/goals
pub async fn submit_goal(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    body: Result<Json<Goal>, JsonRejection>,
) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let goal = match body {
        Ok(Json(goal)) => goal,
        Err(rejection) => return bad_body(rejection),
    };
    let name = goal.name.clone();
    match state.registry.submit_goal(id, goal).await {
        None => not_found(id),
        Some(Ok(())) => ok(GoalQueuedData {
            loop_id: id,
            goal: name,
        }),
        Some(Err(e)) => from_error(&e),
    }
}

/// GET /v1/loops/:id/metrics
pub async fn loop_metrics(State(state): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.get_metrics(id).await {
        Some(metrics) => ok(MetricsData {
            loop_id: id,
            metrics,
        }),
        None => not_found(id),
    }
}

/// POST /v1/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_body(rejection),
    };
    if request.message.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "message must not be empty");
    }
    let backend = state.registry.backend();
    match backend.chat(&request.message, &request.history).await {
        Ok(response) => ok(ChatData {
            response,
            model: backend.model().to_string(),
        }),
        Err(e) => {
            tracing::warn!("Chat request failed: {}", e);
            from_error(&e)
        }
    }
}
