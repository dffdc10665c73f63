//! REST API handlers.
//!
//! Handlers call the orchestrator or the autoscaler and wrap the outcome
//! in the response envelope. Failed lifecycle results are returned with
//! status 500 and the full result as `data`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stackpilot_metrics::{MetricsError, monitoring_endpoint};
use stackpilot_scaling::{DeployRequest, ScalingError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    /// Failure that still carries the operation's result.
    fn failed(data: T, msg: String) -> Json<Self> {
        Json(Self {
            success: false,
            data: Some(data),
            error: Some(msg),
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn scaling_status(e: &ScalingError) -> StatusCode {
    match e {
        ScalingError::NotFound(_) => StatusCode::NOT_FOUND,
        ScalingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn scaling_error(e: ScalingError) -> Response {
    let status = scaling_status(&e);
    if status.is_server_error() {
        warn!(error = %e, "request failed");
    }
    error_response(&e.to_string(), status)
}

fn metrics_error(e: MetricsError) -> Response {
    let status = match e {
        MetricsError::NoEndpoint(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_response(&e.to_string(), status)
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Stacks ─────────────────────────────────────────────────────

/// GET /api/v1/stacks
pub async fn list_stacks(State(state): State<ApiState>) -> Response {
    match state.orchestrator.list() {
        Ok(stacks) => ApiResponse::ok(stacks).into_response(),
        Err(e) => scaling_error(e),
    }
}

/// POST /api/v1/stacks
pub async fn deploy_stack(
    State(state): State<ApiState>,
    Json(req): Json<DeployRequest>,
) -> Response {
    match state.orchestrator.deploy(req).await {
        Ok(result) if result.success => (StatusCode::CREATED, ApiResponse::ok(result)).into_response(),
        Ok(result) => {
            let msg = format!("deploy failed: {}", result.phase);
            (StatusCode::INTERNAL_SERVER_ERROR, ApiResponse::failed(result, msg)).into_response()
        }
        Err(e) => scaling_error(e),
    }
}

/// GET /api/v1/stacks/{id}
pub async fn get_stack(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.describe(&id).await {
        Ok(description) => ApiResponse::ok(description).into_response(),
        Err(e) => scaling_error(e),
    }
}

/// DELETE /api/v1/stacks/{id}
pub async fn teardown_stack(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.teardown(&id).await {
        Ok(result) if result.destroyed => ApiResponse::ok(result).into_response(),
        Ok(result) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::failed(result, "destroy failed".to_string()),
        )
            .into_response(),
        Err(e) => scaling_error(e),
    }
}

/// GET /api/v1/stacks/{id}/keypairs
pub async fn list_keypairs(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.keypairs(&id) {
        Ok(keys) => ApiResponse::ok(keys).into_response(),
        Err(e) => scaling_error(e),
    }
}

// ── Scaling ────────────────────────────────────────────────────

/// Scale request body.
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub target_count: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/v1/stacks/{id}/scale
pub async fn scale_stack(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> Response {
    let reason = req.reason.or_else(|| Some("Manual scale".to_string()));
    match state.orchestrator.scale(&id, req.target_count, reason).await {
        Ok(result) if result.is_success() => ApiResponse::ok(result).into_response(),
        Ok(result) => {
            let msg = format!(
                "scale from {} to {} failed",
                result.old_count, result.target_count
            );
            (StatusCode::INTERNAL_SERVER_ERROR, ApiResponse::failed(result, msg)).into_response()
        }
        Err(e) => scaling_error(e),
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /api/v1/stacks/{id}/metrics
pub async fn stack_metrics(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let stack = match state.orchestrator.store().load(&id) {
        Ok(stack) => stack,
        Err(e) => return scaling_error(e.into()),
    };
    let endpoint = match monitoring_endpoint(&stack) {
        Ok(endpoint) => endpoint,
        Err(e) => return metrics_error(e),
    };
    match state
        .metrics
        .stack_metrics(&endpoint, stack.declared_count())
        .await
    {
        Ok(metrics) => ApiResponse::ok(serde_json::json!({
            "stack_id": id,
            "endpoint": endpoint,
            "metrics": metrics,
        }))
        .into_response(),
        Err(e) => metrics_error(e),
    }
}

/// PromQL passthrough request body.
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub stack_id: String,
    pub query: String,
}

/// POST /api/v1/metrics/query
pub async fn query_metrics(
    State(state): State<ApiState>,
    Json(req): Json<MetricsQuery>,
) -> Response {
    if req.query.trim().is_empty() {
        return error_response("query must not be empty", StatusCode::BAD_REQUEST);
    }
    let stack = match state.orchestrator.store().load(&req.stack_id) {
        Ok(stack) => stack,
        Err(e) => return scaling_error(e.into()),
    };
    let endpoint = match monitoring_endpoint(&stack) {
        Ok(endpoint) => endpoint,
        Err(e) => return metrics_error(e),
    };
    match state.metrics.query(&endpoint, &req.query).await {
        Ok(resp) => ApiResponse::ok(resp).into_response(),
        Err(e) => metrics_error(e),
    }
}

// ── Autoscaling ────────────────────────────────────────────────

/// POST /api/v1/stacks/{id}/recommend
pub async fn recommend(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.autoscale.autoscaler().engine().recommend(&id).await {
        Ok(assessment) => ApiResponse::ok(assessment).into_response(),
        Err(e) => scaling_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AutoscaleParams {
    pub confidence_threshold: Option<f64>,
}

/// POST /api/v1/stacks/{id}/autoscale
pub async fn autoscale_stack(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<AutoscaleParams>,
) -> Response {
    if let Some(t) = params.confidence_threshold
        && !(0.0..=1.0).contains(&t)
    {
        return error_response(
            "confidence_threshold must be within [0, 1]",
            StatusCode::BAD_REQUEST,
        );
    }
    match state
        .autoscale
        .autoscaler()
        .evaluate_stack(&id, params.confidence_threshold)
        .await
    {
        Ok(evaluation) => {
            let failed = evaluation
                .scale_result
                .as_ref()
                .is_some_and(|r| !r.is_success());
            if failed {
                let msg = "autoscale did not apply".to_string();
                (StatusCode::INTERNAL_SERVER_ERROR, ApiResponse::failed(evaluation, msg)).into_response()
            } else {
                ApiResponse::ok(evaluation).into_response()
            }
        }
        Err(e) => scaling_error(e),
    }
}

/// GET /api/v1/autoscale/status
pub async fn autoscale_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.autoscale.status()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_errors_map_to_status_codes() {
        assert_eq!(
            scaling_status(&ScalingError::NotFound("s".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            scaling_status(&ScalingError::InvalidArgument("bad".into())),
            StatusCode::BAD_REQUEST
        );
        let missing = stackpilot_core::CredentialError::Missing("AWS_ACCESS_KEY_ID");
        assert_eq!(
            scaling_status(&ScalingError::Credential(missing)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let json = serde_json::to_value(ApiResponse::ok(3).0).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 3}));
    }
}
