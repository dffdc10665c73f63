//! stackpilot-api — REST API for Stackpilot.
//!
//! Thin axum glue over the orchestrator, the metrics client and the
//! autoscaler. Every response uses the `{success, data?, error?}` envelope.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/stacks` | List stacks |
//! | POST | `/api/v1/stacks` | Deploy a stack |
//! | GET | `/api/v1/stacks/{id}` | Stack record, slots and live outputs |
//! | DELETE | `/api/v1/stacks/{id}` | Tear down a stack |
//! | POST | `/api/v1/stacks/{id}/scale` | Scale to a target count |
//! | GET | `/api/v1/stacks/{id}/keypairs` | Private keys on disk |
//! | GET | `/api/v1/stacks/{id}/metrics` | CPU, memory and instance count |
//! | POST | `/api/v1/metrics/query` | PromQL passthrough |
//! | POST | `/api/v1/stacks/{id}/recommend` | Scaling recommendation |
//! | POST | `/api/v1/stacks/{id}/autoscale` | Evaluate and maybe execute now |
//! | GET | `/api/v1/autoscale/status` | Autoscale service status |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use stackpilot_autoscale::AutoscaleService;
use stackpilot_metrics::MetricsSource;
use stackpilot_scaling::StackOrchestrator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: StackOrchestrator,
    pub metrics: Arc<dyn MetricsSource>,
    pub autoscale: Arc<AutoscaleService>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/stacks", get(handlers::list_stacks).post(handlers::deploy_stack))
        .route("/stacks/{id}", get(handlers::get_stack).delete(handlers::teardown_stack))
        .route("/stacks/{id}/scale", post(handlers::scale_stack))
        .route("/stacks/{id}/keypairs", get(handlers::list_keypairs))
        .route("/stacks/{id}/metrics", get(handlers::stack_metrics))
        .route("/stacks/{id}/recommend", post(handlers::recommend))
        .route("/stacks/{id}/autoscale", post(handlers::autoscale_stack))
        .route("/metrics/query", post(handlers::query_metrics))
        .route("/autoscale/status", get(handlers::autoscale_status))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
