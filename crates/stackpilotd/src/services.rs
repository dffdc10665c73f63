//! Service wiring: one orchestrator, metrics client and autoscaler per
//! process, assembled from the effective configuration.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use stackpilot_api::ApiState;
use stackpilot_autoscale::{
    AutoscaleService, Autoscaler, GeminiClient, RecommendationEngine, orchestrator_callback,
};
use stackpilot_core::StackpilotConfig;
use stackpilot_keys::{AwsCliKeyRegistry, KeypairManager};
use stackpilot_metrics::{MetricsSource, PrometheusClient};
use stackpilot_provision::TerraformDriver;
use stackpilot_scaling::StackOrchestrator;
use stackpilot_state::StateStore;

pub struct Services {
    pub orchestrator: StackOrchestrator,
    pub metrics: Arc<dyn MetricsSource>,
    pub autoscale: Arc<AutoscaleService>,
}

impl Services {
    pub fn build(config: &StackpilotConfig) -> anyhow::Result<Self> {
        let work_root = &config.provisioning.work_root;
        let store = StateStore::open(work_root)
            .with_context(|| format!("opening work root {}", work_root.display()))?;
        info!(path = ?work_root, "state store opened");

        if !config.credentials.is_configured() {
            warn!("cloud credentials not configured; deploy, scale and teardown will fail");
        }
        let registry = Arc::new(AwsCliKeyRegistry::new(
            config.provisioning.aws_bin.as_str(),
            config.credentials.clone(),
            config.provisioning.registry_timeout(),
        ));
        let keys = KeypairManager::new(store.clone(), registry);
        let provisioner = Arc::new(TerraformDriver::from_config(&config.provisioning));
        let orchestrator = StackOrchestrator::new(store.clone(), keys, provisioner, config);
        info!(
            tf_bin = %config.provisioning.tf_bin,
            min = config.scaling.min_instances,
            max = config.scaling.max_instances,
            "orchestrator initialized"
        );

        let metrics: Arc<dyn MetricsSource> = Arc::new(PrometheusClient::new(config.metrics.timeout())?);

        let mut engine =
            RecommendationEngine::new(store.clone(), metrics.clone(), config.scaling.bounds());
        match GeminiClient::from_config(&config.advisor)? {
            Some(client) => {
                info!(model = %config.advisor.model, "reasoning service configured");
                engine = engine.with_reasoning(Arc::new(client));
            }
            None => warn!("no reasoning API key; recommendations use fallback rules"),
        }

        let autoscaler = Autoscaler::new(store, engine, config.autoscale.confidence_threshold)
            .with_scale_fn(orchestrator_callback(orchestrator.clone()));
        let autoscale = Arc::new(AutoscaleService::new(
            Arc::new(autoscaler),
            config.autoscale.clone(),
        ));

        Ok(Self {
            orchestrator,
            metrics,
            autoscale,
        })
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            orchestrator: self.orchestrator.clone(),
            metrics: self.metrics.clone(),
            autoscale: self.autoscale.clone(),
        }
    }
}
