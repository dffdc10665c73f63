//! Autoscaler — recommendation-driven instance scaling.
//!
//! Every tick enumerates the stacks in the state store, asks the
//! recommendation engine for an assessment and hands confident decisions
//! to a scaling callback. The actual scaling is performed by the
//! orchestrator behind that callback. Nothing is remembered between ticks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use stackpilot_core::config::AutoscaleConfig;
use stackpilot_scaling::{ScaleResult, ScalingResult, StackOrchestrator};
use stackpilot_state::{ScaleAction, StackId, StateStore};

use crate::recommend::{Assessment, Recommendation, RecommendationEngine};

/// A scaling decision for a single stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDecision {
    /// Scale to the specified instance count.
    ScaleTo(u32),
    /// Recommended action is below the confidence threshold.
    BelowThreshold,
    /// No change needed.
    NoChange,
}

/// Future returned by a [`ScaleCallback`].
pub type ScaleFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = ScalingResult<ScaleResult>> + Send>>;

/// Callback type for performing scaling actions.
///
/// The autoscaler calls this with (stack_id, target_count, reason).
pub type ScaleCallback = Box<dyn Fn(&str, u32, String) -> ScaleFuture + Send + Sync>;

/// Callback that scales through `orchestrator`.
pub fn orchestrator_callback(orchestrator: StackOrchestrator) -> ScaleCallback {
    Box::new(move |stack_id: &str, target: u32, reason: String| -> ScaleFuture {
        let orchestrator = orchestrator.clone();
        let stack_id = stack_id.to_string();
        Box::pin(async move { orchestrator.scale(&stack_id, target, Some(reason)).await })
    })
}

/// Decide whether `rec` should be executed at `threshold`.
pub fn decide(rec: &Recommendation, threshold: f64) -> ScaleDecision {
    if rec.action == ScaleAction::NoChange {
        ScaleDecision::NoChange
    } else if rec.confidence >= threshold {
        ScaleDecision::ScaleTo(rec.target_count)
    } else {
        ScaleDecision::BelowThreshold
    }
}

/// Outcome of evaluating one stack.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub stack_id: StackId,
    pub threshold: f64,
    pub decision: ScaleDecision,
    pub assessment: Assessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_result: Option<ScaleResult>,
}

/// The autoscaler evaluates recommendations and decides whether to scale
/// stacks up or down.
pub struct Autoscaler {
    store: StateStore,
    engine: RecommendationEngine,
    threshold: f64,
    /// Callback to perform scaling.
    scale_fn: Option<ScaleCallback>,
}

impl Autoscaler {
    pub fn new(store: StateStore, engine: RecommendationEngine, threshold: f64) -> Self {
        Self {
            store,
            engine,
            threshold,
            scale_fn: None,
        }
    }

    /// Set the callback used to perform scaling.
    pub fn with_scale_fn(mut self, f: ScaleCallback) -> Self {
        self.scale_fn = Some(f);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    /// Evaluate one stack and execute the decision when it clears the
    /// threshold (`threshold_override` replaces the configured one).
    ///
    /// Errors of the recommendation or of the scale call propagate.
    pub async fn evaluate_stack(
        &self,
        stack_id: &str,
        threshold_override: Option<f64>,
    ) -> ScalingResult<Evaluation> {
        let threshold = threshold_override.unwrap_or(self.threshold);
        let assessment = self.engine.recommend(stack_id).await?;
        let rec = &assessment.recommendation;
        let decision = decide(rec, threshold);

        let mut scale_result = None;
        match decision {
            ScaleDecision::ScaleTo(target) => match &self.scale_fn {
                Some(scale_fn) => {
                    info!(
                        %stack_id,
                        action = %rec.action,
                        from = assessment.current_count,
                        to = target,
                        confidence = rec.confidence,
                        threshold,
                        "executing recommendation"
                    );
                    let result =
                        scale_fn(stack_id, target, format!("AI Auto-scale: {}", rec.reason)).await?;
                    if result.is_success() {
                        info!(%stack_id, from = result.old_count, to = result.target_count, "autoscale applied");
                    } else {
                        warn!(%stack_id, outcome = ?result.outcome, "autoscale did not apply");
                    }
                    scale_result = Some(result);
                }
                None => debug!(%stack_id, target, "no scale callback configured"),
            },
            ScaleDecision::BelowThreshold => {
                info!(
                    %stack_id,
                    action = %rec.action,
                    confidence = rec.confidence,
                    threshold,
                    "skipping recommendation below threshold"
                );
            }
            ScaleDecision::NoChange => debug!(%stack_id, reason = %rec.reason, "no scaling needed"),
        }

        Ok(Evaluation {
            stack_id: stack_id.to_string(),
            threshold,
            decision,
            assessment,
            scale_result,
        })
    }

    /// Evaluate every stack in the store.
    ///
    /// A failure on one stack is logged and does not stop the others.
    pub async fn evaluate_all(&self) -> ScalingResult<Vec<Evaluation>> {
        let stacks = self.store.list()?;
        info!(stacks = stacks.len(), "autoscale tick");

        let mut evaluations = Vec::with_capacity(stacks.len());
        for stack in &stacks {
            match self.evaluate_stack(&stack.stack_id, None).await {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(e) => {
                    warn!(stack_id = %stack.stack_id, error = %e, "autoscale evaluation failed");
                }
            }
        }
        Ok(evaluations)
    }

    /// Run the autoscaler loop until `shutdown` changes.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            threshold = self.threshold,
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.evaluate_all().await {
                        error!(error = %e, "autoscaler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}

/// Snapshot of the autoscale service.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AutoscaleStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_secs: u64,
    pub confidence_threshold: f64,
    pub reasoning_configured: bool,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Background service owning the autoscaler loop.
pub struct AutoscaleService {
    autoscaler: Arc<Autoscaler>,
    config: AutoscaleConfig,
    running: Mutex<Option<Running>>,
}

impl AutoscaleService {
    pub fn new(autoscaler: Arc<Autoscaler>, config: AutoscaleConfig) -> Self {
        Self {
            autoscaler,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn autoscaler(&self) -> &Arc<Autoscaler> {
        &self.autoscaler
    }

    /// Spawn the loop. Returns false when autoscaling is disabled.
    pub fn start(&self) -> bool {
        if !self.config.enabled {
            info!("autoscaling disabled, not starting");
            return false;
        }
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.is_some() {
            return true;
        }

        let (shutdown, rx) = watch::channel(false);
        let autoscaler = self.autoscaler.clone();
        let interval = self.config.interval();
        let task = tokio::spawn(async move { autoscaler.run(interval, rx).await });
        *running = Some(Running { shutdown, task });
        true
    }

    /// Signal the loop and wait for it. Returns whether it was running.
    pub async fn stop(&self) -> bool {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(Running { shutdown, task }) = running else {
            return false;
        };
        let _ = shutdown.send(true);
        if let Err(e) = task.await {
            error!(error = %e, "autoscaler task ended abnormally");
        }
        info!("autoscaler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        match self.running.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    pub fn status(&self) -> AutoscaleStatus {
        AutoscaleStatus {
            enabled: self.config.enabled,
            running: self.is_running(),
            interval_secs: self.config.interval_secs,
            confidence_threshold: self.autoscaler.threshold(),
            reasoning_configured: self.autoscaler.engine().has_reasoning(),
        }
    }
}
