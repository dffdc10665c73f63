//! Recommendation engine: telemetry plus reasoning, bounded by rules.
//!
//! The engine never fails because a backend is down. Missing metrics yield
//! a degraded `no_change` at confidence 0; a missing, failing or
//! incoherent reasoning service yields the deterministic rule fallback.
//! Whatever the reasoning service answers is validated and clamped before
//! it leaves this module.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use stackpilot_core::InstanceBounds;
use stackpilot_metrics::{MetricsSource, StackMetrics, monitoring_endpoint};
use stackpilot_scaling::ScalingResult;
use stackpilot_state::{ScaleAction, Stack, StackId, StateStore};

use crate::advisor::ReasoningService;
use crate::error::{AdvisorError, AdvisorResult};

const DEFAULT_REASON: &str = "AI recommendation";
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Where a recommendation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Reasoning,
    Fallback,
    /// Metrics were unavailable; no decision was attempted.
    Degraded,
}

/// A bounded scaling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: ScaleAction,
    pub target_count: u32,
    pub reason: String,
    /// Within `[0, 1]`.
    pub confidence: f64,
    pub source: RecommendationSource,
}

impl Recommendation {
    fn degraded(current_count: u32, reason: String) -> Self {
        Self {
            action: ScaleAction::NoChange,
            target_count: current_count,
            reason,
            confidence: 0.0,
            source: RecommendationSource::Degraded,
        }
    }
}

/// Result of [`RecommendationEngine::recommend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub stack_id: StackId,
    pub current_count: u32,
    pub metrics: Option<StackMetrics>,
    pub recommendation: Recommendation,
}

#[derive(Clone)]
pub struct RecommendationEngine {
    store: StateStore,
    metrics: Arc<dyn MetricsSource>,
    reasoning: Option<Arc<dyn ReasoningService>>,
    bounds: InstanceBounds,
}

impl RecommendationEngine {
    pub fn new(store: StateStore, metrics: Arc<dyn MetricsSource>, bounds: InstanceBounds) -> Self {
        Self {
            store,
            metrics,
            reasoning: None,
            bounds,
        }
    }

    pub fn with_reasoning(mut self, reasoning: Arc<dyn ReasoningService>) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn has_reasoning(&self) -> bool {
        self.reasoning.is_some()
    }

    pub fn bounds(&self) -> InstanceBounds {
        self.bounds
    }

    /// Assess one stack. Only a missing or unreadable record is an error.
    pub async fn recommend(&self, stack_id: &str) -> ScalingResult<Assessment> {
        let stack = self.store.load(stack_id)?;
        let current_count = stack.declared_count();

        let metrics = match self.collect(&stack).await {
            Ok(metrics) => metrics,
            Err(reason) => {
                warn!(%stack_id, %reason, "metrics unavailable, no recommendation");
                return Ok(Assessment {
                    stack_id: stack_id.to_string(),
                    current_count,
                    metrics: None,
                    recommendation: Recommendation::degraded(
                        current_count,
                        format!("Unable to fetch metrics: {reason}"),
                    ),
                });
            }
        };

        let recommendation = match &self.reasoning {
            None => {
                debug!(%stack_id, "no reasoning service configured, using rules");
                fallback_recommendation(current_count, &metrics, self.bounds)
            }
            Some(reasoning) => {
                match self.ask(reasoning.as_ref(), stack_id, current_count, &metrics).await {
                    Ok(rec) => rec,
                    Err(e) => {
                        warn!(%stack_id, error = %e, "reasoning failed, using fallback rules");
                        fallback_recommendation(current_count, &metrics, self.bounds)
                    }
                }
            }
        };

        debug!(
            %stack_id,
            current = current_count,
            action = %recommendation.action,
            target = recommendation.target_count,
            confidence = recommendation.confidence,
            source = ?recommendation.source,
            "recommendation ready"
        );
        Ok(Assessment {
            stack_id: stack_id.to_string(),
            current_count,
            metrics: Some(metrics),
            recommendation,
        })
    }

    async fn collect(&self, stack: &Stack) -> Result<StackMetrics, String> {
        let endpoint = monitoring_endpoint(stack).map_err(|e| e.to_string())?;
        self.metrics
            .stack_metrics(&endpoint, stack.declared_count())
            .await
            .map_err(|e| e.to_string())
    }

    async fn ask(
        &self,
        reasoning: &dyn ReasoningService,
        stack_id: &str,
        current_count: u32,
        metrics: &StackMetrics,
    ) -> AdvisorResult<Recommendation> {
        let prompt = build_prompt(stack_id, current_count, metrics, self.bounds);
        let text = reasoning.generate(&prompt).await?;
        let payload = extract_json_object(&text)
            .ok_or_else(|| AdvisorError::Decode("no JSON object in response".to_string()))?;
        let value: Value =
            serde_json::from_str(payload).map_err(|e| AdvisorError::Decode(e.to_string()))?;
        if !value.is_object() {
            return Err(AdvisorError::Decode("response is not a JSON object".to_string()));
        }
        Ok(validate_recommendation(&value, current_count, self.bounds))
    }
}

/// Prompt asking for a single JSON decision object.
pub fn build_prompt(
    stack_id: &str,
    current_count: u32,
    metrics: &StackMetrics,
    bounds: InstanceBounds,
) -> String {
    format!(
        "You advise on horizontal scaling of a fleet of virtual machines.\n\
         \n\
         Stack: {stack_id}\n\
         Instances running: {current_count}\n\
         Allowed range: {min} to {max} instances\n\
         \n\
         Five-minute averages:\n\
         - CPU: {cpu:.2}%\n\
         - Memory: {mem:.2}%\n\
         \n\
         Guidelines:\n\
         - CPU above 70% or memory above 80%: scale_up by 1 or 2 instances.\n\
         - CPU below 30% and memory below 50% with more than {min} instances: scale_down by 1.\n\
         - Otherwise: no_change.\n\
         Only scale when the numbers clearly call for it. Use confidence above 0.7 for\n\
         scaling actions and below 0.6 for no_change. target_count must stay within the\n\
         allowed range.\n\
         \n\
         Reply with one JSON object and nothing else:\n\
         {{\"action\": \"scale_up\" | \"scale_down\" | \"no_change\", \"target_count\": <integer>, \
         \"reason\": \"<short explanation>\", \"confidence\": <number between 0 and 1>}}",
        min = bounds.min,
        max = bounds.max,
        cpu = metrics.avg_cpu_percent,
        mem = metrics.avg_memory_percent,
    )
}

/// The span from the first `{` to the last `}`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Coerce a reasoning payload into a bounded [`Recommendation`].
pub fn validate_recommendation(
    payload: &Value,
    current_count: u32,
    bounds: InstanceBounds,
) -> Recommendation {
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .and_then(ScaleAction::parse)
        .unwrap_or(ScaleAction::NoChange);

    let target = match payload.get("target_count") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .unwrap_or(i64::from(current_count));

    let confidence = match payload.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| !c.is_nan())
    .unwrap_or(DEFAULT_CONFIDENCE)
    .clamp(0.0, 1.0);

    let reason = payload
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    Recommendation {
        action,
        target_count: bounds.clamp(target),
        reason,
        confidence,
        source: RecommendationSource::Reasoning,
    }
}

/// Deterministic rules used whenever reasoning is unavailable.
pub fn fallback_recommendation(
    current_count: u32,
    metrics: &StackMetrics,
    bounds: InstanceBounds,
) -> Recommendation {
    let cpu = metrics.avg_cpu_percent;
    let mem = metrics.avg_memory_percent;
    let usage = format!("CPU: {cpu:.1}%, Mem: {mem:.1}%");

    let (action, target_count, reason, confidence) = if cpu > 70.0 || mem > 80.0 {
        (
            ScaleAction::ScaleUp,
            (current_count + 1).min(bounds.max),
            format!("High resource usage ({usage}), rule fallback"),
            0.8,
        )
    } else if cpu < 30.0 && mem < 50.0 && current_count > bounds.min {
        (
            ScaleAction::ScaleDown,
            (current_count - 1).max(bounds.min),
            format!("Low resource usage ({usage}), rule fallback"),
            0.7,
        )
    } else {
        (
            ScaleAction::NoChange,
            current_count,
            format!("Resource usage within normal range ({usage}), rule fallback"),
            0.6,
        )
    };

    Recommendation {
        action,
        target_count,
        reason,
        confidence,
        source: RecommendationSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use serde_json::json;

    const BOUNDS: InstanceBounds = InstanceBounds { min: 1, max: 10 };

    fn metrics(cpu: f64, mem: f64) -> StackMetrics {
        StackMetrics {
            avg_cpu_percent: cpu,
            avg_memory_percent: mem,
            instance_count: 2,
        }
    }

    #[test]
    fn fallback_scales_up_on_high_cpu() {
        let rec = fallback_recommendation(2, &metrics(85.0, 40.0), BOUNDS);
        assert_eq!(rec.action, ScaleAction::ScaleUp);
        assert_eq!(rec.target_count, 3);
        assert_eq!(rec.confidence, 0.8);
        assert_eq!(rec.source, RecommendationSource::Fallback);
    }

    #[test]
    fn fallback_respects_bounds() {
        let at_max = fallback_recommendation(10, &metrics(20.0, 95.0), BOUNDS);
        assert_eq!(at_max.action, ScaleAction::ScaleUp);
        assert_eq!(at_max.target_count, 10);

        let at_min = fallback_recommendation(1, &metrics(5.0, 10.0), BOUNDS);
        assert_eq!(at_min.action, ScaleAction::NoChange);
        assert_eq!(at_min.confidence, 0.6);

        let down = fallback_recommendation(3, &metrics(5.0, 10.0), BOUNDS);
        assert_eq!((down.action, down.target_count), (ScaleAction::ScaleDown, 2));
        assert_eq!(down.confidence, 0.7);
    }

    #[test]
    fn validation_clamps_and_coerces() {
        let rec = validate_recommendation(
            &json!({"action": "scale_up", "target_count": 50, "confidence": 1.7, "reason": "spike"}),
            2,
            BOUNDS,
        );
        assert_eq!(rec.target_count, 10);
        assert_eq!(rec.confidence, 1.0);
        assert_eq!(rec.reason, "spike");

        let rec = validate_recommendation(
            &json!({"action": "explode", "target_count": "4", "confidence": "-2", "reason": 7}),
            2,
            BOUNDS,
        );
        assert_eq!(rec.action, ScaleAction::NoChange);
        assert_eq!(rec.target_count, 4);
        assert_eq!(rec.confidence, 0.0);
        assert_eq!(rec.reason, "AI recommendation");

        let rec = validate_recommendation(
            &json!({"action": "scale_down", "target_count": 0.9, "confidence": "high"}),
            3,
            BOUNDS,
        );
        assert_eq!(rec.target_count, 1);
        assert_eq!(rec.confidence, 0.5);

        let rec = validate_recommendation(&json!({"target_count": "lots"}), 3, BOUNDS);
        assert_eq!(rec.target_count, 3);
    }

    #[test]
    fn json_span_extraction() {
        assert_eq!(
            extract_json_object("```json\n{\"a\": {\"b\": 1}}\n```"),
            Some("{\"a\": {\"b\": 1}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn prompt_embeds_state_and_bounds() {
        let prompt = build_prompt("s1", 3, &metrics(85.456, 40.0), BOUNDS);
        assert!(prompt.contains("Instances running: 3"));
        assert!(prompt.contains("1 to 10"));
        assert!(prompt.contains("85.46%"));
    }

    #[tokio::test]
    async fn reasoning_answer_is_validated() {
        let env = TestEnv::new();
        let id = env.add_stack(2, Some("nlb.example"));
        let engine = env
            .engine(FakeMetrics::healthy(50.0, 50.0))
            .with_reasoning(FakeReasoning::answering(
                "Sure! ```{\"action\":\"scale_up\",\"target_count\":40,\"reason\":\"busy\",\"confidence\":0.9}```",
            ));

        let assessment = engine.recommend(&id).await.unwrap();
        let rec = assessment.recommendation;
        assert_eq!(rec.source, RecommendationSource::Reasoning);
        assert_eq!(rec.action, ScaleAction::ScaleUp);
        assert_eq!(rec.target_count, 10);
        assert_eq!(assessment.current_count, 2);
        assert!(assessment.metrics.is_some());
    }

    #[tokio::test]
    async fn reasoning_failures_fall_back_to_rules() {
        let env = TestEnv::new();
        let id = env.add_stack(2, Some("nlb.example"));

        for reasoning in [FakeReasoning::failing(), FakeReasoning::answering("I think you should scale up")] {
            let engine = env.engine(FakeMetrics::healthy(85.0, 40.0)).with_reasoning(reasoning);
            let rec = engine.recommend(&id).await.unwrap().recommendation;
            assert_eq!(rec.source, RecommendationSource::Fallback);
            assert_eq!(rec.action, ScaleAction::ScaleUp);
            assert_eq!(rec.target_count, 3);
            assert_eq!(rec.confidence, 0.8);
        }

        let engine = env.engine(FakeMetrics::healthy(85.0, 40.0));
        let rec = engine.recommend(&id).await.unwrap().recommendation;
        assert_eq!(rec.source, RecommendationSource::Fallback);
    }

    #[tokio::test]
    async fn missing_metrics_degrade_to_no_change() {
        let env = TestEnv::new();
        let no_lb = env.add_stack(2, None);
        let with_lb = env.add_stack(3, Some("nlb.example"));
        let engine = env.engine(FakeMetrics::down());

        for (id, count) in [(no_lb, 2), (with_lb, 3)] {
            let assessment = engine.recommend(&id).await.unwrap();
            let rec = assessment.recommendation;
            assert_eq!(rec.source, RecommendationSource::Degraded);
            assert_eq!(rec.action, ScaleAction::NoChange);
            assert_eq!(rec.target_count, count);
            assert_eq!(rec.confidence, 0.0);
            assert!(rec.reason.starts_with("Unable to fetch metrics"));
            assert!(assessment.metrics.is_none());
        }
    }

    #[tokio::test]
    async fn unknown_stack_is_an_error() {
        let env = TestEnv::new();
        let engine = env.engine(FakeMetrics::healthy(1.0, 1.0));
        let err = engine.recommend("20250101000000-00000000").await.unwrap_err();
        assert!(matches!(err, stackpilot_scaling::ScalingError::NotFound(_)));
    }
}
