//! Fakes shared by the unit tests of this crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stackpilot_core::{InstanceBounds, new_stack_id};
use stackpilot_metrics::{MetricsError, MetricsResult, MetricsSource, QueryResponse, StackMetrics};
use stackpilot_scaling::{ScaleOutcome, ScaleResult, ScalingError};
use stackpilot_state::{ScaleAction, Stack, StackContext, StackOutputs, StateStore};

use crate::advisor::ReasoningService;
use crate::error::{AdvisorError, AdvisorResult};
use crate::recommend::RecommendationEngine;
use crate::scaler::{ScaleCallback, ScaleFuture};

pub struct FakeMetrics {
    metrics: Option<(f64, f64)>,
}

impl FakeMetrics {
    pub fn healthy(cpu: f64, mem: f64) -> Arc<Self> {
        Arc::new(Self {
            metrics: Some((cpu, mem)),
        })
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self { metrics: None })
    }
}

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn stack_metrics(&self, _endpoint: &str, declared_count: u32) -> MetricsResult<StackMetrics> {
        match self.metrics {
            Some((cpu, mem)) => Ok(StackMetrics {
                avg_cpu_percent: cpu,
                avg_memory_percent: mem,
                instance_count: declared_count,
            }),
            None => Err(MetricsError::Transport("connection refused".into())),
        }
    }

    async fn query(&self, _endpoint: &str, _promql: &str) -> MetricsResult<QueryResponse> {
        Err(MetricsError::Transport("connection refused".into()))
    }
}

pub struct FakeReasoning {
    answer: Option<String>,
}

impl FakeReasoning {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(text.to_string()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { answer: None })
    }
}

#[async_trait]
impl ReasoningService for FakeReasoning {
    async fn generate(&self, _prompt: &str) -> AdvisorResult<String> {
        self.answer.clone().ok_or(AdvisorError::Status(503))
    }
}

pub struct TestEnv {
    _dir: tempfile::TempDir,
    pub store: StateStore,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        Self { _dir: dir, store }
    }

    pub fn add_stack(&self, count: u32, nlb: Option<&str>) -> String {
        let stack_id = new_stack_id();
        let context = StackContext {
            region: "ap-southeast-2".into(),
            az: "ap-southeast-2a".into(),
            vpc_cidr: "10.0.0.0/16".into(),
            subnet_cidr: "10.0.1.0/24".into(),
            name_prefix: "web".into(),
            instance_count: count,
            ami: "ami-1".into(),
            instance_type: "t3.micro".into(),
            user_data_path: "u.sh".into(),
        };
        let outputs = StackOutputs {
            nlb_dns_name: nlb.map(str::to_string),
            ..StackOutputs::default()
        };
        self.store
            .save(&Stack::new(&stack_id, context, outputs))
            .unwrap();
        stack_id
    }

    pub fn engine(&self, metrics: Arc<FakeMetrics>) -> RecommendationEngine {
        RecommendationEngine::new(self.store.clone(), metrics, InstanceBounds::new(1, 10))
    }
}

/// Records `(stack_id, target, reason)` for every scale request.
#[derive(Clone, Default)]
pub struct ScaleRecorder {
    pub calls: Arc<Mutex<Vec<(String, u32, String)>>>,
}

impl ScaleRecorder {
    pub fn calls(&self) -> Vec<(String, u32, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Callback that records the request and either scales or rejects it.
    pub fn callback(&self, fail: bool) -> ScaleCallback {
        let calls = self.calls.clone();
        Box::new(move |stack_id: &str, target: u32, reason: String| -> ScaleFuture {
            calls
                .lock()
                .unwrap()
                .push((stack_id.to_string(), target, reason.clone()));
            let stack_id = stack_id.to_string();
            Box::pin(async move {
                if fail {
                    return Err(ScalingError::InvalidArgument(format!("{stack_id} rejected")));
                }
                Ok(ScaleResult {
                    stack_id,
                    old_count: 2,
                    target_count: target,
                    action: ScaleAction::between(2, target),
                    reason: Some(reason),
                    outcome: ScaleOutcome::Scaled,
                    keypairs_added: Vec::new(),
                    keypairs_removed: Vec::new(),
                    logs: Default::default(),
                    outputs: None,
                })
            })
        })
    }
}
