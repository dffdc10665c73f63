//! HTTP client for a stack's Prometheus-compatible query API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stackpilot_state::Stack;

use crate::error::{MetricsError, MetricsResult};
use crate::prometheus::{CPU_QUERY, INSTANCE_COUNT_QUERY, MEMORY_QUERY, QueryResponse};

/// Summary signals for one stack.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StackMetrics {
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
    pub instance_count: u32,
}

/// Source of stack telemetry.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Summary metrics from `endpoint`. `declared_count` stands in for the
    /// instance count when the backend does not report one.
    async fn stack_metrics(&self, endpoint: &str, declared_count: u32)
    -> MetricsResult<StackMetrics>;

    /// Run an arbitrary instant query.
    async fn query(&self, endpoint: &str, promql: &str) -> MetricsResult<QueryResponse>;
}

/// Monitoring endpoint of a stack, served behind its load balancer.
pub fn monitoring_endpoint(stack: &Stack) -> MetricsResult<String> {
    stack
        .outputs
        .nlb_dns_name
        .as_deref()
        .filter(|dns| !dns.is_empty())
        .map(|dns| format!("http://{dns}/mimir"))
        .ok_or_else(|| MetricsError::NoEndpoint(stack.stack_id.clone()))
}

/// [`MetricsSource`] over the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(timeout: Duration) -> MetricsResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::Transport(e.to_string()))?;
        Ok(Self { http })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn stack_metrics(
        &self,
        endpoint: &str,
        declared_count: u32,
    ) -> MetricsResult<StackMetrics> {
        let cpu = self.query(endpoint, CPU_QUERY).await?;
        let memory = self.query(endpoint, MEMORY_QUERY).await?;
        let instances = self.query(endpoint, INSTANCE_COUNT_QUERY).await?;

        let metrics = StackMetrics {
            avg_cpu_percent: round2(cpu.value_or_zero()),
            avg_memory_percent: round2(memory.value_or_zero()),
            instance_count: instances
                .first_value()
                .filter(|v| *v >= 0.0)
                .map(|v| v as u32)
                .unwrap_or(declared_count),
        };
        debug!(%endpoint, ?metrics, "stack metrics collected");
        Ok(metrics)
    }

    async fn query(&self, endpoint: &str, promql: &str) -> MetricsResult<QueryResponse> {
        let url = format!("{}/prometheus/api/v1/query", endpoint.trim_end_matches('/'));
        let time = Utc::now().to_rfc3339();

        let response = self
            .http
            .get(&url)
            .query(&[("query", promql), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        let status = response.status();
        // Prometheus answers bad queries with 400/422 and an error body.
        if status.is_server_error() {
            return Err(MetricsError::Status(status.as_u16()));
        }
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| MetricsError::Decode(e.to_string()))?;
        if !body.is_success() {
            debug!(%promql, error = ?body.error, "query rejected by backend");
        }
        Ok(body)
    }
}
