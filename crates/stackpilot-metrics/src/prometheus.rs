//! Prometheus HTTP query API types.
//!
//! Only the instant-query shape is modelled:
//! `{status, data: {resultType, result: [{metric, value: [ts, "number"]}]}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Average non-idle CPU across all node exporters, in percent.
pub const CPU_QUERY: &str = r#"avg(rate(node_cpu_seconds_total{mode!="idle"}[5m])) * 100"#;

/// Average memory in use across all node exporters, in percent.
pub const MEMORY_QUERY: &str =
    "(1 - avg(node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)) * 100";

/// Number of node exporters reporting.
pub const INSTANCE_COUNT_QUERY: &str = r#"count(up{job="node"})"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryData {
    #[serde(default, rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Sample>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    #[serde(default)]
    pub metric: serde_json::Map<String, Value>,
    /// `[unix_ts, "value"]`
    #[serde(default)]
    pub value: Option<Value>,
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// `result[0].value[1]` as a float, when present and well formed.
    pub fn first_value(&self) -> Option<f64> {
        if !self.is_success() {
            return None;
        }
        let sample = self.data.as_ref()?.result.first()?;
        let value: Option<f64> = match sample.value.as_ref()?.get(1)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    /// [`first_value`](Self::first_value), or 0.0 when absent.
    pub fn value_or_zero(&self) -> f64 {
        self.first_value().unwrap_or(0.0)
    }
}
