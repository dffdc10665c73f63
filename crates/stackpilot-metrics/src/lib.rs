//! stackpilot-metrics — read-only telemetry for deployed stacks.
//!
//! Each stack exposes a Prometheus-compatible query API (Mimir) behind its
//! load balancer. The client turns three PromQL queries into a
//! [`StackMetrics`] summary and also passes arbitrary queries through.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (trait)
//!   └── PrometheusClient
//!         ├── stack_metrics() → avg CPU %, avg memory %, instance count
//!         └── query()         → raw QueryResponse passthrough
//!
//! prometheus
//!   └── QueryResponse::first_value() → result[0].value[1] as f64
//! ```

pub mod client;
pub mod error;
pub mod prometheus;

pub use client::{MetricsSource, PrometheusClient, StackMetrics, monitoring_endpoint};
pub use error::{MetricsError, MetricsResult};
pub use prometheus::QueryResponse;
