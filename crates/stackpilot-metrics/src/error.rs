//! Metrics client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("no monitoring endpoint recorded for stack {0}")]
    NoEndpoint(String),

    #[error("metrics backend unreachable: {0}")]
    Transport(String),

    #[error("metrics backend returned HTTP {0}")]
    Status(u16),

    #[error("malformed metrics response: {0}")]
    Decode(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;
