//! Provisioning error types.

use thiserror::Error;

/// Errors raised before the external tool runs. Tool failures are not
/// errors; they are reported as phases.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("template error: {0}")]
    Template(String),

    #[error("workdir error: {0}")]
    Io(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
