//! Orchestrator error types.

use thiserror::Error;

use stackpilot_core::CredentialError;
use stackpilot_keys::KeyError;
use stackpilot_provision::ProvisionError;
use stackpilot_state::StateError;

/// Errors that abort a lifecycle operation before it produces a result.
///
/// Failures of the keypair or provisioning steps are not errors; they are
/// reported inside the operation's result together with the logs.
#[derive(Debug, Error)]
pub enum ScalingError {
    #[error("stack not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("state store error: {0}")]
    State(StateError),

    #[error("keypair error: {0}")]
    Keys(#[from] KeyError),

    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),
}

impl From<StateError> for ScalingError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => ScalingError::NotFound(id),
            StateError::InvalidId(id) => ScalingError::InvalidArgument(format!("invalid stack id: {id:?}")),
            other => ScalingError::State(other),
        }
    }
}

pub type ScalingResult<T> = Result<T, ScalingError>;
