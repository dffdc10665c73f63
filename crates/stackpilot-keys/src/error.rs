//! Keypair error types.

use std::time::Duration;

use thiserror::Error;

use stackpilot_core::CredentialError;
use stackpilot_state::StateError;

/// Errors reported by a key registry backend.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry command failed: {0}")]
    Command(String),

    #[error("registry call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected registry response: {0}")]
    Parse(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Errors from keypair lifecycle operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generate(String),

    #[error("key file error: {0}")]
    Io(String),

    #[error("registry error for {key_name}: {source}")]
    Registry {
        key_name: String,
        #[source]
        source: RegistryError,
    },

    #[error("failed to remove {key_name}: remote: {remote}; local: {local}")]
    Removal {
        key_name: String,
        remote: String,
        local: String,
    },

    #[error("state error: {0}")]
    State(#[from] StateError),
}

pub type KeyResult<T> = Result<T, KeyError>;
