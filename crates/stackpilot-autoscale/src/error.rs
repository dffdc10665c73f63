//! Reasoning service errors.

use thiserror::Error;

/// Failure to obtain advice from the reasoning service. Every variant sends
/// the recommendation engine to its rule fallback.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("reasoning request failed: {0}")]
    Transport(String),

    #[error("reasoning service returned HTTP {0}")]
    Status(u16),

    #[error("reasoning service returned no candidates")]
    EmptyResponse,

    #[error("unparseable reasoning response: {0}")]
    Decode(String),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;
