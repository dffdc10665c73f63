//! stackpilot-autoscale — recommendation-driven stack scaling.
//!
//! The recommendation engine reads a stack's declared count and live
//! metrics, asks a reasoning service for a decision and validates it. When
//! the reasoning service is unavailable a rule set decides instead:
//!
//! ```text
//! cpu > 70% or mem > 80%                 → scale_up   (+1, ≤ max)  confidence 0.8
//! cpu < 30% and mem < 50% and n > min    → scale_down (−1, ≥ min)  confidence 0.7
//! otherwise                              → no_change               confidence 0.6
//! ```
//!
//! The autoscaler runs the engine for every stack on a fixed interval and
//! executes recommendations whose confidence clears the threshold.

pub mod advisor;
pub mod error;
pub mod recommend;
pub mod scaler;

#[cfg(test)]
mod test_support;

pub use advisor::{GeminiClient, ReasoningService};
pub use error::{AdvisorError, AdvisorResult};
pub use recommend::{Assessment, Recommendation, RecommendationEngine, RecommendationSource};
pub use scaler::{
    AutoscaleService, AutoscaleStatus, Autoscaler, Evaluation, ScaleCallback, ScaleDecision,
    ScaleFuture, orchestrator_callback,
};
