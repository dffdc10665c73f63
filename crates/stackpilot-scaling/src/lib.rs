//! stackpilot-scaling — stack lifecycle orchestration.
//!
//! The orchestrator is the only writer of declared state. It reconciles a
//! target instance count against the provisioned infrastructure:
//!
//! ```text
//! StackOrchestrator::scale(stack, target)
//!   ├── StackLocks        (serialize per stack)
//!   ├── StateStore        (load declared count)
//!   ├── KeypairManager    (create slots old+1..=target / destroy target+1..=old, LIFO)
//!   ├── Provisioner       (render + apply + outputs)
//!   └── StateStore        (save, only after Applied)
//! ```
//!
//! `deploy` and `teardown` follow the same pattern for the first and last
//! reconciliation of a stack.

pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod result;

pub use error::{ScalingError, ScalingResult};
pub use locks::StackLocks;
pub use orchestrator::StackOrchestrator;
pub use result::{
    DeployRequest, DeployResult, ScaleOutcome, ScaleResult, StackDescription, TeardownResult,
};
