//! stackpilot-state — stack metadata store for Stackpilot.
//!
//! Every stack owns a namespace directory under the work root, named after
//! its stack id. The directory holds the JSON metadata record, the rendered
//! provisioning configuration, and the private-key directory.
//!
//! # Layout
//!
//! ```text
//! {work_root}/{stack_id}/deploy_metadata.json
//! {work_root}/{stack_id}/main.tf
//! {work_root}/{stack_id}/private-key/{prefix}-vm-{i}.pem
//! ```
//!
//! Records are replaced atomically (temp file + rename), so concurrent
//! readers never observe a partially written file. The `StateStore` is
//! `Clone` + `Send` + `Sync` and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
