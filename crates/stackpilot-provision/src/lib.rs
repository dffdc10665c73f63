//! stackpilot-provision — drives the external infrastructure tool.
//!
//! The driver renders `main.tf` from a stack context, runs the tool as a
//! subprocess with a bounded timeout, and classifies the run into a
//! [`ProvisionPhase`]. It never interprets why the tool failed; callers get
//! the captured logs keyed by phase name.

pub mod driver;
pub mod error;
pub mod outputs;
pub mod render;
pub mod runner;

pub use driver::{DestroyReport, ProvisionPhase, ProvisionReport, Provisioner, TerraformDriver};
pub use error::{ProvisionError, ProvisionResult};
pub use outputs::parse_outputs;
pub use render::TemplateRenderer;
pub use runner::{CommandRunner, PhaseRun};
