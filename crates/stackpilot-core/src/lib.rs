//! stackpilot-core — shared building blocks for the Stackpilot crates.
//!
//! - [`config`]: `stackpilot.toml` parsing with environment overrides
//! - [`credentials`]: cloud credentials injected into provisioning subprocesses
//! - [`ids`]: stack identifier generation and validation
//! - [`slots`]: instance slot naming and scale-range arithmetic

pub mod config;
pub mod credentials;
pub mod ids;
pub mod slots;

pub use config::StackpilotConfig;
pub use credentials::{CloudCredentials, CredentialError};
pub use ids::{is_valid_stack_id, new_stack_id};
pub use slots::{InstanceBounds, instance_name, keypair_name, parse_keypair_index};
