//! stackpilot-keys — per-slot keypair lifecycle.
//!
//! Every instance slot owns exactly one keypair named `{prefix}-vm-{index}`:
//! a PKCS#1 private key under the stack's `private-key/` directory and a
//! public key registered with the cloud key registry under the same name.
//! The [`KeypairManager`] creates and destroys both halves together.

pub mod error;
pub mod generate;
pub mod manager;
pub mod registry;

pub use error::{KeyError, KeyResult, RegistryError};
pub use generate::{GeneratedKey, generate_keypair};
pub use manager::{
    CleanupReport, DEFAULT_KEY_BITS, KeypairManager, LocalKeypair, RemovalStatus, SlotKeypair,
    SlotRemoval,
};
pub use registry::{AwsCliKeyRegistry, KeyRegistry, RegisteredKey};
