//! Request and result records of lifecycle operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stackpilot_keys::{CleanupReport, SlotKeypair};
use stackpilot_state::{InstanceSlot, ScaleAction, Stack, StackId, StackOutputs};

/// How a scale call ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScaleOutcome {
    /// Target equals the declared count; nothing was touched.
    Unchanged,
    /// Infrastructure applied and the record committed.
    Scaled,
    /// Keypair step failed; provisioning never ran.
    KeypairFailed { errors: Vec<String> },
    /// The provisioning tool failed in `phase`.
    ProvisionFailed { phase: String },
}

/// Uniform result of [`scale`](crate::StackOrchestrator::scale).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleResult {
    pub stack_id: StackId,
    pub old_count: u32,
    pub target_count: u32,
    pub action: ScaleAction,
    pub reason: Option<String>,
    #[serde(flatten)]
    pub outcome: ScaleOutcome,
    pub keypairs_added: Vec<String>,
    pub keypairs_removed: Vec<String>,
    pub logs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<StackOutputs>,
}

impl ScaleResult {
    pub(crate) fn new(stack_id: &str, old_count: u32, target_count: u32, reason: Option<String>) -> Self {
        Self {
            stack_id: stack_id.to_string(),
            old_count,
            target_count,
            action: ScaleAction::between(old_count, target_count),
            reason,
            outcome: ScaleOutcome::Unchanged,
            keypairs_added: Vec::new(),
            keypairs_removed: Vec::new(),
            logs: BTreeMap::new(),
            outputs: None,
        }
    }

    /// The declared count now equals the target.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ScaleOutcome::Unchanged | ScaleOutcome::Scaled)
    }
}

fn default_instance_count() -> u32 {
    1
}

/// Parameters of a new stack. Unset fields take the configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployRequest {
    pub name_prefix: String,
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub az: Option<String>,
    #[serde(default)]
    pub vpc_cidr: Option<String>,
    #[serde(default)]
    pub subnet_cidr: Option<String>,
    #[serde(default)]
    pub ami: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
    /// Bootstrap script content, written into the stack namespace.
    #[serde(default)]
    pub user_data_inline: Option<String>,
    /// Existing bootstrap script; wins over `user_data_inline`.
    #[serde(default)]
    pub user_data_path: Option<String>,
}

impl DeployRequest {
    pub fn new(name_prefix: &str, instance_count: u32) -> Self {
        Self {
            name_prefix: name_prefix.to_string(),
            instance_count,
            region: None,
            az: None,
            vpc_cidr: None,
            subnet_cidr: None,
            ami: None,
            instance_type: None,
            user_data_inline: None,
            user_data_path: None,
        }
    }
}

/// Result of [`deploy`](crate::StackOrchestrator::deploy).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployResult {
    pub stack_id: StackId,
    pub success: bool,
    /// `APPLIED`, `FAILED_INIT`, `FAILED_APPLY` or `FAILED_KEYPAIRS`.
    pub phase: String,
    pub keypairs: Vec<SlotKeypair>,
    pub errors: Vec<String>,
    pub logs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Stack>,
}

/// Result of [`teardown`](crate::StackOrchestrator::teardown).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeardownResult {
    pub stack_id: StackId,
    pub destroyed: bool,
    pub logs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypairs: Option<CleanupReport>,
}

/// Stored record plus what the provisioning tool currently reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackDescription {
    pub stack: Stack,
    pub slots: Vec<InstanceSlot>,
    pub live_outputs: StackOutputs,
}
