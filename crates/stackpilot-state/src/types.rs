//! Domain types for the Stackpilot metadata store.
//!
//! A `Stack` record is the declared state of one deployed stack. It is the
//! single source of truth between orchestration runs and only changes
//! after a provisioning run succeeded.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stackpilot_core::slots::{instance_name, keypair_name};

/// Unique identifier for a stack; also its on-disk namespace.
pub type StackId = String;

/// Current version of the metadata record layout.
pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

// ── Stack ─────────────────────────────────────────────────────────

/// Declared state of a deployed stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stack {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub stack_id: StackId,
    pub region: String,
    /// Template context; `instance_count` is the declared count.
    pub context: StackContext,
    pub deployed_at: DateTime<Utc>,
    pub last_scaled_at: Option<DateTime<Utc>>,
    pub last_scale_reason: Option<String>,
    /// Outputs of the last successful provisioning run.
    #[serde(default)]
    pub outputs: StackOutputs,
    #[serde(default)]
    pub scaling_history: Vec<ScalingEvent>,
}

/// Variables rendered into the provisioning template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackContext {
    pub region: String,
    pub az: String,
    pub vpc_cidr: String,
    pub subnet_cidr: String,
    pub name_prefix: String,
    pub instance_count: u32,
    pub ami: String,
    pub instance_type: String,
    /// Path of the bootstrap script passed as instance user data.
    pub user_data_path: String,
}

/// Structured outputs read back from the provisioning tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackOutputs {
    pub instance_ids: Vec<String>,
    pub instance_public_ips: Vec<String>,
    pub instance_dns: Vec<String>,
    pub nlb_dns_name: Option<String>,
}

impl StackOutputs {
    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty()
            && self.instance_public_ips.is_empty()
            && self.instance_dns.is_empty()
            && self.nlb_dns_name.is_none()
    }
}

// ── Scaling history ───────────────────────────────────────────────

/// Direction of a scaling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    NoChange,
}

impl ScaleAction {
    pub fn between(old: u32, target: u32) -> Self {
        match target.cmp(&old) {
            std::cmp::Ordering::Greater => ScaleAction::ScaleUp,
            std::cmp::Ordering::Less => ScaleAction::ScaleDown,
            std::cmp::Ordering::Equal => ScaleAction::NoChange,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleAction::ScaleUp => "scale_up",
            ScaleAction::ScaleDown => "scale_down",
            ScaleAction::NoChange => "no_change",
        }
    }

    /// Parse the wire name; anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scale_up" => Some(ScaleAction::ScaleUp),
            "scale_down" => Some(ScaleAction::ScaleDown),
            "no_change" => Some(ScaleAction::NoChange),
            _ => None,
        }
    }
}

impl fmt::Display for ScaleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed scaling operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingEvent {
    pub timestamp: DateTime<Utc>,
    pub old_count: u32,
    pub new_count: u32,
    pub action: ScaleAction,
    pub reason: Option<String>,
    #[serde(default)]
    pub keypairs_added: Vec<String>,
    #[serde(default)]
    pub keypairs_removed: Vec<String>,
}

// ── Slots ─────────────────────────────────────────────────────────

/// One instance position within a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSlot {
    /// 1-based index.
    pub index: u32,
    pub name: String,
    pub key_name: String,
    pub instance_id: Option<String>,
    pub public_address: Option<String>,
}

impl Stack {
    /// Build the first record of a freshly provisioned stack.
    pub fn new(stack_id: &str, context: StackContext, outputs: StackOutputs) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            stack_id: stack_id.to_string(),
            region: context.region.clone(),
            context,
            deployed_at: Utc::now(),
            last_scaled_at: None,
            last_scale_reason: None,
            outputs,
            scaling_history: Vec::new(),
        }
    }

    /// Instance count recorded after the last successful reconciliation.
    pub fn declared_count(&self) -> u32 {
        self.context.instance_count
    }

    pub fn name_prefix(&self) -> &str {
        &self.context.name_prefix
    }

    /// Declared slots `1..=declared_count`, index-addressed.
    ///
    /// Addresses come from the last recorded outputs, which list instances
    /// in slot order.
    pub fn slots(&self) -> Vec<InstanceSlot> {
        let prefix = self.name_prefix();
        (1..=self.declared_count())
            .map(|index| {
                let pos = (index - 1) as usize;
                InstanceSlot {
                    index,
                    name: instance_name(prefix, index),
                    key_name: keypair_name(prefix, index),
                    instance_id: self.outputs.instance_ids.get(pos).cloned(),
                    public_address: self.outputs.instance_public_ips.get(pos).cloned(),
                }
            })
            .collect()
    }

    /// Commit a successful scaling operation to this record.
    pub fn record_scale(&mut self, event: ScalingEvent, outputs: StackOutputs) {
        self.context.instance_count = event.new_count;
        self.last_scaled_at = Some(event.timestamp);
        self.last_scale_reason = event.reason.clone();
        if !outputs.is_empty() {
            self.outputs = outputs;
        }
        self.scaling_history.push(event);
    }
}
