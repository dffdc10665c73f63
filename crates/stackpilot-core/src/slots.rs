//! Instance slot arithmetic.
//!
//! Slots are 1-based and contiguous from 1 to the declared count. Growing
//! appends at the next index; shrinking removes the highest indices first,
//! because the provisioning backend addresses instances by list position.

use serde::{Deserialize, Serialize};

/// Global min/max instance count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceBounds {
    pub min: u32,
    pub max: u32,
}

impl InstanceBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, count: u32) -> bool {
        (self.min..=self.max).contains(&count)
    }

    pub fn clamp(&self, count: i64) -> u32 {
        count.clamp(i64::from(self.min), i64::from(self.max)) as u32
    }
}

/// Name of the keypair owned by slot `index`.
pub fn keypair_name(prefix: &str, index: u32) -> String {
    format!("{prefix}-vm-{index}")
}

/// Name of the instance occupying slot `index`.
pub fn instance_name(prefix: &str, index: u32) -> String {
    format!("{prefix}-{index}")
}

/// Recover the slot index from a keypair name produced by [`keypair_name`].
pub fn parse_keypair_index(prefix: &str, key_name: &str) -> Option<u32> {
    key_name
        .strip_prefix(prefix)?
        .strip_prefix("-vm-")?
        .parse()
        .ok()
        .filter(|i| *i > 0)
}

/// Slots created when growing from `old` to `target`, ascending.
pub fn slots_to_add(old: u32, target: u32) -> Vec<u32> {
    if target <= old {
        return Vec::new();
    }
    (old + 1..=target).collect()
}

/// Slots removed when shrinking from `old` to `target`, highest first.
pub fn slots_to_remove(old: u32, target: u32) -> Vec<u32> {
    if target >= old {
        return Vec::new();
    }
    (target + 1..=old).rev().collect()
}
