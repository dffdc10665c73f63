//! StackOrchestrator — reconciles declared instance counts with the
//! provisioned infrastructure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use stackpilot_core::config::{DefaultsConfig, StackpilotConfig};
use stackpilot_core::slots::{slots_to_add, slots_to_remove};
use stackpilot_core::{CloudCredentials, InstanceBounds, new_stack_id};
use stackpilot_keys::{KeypairManager, LocalKeypair};
use stackpilot_provision::{ProvisionPhase, Provisioner};
use stackpilot_state::{ScalingEvent, Stack, StackContext, StateError, StateStore};

use crate::error::{ScalingError, ScalingResult};
use crate::locks::StackLocks;
use crate::result::*;

const USER_DATA_FILE: &str = "user_data.sh";
const DEFAULT_USER_DATA: &str = "#!/usr/bin/env bash\n";
const FAILED_KEYPAIRS: &str = "FAILED_KEYPAIRS";

/// Drives keypairs, provisioning and the metadata store for every
/// lifecycle operation. Cheap to clone.
#[derive(Clone)]
pub struct StackOrchestrator {
    store: StateStore,
    keys: KeypairManager,
    provisioner: Arc<dyn Provisioner>,
    locks: StackLocks,
    bounds: InstanceBounds,
    defaults: DefaultsConfig,
    credentials: CloudCredentials,
}

impl StackOrchestrator {
    pub fn new(
        store: StateStore,
        keys: KeypairManager,
        provisioner: Arc<dyn Provisioner>,
        config: &StackpilotConfig,
    ) -> Self {
        Self {
            store,
            keys,
            provisioner,
            locks: StackLocks::new(),
            bounds: config.scaling.bounds(),
            defaults: config.defaults.clone(),
            credentials: config.credentials.clone(),
        }
    }

    pub fn bounds(&self) -> InstanceBounds {
        self.bounds
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    // ── Scale ──────────────────────────────────────────────────────

    /// Reconcile `stack_id` to `target_count` instances.
    ///
    /// Holds the stack's lifecycle lock for the whole call. The record is
    /// only written after the provisioning tool reports Applied.
    pub async fn scale(
        &self,
        stack_id: &str,
        target_count: u32,
        reason: Option<String>,
    ) -> ScalingResult<ScaleResult> {
        let _guard = self.locks.acquire(stack_id).await;

        let mut stack = self.store.load(stack_id)?;
        self.check_bounds(target_count)?;

        let old_count = stack.declared_count();
        let mut result = ScaleResult::new(stack_id, old_count, target_count, reason.clone());
        if target_count == old_count {
            debug!(%stack_id, target_count, "already at target");
            return Ok(result);
        }

        let env = self.credentials.env_for(&stack.region)?;
        let prefix = stack.name_prefix().to_string();
        let region = stack.region.clone();

        let mut errors = Vec::new();
        for index in slots_to_add(old_count, target_count) {
            match self.keys.create_for_slot(stack_id, index, &prefix, &region).await {
                Ok(key) => result.keypairs_added.push(key.key_name),
                Err(e) => errors.push(e.to_string()),
            }
        }
        // Removal stops at the first failure so only a contiguous top block
        // of slots ever loses its keys.
        for index in slots_to_remove(old_count, target_count) {
            match self.keys.destroy_for_slot(stack_id, index, &prefix, &region).await {
                Ok(removal) => match removal.failure() {
                    Some(err) => errors.push(err),
                    None => result.keypairs_removed.push(removal.key_name),
                },
                Err(e) => errors.push(e.to_string()),
            }
            if !errors.is_empty() {
                break;
            }
        }
        if !errors.is_empty() {
            warn!(%stack_id, from = old_count, to = target_count, failures = errors.len(), "keypair step failed, not provisioning");
            result.outcome = ScaleOutcome::KeypairFailed { errors };
            return Ok(result);
        }

        let workdir = self.store.stack_dir(stack_id)?;
        let mut context = stack.context.clone();
        context.instance_count = target_count;
        self.provisioner.render(&context, &workdir)?;

        let report = self.provisioner.apply(&workdir, &env).await;
        result.logs = report.logs;
        let outputs = match report.phase {
            ProvisionPhase::Applied(outputs) => outputs,
            failed => {
                warn!(%stack_id, from = old_count, to = target_count, phase = failed.as_str(), "scale apply failed");
                result.outcome = ScaleOutcome::ProvisionFailed {
                    phase: failed.as_str().to_string(),
                };
                return Ok(result);
            }
        };

        stack.record_scale(
            ScalingEvent {
                timestamp: Utc::now(),
                old_count,
                new_count: target_count,
                action: result.action,
                reason,
                keypairs_added: result.keypairs_added.clone(),
                keypairs_removed: result.keypairs_removed.clone(),
            },
            outputs,
        );
        self.store.save(&stack)?;

        info!(%stack_id, from = old_count, to = target_count, action = %result.action, "stack scaled");
        result.outcome = ScaleOutcome::Scaled;
        result.outputs = Some(stack.outputs);
        Ok(result)
    }

    // ── Deploy ─────────────────────────────────────────────────────

    /// Provision a new stack. Nothing is recorded unless the tool applies.
    pub async fn deploy(&self, request: DeployRequest) -> ScalingResult<DeployResult> {
        self.check_bounds(request.instance_count)?;
        validate_prefix(&request.name_prefix)?;

        let region = request
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.defaults.region.clone());
        let env = self.credentials.env_for(&region)?;

        let ami = request
            .ami
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| self.defaults.ami.clone());
        if ami.is_empty() {
            return Err(ScalingError::InvalidArgument("ami is required".to_string()));
        }

        let stack_id = new_stack_id();
        let _guard = self.locks.acquire(&stack_id).await;
        let workdir = self.store.create_namespace(&stack_id)?;
        let user_data_path = write_user_data(&workdir, &request)?;

        let pick = |value: &Option<String>, default: &String| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.clone())
        };
        let context = StackContext {
            region: region.clone(),
            az: pick(&request.az, &self.defaults.az),
            vpc_cidr: pick(&request.vpc_cidr, &self.defaults.vpc_cidr),
            subnet_cidr: pick(&request.subnet_cidr, &self.defaults.subnet_cidr),
            name_prefix: request.name_prefix.clone(),
            instance_count: request.instance_count,
            ami,
            instance_type: pick(&request.instance_type, &self.defaults.instance_type),
            user_data_path,
        };

        let mut result = DeployResult {
            stack_id: stack_id.clone(),
            success: false,
            phase: String::new(),
            keypairs: Vec::new(),
            errors: Vec::new(),
            logs: Default::default(),
            stack: None,
        };

        for index in 1..=request.instance_count {
            match self
                .keys
                .create_for_slot(&stack_id, index, &request.name_prefix, &region)
                .await
            {
                Ok(key) => result.keypairs.push(key),
                Err(e) => result.errors.push(e.to_string()),
            }
        }
        if !result.errors.is_empty() {
            warn!(%stack_id, failures = result.errors.len(), "deploy aborted: keypair step failed");
            result.phase = FAILED_KEYPAIRS.to_string();
            return Ok(result);
        }

        self.provisioner.render(&context, &workdir)?;
        let report = self.provisioner.init_apply(&workdir, &env).await;
        result.phase = report.phase.as_str().to_string();
        result.logs = report.logs;

        match report.phase {
            ProvisionPhase::Applied(outputs) => {
                let stack = Stack::new(&stack_id, context, outputs);
                self.store.save(&stack)?;
                info!(%stack_id, instance_count = request.instance_count, %region, "stack deployed");
                result.success = true;
                result.stack = Some(stack);
            }
            failed => {
                warn!(%stack_id, phase = failed.as_str(), "deploy failed");
            }
        }
        Ok(result)
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Destroy a stack's infrastructure, then its keypairs and namespace.
    ///
    /// If the tool fails to destroy, nothing local is removed.
    pub async fn teardown(&self, stack_id: &str) -> ScalingResult<TeardownResult> {
        let guard = self.locks.acquire(stack_id).await;

        if !self.store.namespace_exists(stack_id) {
            return Err(ScalingError::NotFound(stack_id.to_string()));
        }
        let region = match self.store.load(stack_id) {
            Ok(stack) => stack.region,
            Err(StateError::NotFound(_)) => self.defaults.region.clone(),
            Err(e) => {
                warn!(%stack_id, error = %e, "unreadable record, tearing down with default region");
                self.defaults.region.clone()
            }
        };
        let env = self.credentials.env_for(&region)?;
        let workdir = self.store.stack_dir(stack_id)?;

        let report = self.provisioner.destroy(&workdir, &env).await;
        let mut result = TeardownResult {
            stack_id: stack_id.to_string(),
            destroyed: report.success,
            logs: report.logs,
            keypairs: None,
        };
        if !report.success {
            warn!(%stack_id, "destroy failed, keeping local state");
            return Ok(result);
        }

        result.keypairs = Some(self.keys.cleanup_all(stack_id, &region).await?);
        self.store.delete(stack_id)?;
        drop(guard);
        self.locks.forget(stack_id).await;

        info!(%stack_id, %region, "stack torn down");
        Ok(result)
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn list(&self) -> ScalingResult<Vec<Stack>> {
        Ok(self.store.list()?)
    }

    /// Stored record plus live outputs. Takes no lock.
    pub async fn describe(&self, stack_id: &str) -> ScalingResult<StackDescription> {
        let stack = self.store.load(stack_id)?;
        let workdir = self.store.stack_dir(stack_id)?;
        let env = self.credentials.env_for(&stack.region).unwrap_or_default();
        let live_outputs = self.provisioner.outputs(&workdir, &env).await;

        Ok(StackDescription {
            slots: stack.slots(),
            stack,
            live_outputs,
        })
    }

    /// Private key files present for a stack.
    pub fn keypairs(&self, stack_id: &str) -> ScalingResult<Vec<LocalKeypair>> {
        if !self.store.namespace_exists(stack_id) {
            return Err(ScalingError::NotFound(stack_id.to_string()));
        }
        let prefix = match self.store.load(stack_id) {
            Ok(stack) => Some(stack.name_prefix().to_string()),
            Err(StateError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(self.keys.list(stack_id, prefix.as_deref())?)
    }

    fn check_bounds(&self, count: u32) -> ScalingResult<()> {
        if self.bounds.contains(count) {
            Ok(())
        } else {
            Err(ScalingError::InvalidArgument(format!(
                "instance count {count} outside [{}, {}]",
                self.bounds.min, self.bounds.max
            )))
        }
    }
}

fn validate_prefix(prefix: &str) -> ScalingResult<()> {
    let valid = !prefix.is_empty()
        && prefix.len() <= 24
        && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !prefix.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ScalingError::InvalidArgument(format!(
            "invalid name prefix {prefix:?}"
        )))
    }
}

/// Resolve the bootstrap script path, writing inline content when given.
fn write_user_data(workdir: &Path, request: &DeployRequest) -> ScalingResult<String> {
    if let Some(path) = request.user_data_path.as_ref().filter(|p| !p.is_empty()) {
        return Ok(path.clone());
    }
    let content = request
        .user_data_inline
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_USER_DATA);
    let path: PathBuf = workdir.join(USER_DATA_FILE);
    std::fs::write(&path, content)
        .map_err(|e| ScalingError::State(StateError::Write(e.to_string())))?;
    Ok(path.to_string_lossy().into_owned())
}
