//! In-process fakes for the key registry and the provisioning tool.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use stackpilot_core::{CloudCredentials, StackpilotConfig};
use stackpilot_keys::{KeyRegistry, KeypairManager, RegisteredKey, RegistryError};
use stackpilot_provision::{
    DestroyReport, ProvisionPhase, ProvisionReport, ProvisionResult, Provisioner,
};
use stackpilot_scaling::StackOrchestrator;
use stackpilot_state::{StackContext, StackOutputs, StateStore};

#[derive(Default)]
pub struct FakeRegistry {
    keys: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    pub fail_import: Mutex<HashSet<String>>,
    pub fail_delete: Mutex<HashSet<String>>,
}

impl FakeRegistry {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Names passed to `delete`, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix("delete ").map(str::to_string))
            .collect()
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<_> = self.keys.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl KeyRegistry for FakeRegistry {
    async fn describe(
        &self,
        _region: &str,
        key_name: &str,
    ) -> Result<Option<RegisteredKey>, RegistryError> {
        self.calls.lock().unwrap().push(format!("describe {key_name}"));
        Ok(self.keys.lock().unwrap().get(key_name).map(|_| RegisteredKey {
            key_name: key_name.to_string(),
            key_id: None,
            fingerprint: None,
        }))
    }

    async fn delete(&self, _region: &str, key_name: &str) -> Result<bool, RegistryError> {
        self.calls.lock().unwrap().push(format!("delete {key_name}"));
        if self.fail_delete.lock().unwrap().contains(key_name) {
            return Err(RegistryError::Command("UnauthorizedOperation".into()));
        }
        Ok(self.keys.lock().unwrap().remove(key_name).is_some())
    }

    async fn import(
        &self,
        _region: &str,
        key_name: &str,
        public_key_openssh: &str,
    ) -> Result<RegisteredKey, RegistryError> {
        self.calls.lock().unwrap().push(format!("import {key_name}"));
        if self.fail_import.lock().unwrap().contains(key_name) {
            return Err(RegistryError::Command("InvalidKey.Format".into()));
        }
        self.keys
            .lock()
            .unwrap()
            .insert(key_name.to_string(), public_key_openssh.to_string());
        Ok(RegisteredKey {
            key_name: key_name.to_string(),
            key_id: Some(format!("key-{key_name}")),
            fingerprint: None,
        })
    }
}

/// Fake provisioning tool: applies whatever count was rendered last.
#[derive(Default)]
pub struct FakeProvisioner {
    calls: Mutex<Vec<String>>,
    rendered: AtomicU32,
    applied: AtomicU32,
    pub fail_init: AtomicBool,
    pub fail_apply: AtomicBool,
    pub fail_destroy: AtomicBool,
    pub apply_delay: Mutex<Duration>,
}

impl FakeProvisioner {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn outputs(count: u32) -> StackOutputs {
        StackOutputs {
            instance_ids: (1..=count).map(|i| format!("i-{i:04}")).collect(),
            instance_public_ips: (1..=count).map(|i| format!("10.0.0.{i}")).collect(),
            instance_dns: Vec::new(),
            nlb_dns_name: Some("web-nlb.example".into()),
        }
    }

    async fn run_apply(&self, logs: &mut BTreeMap<String, String>) -> ProvisionPhase {
        let delay = *self.apply_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        if self.fail_apply.load(Ordering::SeqCst) {
            logs.insert("apply".into(), "Error: quota exceeded".into());
            return ProvisionPhase::ApplyFailed;
        }
        let count = self.rendered.load(Ordering::SeqCst);
        self.applied.store(count, Ordering::SeqCst);
        logs.insert("apply".into(), format!("Apply complete! {count} instances"));
        ProvisionPhase::Applied(Self::outputs(count))
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    fn render(&self, context: &StackContext, workdir: &Path) -> ProvisionResult<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("render {}", context.instance_count));
        self.rendered.store(context.instance_count, Ordering::SeqCst);
        Ok(workdir.join("main.tf"))
    }

    async fn init_apply(&self, _workdir: &Path, env: &[(String, String)]) -> ProvisionReport {
        assert!(env.iter().any(|(k, _)| k == "AWS_ACCESS_KEY_ID"));
        self.calls.lock().unwrap().push("init_apply".into());
        let mut logs = BTreeMap::new();
        if self.fail_init.load(Ordering::SeqCst) {
            logs.insert("init".into(), "Error: provider download failed".into());
            return ProvisionReport {
                phase: ProvisionPhase::InitFailed,
                logs,
            };
        }
        logs.insert("init".into(), "Terraform has been successfully initialized!".into());
        let phase = self.run_apply(&mut logs).await;
        ProvisionReport { phase, logs }
    }

    async fn apply(&self, _workdir: &Path, _env: &[(String, String)]) -> ProvisionReport {
        self.calls.lock().unwrap().push("apply".into());
        let mut logs = BTreeMap::new();
        let phase = self.run_apply(&mut logs).await;
        ProvisionReport { phase, logs }
    }

    async fn outputs(&self, _workdir: &Path, _env: &[(String, String)]) -> StackOutputs {
        Self::outputs(self.applied.load(Ordering::SeqCst))
    }

    async fn destroy(&self, _workdir: &Path, _env: &[(String, String)]) -> DestroyReport {
        self.calls.lock().unwrap().push("destroy".into());
        let success = !self.fail_destroy.load(Ordering::SeqCst);
        let mut logs = BTreeMap::new();
        logs.insert(
            "destroy".into(),
            if success { "Destroy complete!" } else { "Error: dependency violation" }.into(),
        );
        DestroyReport { success, logs }
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: StateStore,
    pub registry: Arc<FakeRegistry>,
    pub provisioner: Arc<FakeProvisioner>,
    pub orchestrator: StackOrchestrator,
}

impl Harness {
    pub fn clear_calls(&self) {
        self.registry.clear_calls();
        self.provisioner.clear_calls();
    }
}

pub fn test_config() -> StackpilotConfig {
    let mut config = StackpilotConfig::default();
    config.credentials = CloudCredentials::new("AKIATEST", "secret");
    config.scaling.min_instances = 1;
    config.scaling.max_instances = 10;
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: StackpilotConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(dir.path()).unwrap();
    let registry = Arc::new(FakeRegistry::default());
    let provisioner = Arc::new(FakeProvisioner::default());
    let keys = KeypairManager::new(store.clone(), registry.clone()).with_key_bits(512);
    let orchestrator = StackOrchestrator::new(store.clone(), keys, provisioner.clone(), &config);
    Harness {
        dir,
        store,
        registry,
        provisioner,
        orchestrator,
    }
}
