//! KeypairManager — keeps local key files and registry entries in lockstep
//! with the declared instance slots of a stack.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use stackpilot_core::{keypair_name, parse_keypair_index};
use stackpilot_state::StateStore;

use crate::error::{KeyError, KeyResult};
use crate::generate::generate_keypair_blocking;
use crate::registry::KeyRegistry;

pub const DEFAULT_KEY_BITS: usize = 2048;

const PEM_EXT: &str = "pem";

/// A keypair created for one slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotKeypair {
    pub index: u32,
    pub key_name: String,
    pub pem_path: PathBuf,
    pub key_id: Option<String>,
    pub fingerprint: Option<String>,
}

/// Outcome of removing one half of a keypair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RemovalStatus {
    Deleted,
    Absent,
    Failed(String),
}

impl RemovalStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, RemovalStatus::Failed(_))
    }

    fn describe(&self) -> String {
        match self {
            RemovalStatus::Deleted => "deleted".to_string(),
            RemovalStatus::Absent => "absent".to_string(),
            RemovalStatus::Failed(e) => e.clone(),
        }
    }
}

/// Per-side result of destroying one slot's keypair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotRemoval {
    pub key_name: String,
    pub remote: RemovalStatus,
    pub local: RemovalStatus,
}

impl SlotRemoval {
    /// Both halves are gone.
    pub fn is_complete(&self) -> bool {
        !self.remote.is_failed() && !self.local.is_failed()
    }

    /// Human-readable failure summary, if either side failed.
    pub fn failure(&self) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        Some(format!(
            "{}: remote {}; local {}",
            self.key_name,
            self.remote.describe(),
            self.local.describe()
        ))
    }
}

/// Result of removing every keypair of a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

/// A private key file present on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalKeypair {
    pub key_name: String,
    pub index: Option<u32>,
    pub pem_path: PathBuf,
    pub size_bytes: u64,
}

/// Creates and destroys per-slot keypairs.
#[derive(Clone)]
pub struct KeypairManager {
    store: StateStore,
    registry: Arc<dyn KeyRegistry>,
    key_bits: usize,
}

impl KeypairManager {
    pub fn new(store: StateStore, registry: Arc<dyn KeyRegistry>) -> Self {
        Self {
            store,
            registry,
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Override the RSA modulus size (small keys keep tests fast).
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Generate, store and register the keypair of slot `index`.
    ///
    /// Any existing registration under the same name is replaced, so a
    /// retry after a partial failure converges.
    pub async fn create_for_slot(
        &self,
        stack_id: &str,
        index: u32,
        prefix: &str,
        region: &str,
    ) -> KeyResult<SlotKeypair> {
        let key_name = keypair_name(prefix, index);
        let key = generate_keypair_blocking(self.key_bits, key_name.clone()).await?;

        let key_dir = self.ensure_key_dir(stack_id)?;
        let pem_path = key_dir.join(format!("{key_name}.{PEM_EXT}"));
        write_private_key(&key_dir, &pem_path, &key.private_pem)?;
        debug!(%stack_id, %key_name, path = ?pem_path, "private key written");

        let registry_err = |source| KeyError::Registry {
            key_name: key_name.clone(),
            source,
        };
        let existing = self
            .registry
            .describe(region, &key_name)
            .await
            .map_err(registry_err)?;
        if existing.is_some() {
            debug!(%stack_id, %key_name, "replacing stale registration");
            self.registry
                .delete(region, &key_name)
                .await
                .map_err(registry_err)?;
        }
        let registered = self
            .registry
            .import(region, &key_name, &key.public_openssh)
            .await
            .map_err(registry_err)?;

        info!(%stack_id, %key_name, "keypair created");
        Ok(SlotKeypair {
            index,
            key_name,
            pem_path,
            key_id: registered.key_id,
            fingerprint: registered.fingerprint.or(Some(key.fingerprint)),
        })
    }

    /// Remove both halves of slot `index`'s keypair.
    ///
    /// Partial removal is reported in the result; the call errors only
    /// when neither side could be removed.
    pub async fn destroy_for_slot(
        &self,
        stack_id: &str,
        index: u32,
        prefix: &str,
        region: &str,
    ) -> KeyResult<SlotRemoval> {
        let removal = self
            .destroy_named(stack_id, &keypair_name(prefix, index), region)
            .await?;
        if removal.remote.is_failed() && removal.local.is_failed() {
            return Err(KeyError::Removal {
                key_name: removal.key_name,
                remote: removal.remote.describe(),
                local: removal.local.describe(),
            });
        }
        Ok(removal)
    }

    /// Destroy every keypair whose private key is on disk, regardless of
    /// what the metadata declares. Errors are collected, never fatal.
    pub async fn cleanup_all(&self, stack_id: &str, region: &str) -> KeyResult<CleanupReport> {
        let mut report = CleanupReport::default();
        for key in self.list(stack_id, None)? {
            let removal = self.destroy_named(stack_id, &key.key_name, region).await?;
            match removal.failure() {
                Some(err) => {
                    warn!(%stack_id, key_name = %key.key_name, error = %err, "keypair cleanup failed");
                    report.errors.push(err);
                }
                None => report.deleted.push(key.key_name),
            }
        }
        info!(
            %stack_id,
            deleted = report.deleted.len(),
            errors = report.errors.len(),
            "keypair cleanup finished"
        );
        Ok(report)
    }

    /// Private key files of a stack, ordered by slot index.
    ///
    /// Indices are recovered only for names under `prefix`; without a
    /// prefix every entry is listed by name.
    pub fn list(&self, stack_id: &str, prefix: Option<&str>) -> KeyResult<Vec<LocalKeypair>> {
        let key_dir = self.store.private_key_dir(stack_id)?;
        let entries = match std::fs::read_dir(&key_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(KeyError::Io(e.to_string())),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| KeyError::Io(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PEM_EXT) {
                continue;
            }
            let Some(key_name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            keys.push(LocalKeypair {
                index: prefix.and_then(|p| parse_keypair_index(p, &key_name)),
                key_name,
                pem_path: path,
                size_bytes,
            });
        }
        // Indexed slots first, then anything else by name.
        keys.sort_by(|a, b| {
            (a.index.is_none(), a.index, &a.key_name).cmp(&(b.index.is_none(), b.index, &b.key_name))
        });
        Ok(keys)
    }

    async fn destroy_named(
        &self,
        stack_id: &str,
        key_name: &str,
        region: &str,
    ) -> KeyResult<SlotRemoval> {
        let remote = match self.registry.delete(region, key_name).await {
            Ok(true) => RemovalStatus::Deleted,
            Ok(false) => RemovalStatus::Absent,
            Err(e) => RemovalStatus::Failed(e.to_string()),
        };

        let pem_path = self
            .store
            .private_key_dir(stack_id)?
            .join(format!("{key_name}.{PEM_EXT}"));
        let local = match std::fs::remove_file(&pem_path) {
            Ok(()) => RemovalStatus::Deleted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RemovalStatus::Absent,
            Err(e) => RemovalStatus::Failed(e.to_string()),
        };

        debug!(%stack_id, %key_name, ?remote, ?local, "keypair removed");
        Ok(SlotRemoval {
            key_name: key_name.to_string(),
            remote,
            local,
        })
    }

    fn ensure_key_dir(&self, stack_id: &str) -> KeyResult<PathBuf> {
        let dir = self.store.private_key_dir(stack_id)?;
        std::fs::create_dir_all(&dir).map_err(|e| KeyError::Io(e.to_string()))?;
        restrict_permissions(&dir, 0o700)?;
        Ok(dir)
    }
}

fn write_private_key(dir: &Path, path: &Path, pem: &str) -> KeyResult<()> {
    let io_err = |e: std::io::Error| KeyError::Io(e.to_string());
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    restrict_permissions(tmp.path(), 0o600)?;
    tmp.write_all(pem.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> KeyResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| KeyError::Io(e.to_string()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> KeyResult<()> {
    Ok(())
}
