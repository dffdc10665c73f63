//! StateStore — file-backed stack metadata persistence.
//!
//! One JSON record per stack namespace directory. `save` is the only write
//! path for declared state and replaces the record atomically. `list`
//! skips namespaces whose record is missing or unreadable.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use stackpilot_core::is_valid_stack_id;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// Name of the metadata record inside a stack namespace.
pub const METADATA_FILE: &str = "deploy_metadata.json";

/// Directory holding per-slot private keys inside a stack namespace.
pub const PRIVATE_KEY_DIR: &str = "private-key";

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe metadata store rooted at the provisioning work directory.
#[derive(Clone, Debug)]
pub struct StateStore {
    root: Arc<PathBuf>,
}

impl StateStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: &Path) -> StateResult<Self> {
        std::fs::create_dir_all(root).map_err(map_err!(Open))?;
        debug!(?root, "state store opened");
        Ok(Self {
            root: Arc::new(root.to_path_buf()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Layout ─────────────────────────────────────────────────────

    /// Namespace directory of a stack.
    pub fn stack_dir(&self, stack_id: &str) -> StateResult<PathBuf> {
        if !is_valid_stack_id(stack_id) {
            return Err(StateError::InvalidId(stack_id.to_string()));
        }
        Ok(self.root.join(stack_id))
    }

    pub fn metadata_path(&self, stack_id: &str) -> StateResult<PathBuf> {
        Ok(self.stack_dir(stack_id)?.join(METADATA_FILE))
    }

    pub fn private_key_dir(&self, stack_id: &str) -> StateResult<PathBuf> {
        Ok(self.stack_dir(stack_id)?.join(PRIVATE_KEY_DIR))
    }

    /// Create the namespace directory for a new stack.
    pub fn create_namespace(&self, stack_id: &str) -> StateResult<PathBuf> {
        let dir = self.stack_dir(stack_id)?;
        std::fs::create_dir_all(&dir).map_err(map_err!(Write))?;
        Ok(dir)
    }

    /// Whether the namespace directory exists (with or without a record).
    pub fn namespace_exists(&self, stack_id: &str) -> bool {
        self.stack_dir(stack_id).map(|d| d.is_dir()).unwrap_or(false)
    }

    // ── Records ────────────────────────────────────────────────────

    /// Load a stack record.
    pub fn load(&self, stack_id: &str) -> StateResult<Stack> {
        let path = self.metadata_path(stack_id)?;
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(stack_id.to_string()));
            }
            Err(e) => return Err(StateError::Read(e.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))
    }

    /// Atomically replace a stack record.
    pub fn save(&self, stack: &Stack) -> StateResult<()> {
        let dir = self.create_namespace(&stack.stack_id)?;
        let value = serde_json::to_vec_pretty(stack).map_err(map_err!(Serialize))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(map_err!(Write))?;
        tmp.write_all(&value).map_err(map_err!(Write))?;
        tmp.as_file().sync_all().map_err(map_err!(Write))?;
        tmp.persist(dir.join(METADATA_FILE))
            .map_err(|e| StateError::Write(e.error.to_string()))?;

        debug!(
            stack_id = %stack.stack_id,
            instance_count = stack.declared_count(),
            "stack record stored"
        );
        Ok(())
    }

    /// List every stack with a readable record, ordered by stack id.
    pub fn list(&self) -> StateResult<Vec<Stack>> {
        let entries = match std::fs::read_dir(self.root.as_path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::Read(e.to_string())),
        };

        let mut results = Vec::new();
        for entry in entries {
            let entry = entry.map_err(map_err!(Read))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(stack_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load(&stack_id) {
                Ok(stack) => results.push(stack),
                Err(StateError::NotFound(_)) | Err(StateError::InvalidId(_)) => {
                    debug!(%stack_id, "namespace without metadata record, skipping");
                }
                Err(e) => {
                    warn!(%stack_id, error = %e, "unreadable stack record, skipping");
                }
            }
        }

        results.sort_by(|a, b| a.stack_id.cmp(&b.stack_id));
        Ok(results)
    }

    /// Remove a stack namespace and everything in it. Returns true if it existed.
    pub fn delete(&self, stack_id: &str) -> StateResult<bool> {
        let dir = self.stack_dir(stack_id)?;
        let existed = match std::fs::remove_dir_all(&dir) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(StateError::Write(e.to_string())),
        };
        debug!(%stack_id, existed, "stack namespace deleted");
        Ok(existed)
    }
}
