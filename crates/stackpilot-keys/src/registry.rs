//! Cloud key registry.
//!
//! [`KeyRegistry`] is the seam between the keypair manager and the cloud
//! key-pair API. [`AwsCliKeyRegistry`] drives `aws ec2 *-key-pair(s)` with
//! the configured credentials injected into the subprocess environment.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use stackpilot_core::CloudCredentials;

use crate::error::RegistryError;

/// A public key registration as reported by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredKey {
    pub key_name: String,
    pub key_id: Option<String>,
    pub fingerprint: Option<String>,
}

/// Cloud key-pair API.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Look up a registration by name. `None` when absent.
    async fn describe(&self, region: &str, key_name: &str)
    -> Result<Option<RegisteredKey>, RegistryError>;

    /// Delete a registration. Returns `false` when it was already absent.
    async fn delete(&self, region: &str, key_name: &str) -> Result<bool, RegistryError>;

    /// Register an OpenSSH public key under `key_name`.
    async fn import(
        &self,
        region: &str,
        key_name: &str,
        public_key_openssh: &str,
    ) -> Result<RegisteredKey, RegistryError>;
}

/// Registry backed by the AWS CLI.
pub struct AwsCliKeyRegistry {
    aws_bin: PathBuf,
    credentials: CloudCredentials,
    timeout: Duration,
}

impl AwsCliKeyRegistry {
    pub fn new(aws_bin: impl Into<PathBuf>, credentials: CloudCredentials, timeout: Duration) -> Self {
        Self {
            aws_bin: aws_bin.into(),
            credentials,
            timeout,
        }
    }

    async fn run(&self, region: &str, args: &[&str]) -> Result<Output, RegistryError> {
        let env = self.credentials.env_for(region)?;

        let mut cmd = Command::new(&self.aws_bin);
        cmd.arg("ec2")
            .args(args)
            .args(["--region", region, "--output", "json"])
            .envs(env)
            .kill_on_drop(true);

        debug!(bin = ?self.aws_bin, ?args, %region, "invoking key registry");
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RegistryError::Command(format!(
                "failed to spawn {}: {e}",
                self.aws_bin.display()
            ))),
            Err(_) => Err(RegistryError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl KeyRegistry for AwsCliKeyRegistry {
    async fn describe(
        &self,
        region: &str,
        key_name: &str,
    ) -> Result<Option<RegisteredKey>, RegistryError> {
        let output = self
            .run(region, &["describe-key-pairs", "--key-names", key_name])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(RegistryError::Command(stderr.trim().to_string()));
        }
        let listing: KeyPairListing = serde_json::from_slice(&output.stdout)
            .map_err(|e| RegistryError::Parse(e.to_string()))?;
        Ok(listing
            .key_pairs
            .into_iter()
            .find(|k| k.key_name == key_name)
            .map(RegisteredKey::from))
    }

    async fn delete(&self, region: &str, key_name: &str) -> Result<bool, RegistryError> {
        let output = self
            .run(region, &["delete-key-pair", "--key-name", key_name])
            .await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_not_found(&stderr) {
            Ok(false)
        } else {
            Err(RegistryError::Command(stderr.trim().to_string()))
        }
    }

    async fn import(
        &self,
        region: &str,
        key_name: &str,
        public_key_openssh: &str,
    ) -> Result<RegisteredKey, RegistryError> {
        // `fileb://` keeps the CLI from re-encoding the key material.
        let material = tempfile::NamedTempFile::new()
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(public_key_openssh.as_bytes())?;
                Ok(f)
            })
            .map_err(|e| RegistryError::Command(format!("failed to stage public key: {e}")))?;
        let material_arg = format!("fileb://{}", material.path().display());

        let output = self
            .run(
                region,
                &[
                    "import-key-pair",
                    "--key-name",
                    key_name,
                    "--public-key-material",
                    &material_arg,
                ],
            )
            .await?;
        if !output.status.success() {
            return Err(RegistryError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let record: KeyPairRecord = serde_json::from_slice(&output.stdout)
            .map_err(|e| RegistryError::Parse(e.to_string()))?;
        Ok(record.into())
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("InvalidKeyPair.NotFound")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairListing {
    #[serde(default)]
    key_pairs: Vec<KeyPairRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairRecord {
    key_name: String,
    key_pair_id: Option<String>,
    key_fingerprint: Option<String>,
}

impl From<KeyPairRecord> for RegisteredKey {
    fn from(r: KeyPairRecord) -> Self {
        Self {
            key_name: r.key_name,
            key_id: r.key_pair_id,
            fingerprint: r.key_fingerprint,
        }
    }
}
