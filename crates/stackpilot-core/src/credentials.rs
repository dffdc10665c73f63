//! Cloud credentials for provisioning subprocesses.
//!
//! Only the access key pair is configurable; the region is supplied per
//! stack. Missing credentials are fatal for any provisioning call and are
//! surfaced immediately rather than retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("missing cloud credentials: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl CloudCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: Some(access_key_id.to_string()),
            secret_access_key: Some(secret_access_key.to_string()),
        }
    }

    /// Environment variables to inject into a subprocess targeting `region`.
    pub fn env_for(&self, region: &str) -> Result<Vec<(String, String)>, CredentialError> {
        let access = non_empty(&self.access_key_id)
            .ok_or(CredentialError::Missing("AWS_ACCESS_KEY_ID"))?;
        let secret = non_empty(&self.secret_access_key)
            .ok_or(CredentialError::Missing("AWS_SECRET_ACCESS_KEY"))?;

        Ok(vec![
            ("AWS_ACCESS_KEY_ID".to_string(), access.to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), secret.to_string()),
            ("AWS_REGION".to_string(), region.to_string()),
            ("AWS_DEFAULT_REGION".to_string(), region.to_string()),
        ])
    }

    pub fn is_configured(&self) -> bool {
        non_empty(&self.access_key_id).is_some() && non_empty(&self.secret_access_key).is_some()
    }

    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        Self {
            access_key_id: mask(&self.access_key_id),
            secret_access_key: mask(&self.secret_access_key),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
