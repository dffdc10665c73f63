//! stackpilot.toml configuration parser.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! usable configuration. Environment variables are applied on top of the
//! file by [`StackpilotConfig::apply_env`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::credentials::CloudCredentials;
use crate::slots::InstanceBounds;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackpilotConfig {
    pub server: ServerConfig,
    pub provisioning: ProvisioningConfig,
    pub defaults: DefaultsConfig,
    pub scaling: ScalingConfig,
    pub autoscale: AutoscaleConfig,
    pub advisor: AdvisorConfig,
    pub metrics: MetricsConfig,
    pub credentials: CloudCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8008,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Terraform binary.
    pub tf_bin: String,
    /// Root directory holding one namespace directory per stack.
    pub work_root: PathBuf,
    /// Directory containing `main.tf.j2`. The built-in template is used when unset.
    pub template_dir: Option<PathBuf>,
    /// Timeout for each terraform invocation.
    pub timeout_secs: u64,
    /// AWS CLI binary used for key pair registration.
    pub aws_bin: String,
    /// Timeout for each key registry call.
    pub registry_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            tf_bin: "terraform".to_string(),
            work_root: PathBuf::from(".infra/work"),
            template_dir: None,
            timeout_secs: 900,
            aws_bin: "aws".to_string(),
            registry_timeout_secs: 60,
        }
    }
}

impl ProvisioningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }
}

/// Values used when a deploy request leaves a field unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub region: String,
    pub az: String,
    pub instance_type: String,
    pub ami: String,
    pub vpc_cidr: String,
    pub subnet_cidr: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            region: "ap-southeast-2".to_string(),
            az: "ap-southeast-2a".to_string(),
            instance_type: "t3.micro".to_string(),
            ami: "ami-0a25a306450a2cba3".to_string(),
            vpc_cidr: "10.25.0.0/16".to_string(),
            subnet_cidr: "10.25.1.0/24".to_string(),
        }
    }
}

/// Global instance count bounds applied to every stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_instances: u32,
    pub max_instances: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_instances: 1,
            max_instances: 10,
        }
    }
}

impl ScalingConfig {
    pub fn bounds(&self) -> InstanceBounds {
        InstanceBounds::new(self.min_instances, self.max_instances)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Minimum recommendation confidence required to act.
    pub confidence_threshold: f64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            confidence_threshold: 0.75,
        }
    }
}

impl AutoscaleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Reasoning service (Gemini) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-pro".to_string(),
            api_key: None,
            timeout_secs: 30,
            temperature: 0.2,
            max_output_tokens: 256,
        }
    }
}

impl AdvisorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StackpilotConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: StackpilotConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognized variables: `STACKPILOT_HOST`, `STACKPILOT_PORT`,
    /// `STACKPILOT_TF_BIN`, `STACKPILOT_WORK_ROOT`, `STACKPILOT_TEMPLATE_DIR`,
    /// `STACKPILOT_TF_TIMEOUT_SECS`, `STACKPILOT_DEFAULT_REGION`,
    /// `STACKPILOT_MIN_INSTANCES`, `STACKPILOT_MAX_INSTANCES`,
    /// `STACKPILOT_AUTOSCALE_ENABLED`, `STACKPILOT_AUTOSCALE_INTERVAL_SECS`,
    /// `STACKPILOT_AUTOSCALE_CONFIDENCE_THRESHOLD`, `AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY`, `GEMINI_API_KEY`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STACKPILOT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("STACKPILOT_PORT") {
            self.server.port = parse_var("STACKPILOT_PORT", &v)?;
        }
        if let Some(v) = lookup("STACKPILOT_TF_BIN") {
            self.provisioning.tf_bin = v;
        }
        if let Some(v) = lookup("STACKPILOT_WORK_ROOT") {
            self.provisioning.work_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("STACKPILOT_TEMPLATE_DIR") {
            self.provisioning.template_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STACKPILOT_TF_TIMEOUT_SECS") {
            self.provisioning.timeout_secs = parse_var("STACKPILOT_TF_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("STACKPILOT_DEFAULT_REGION") {
            self.defaults.region = v;
        }
        if let Some(v) = lookup("STACKPILOT_MIN_INSTANCES") {
            self.scaling.min_instances = parse_var("STACKPILOT_MIN_INSTANCES", &v)?;
        }
        if let Some(v) = lookup("STACKPILOT_MAX_INSTANCES") {
            self.scaling.max_instances = parse_var("STACKPILOT_MAX_INSTANCES", &v)?;
        }
        if let Some(v) = lookup("STACKPILOT_AUTOSCALE_ENABLED") {
            self.autoscale.enabled = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("STACKPILOT_AUTOSCALE_INTERVAL_SECS") {
            self.autoscale.interval_secs = parse_var("STACKPILOT_AUTOSCALE_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("STACKPILOT_AUTOSCALE_CONFIDENCE_THRESHOLD") {
            self.autoscale.confidence_threshold =
                parse_var("STACKPILOT_AUTOSCALE_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("AWS_ACCESS_KEY_ID") {
            self.credentials.access_key_id = Some(v);
        }
        if let Some(v) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.credentials.secret_access_key = Some(v);
        }
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.advisor.api_key = Some(v);
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let scaling = &self.scaling;
        if scaling.min_instances == 0 {
            bail!("scaling.min_instances must be at least 1");
        }
        if scaling.min_instances > scaling.max_instances {
            bail!(
                "scaling.min_instances ({}) exceeds scaling.max_instances ({})",
                scaling.min_instances,
                scaling.max_instances
            );
        }
        if !(0.0..=1.0).contains(&self.autoscale.confidence_threshold) {
            bail!("autoscale.confidence_threshold must be within [0, 1]");
        }
        if self.autoscale.interval_secs == 0 {
            bail!("autoscale.interval_secs must be positive");
        }
        if self.provisioning.timeout_secs == 0 {
            bail!("provisioning.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Copy of this configuration with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.credentials = copy.credentials.redacted();
        if copy.advisor.api_key.is_some() {
            copy.advisor.api_key = Some("***".to_string());
        }
        copy
    }
}

fn parse_var<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid {name}: {e}"))
}
