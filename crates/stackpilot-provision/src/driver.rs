//! Provisioning driver: the [`Provisioner`] seam and its Terraform
//! implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use stackpilot_core::config::ProvisioningConfig;
use stackpilot_state::{StackContext, StackOutputs};

use crate::error::ProvisionResult;
use crate::outputs::parse_outputs;
use crate::render::TemplateRenderer;
use crate::runner::CommandRunner;

/// Classified outcome of a provisioning run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionPhase {
    InitFailed,
    ApplyFailed,
    Applied(StackOutputs),
}

impl ProvisionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionPhase::InitFailed => "FAILED_INIT",
            ProvisionPhase::ApplyFailed => "FAILED_APPLY",
            ProvisionPhase::Applied(_) => "APPLIED",
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ProvisionPhase::Applied(_))
    }
}

/// Phase plus logs keyed by phase name (`init`, `apply`, `output`).
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    pub phase: ProvisionPhase,
    pub logs: BTreeMap<String, String>,
}

/// Outcome of tearing down a stack's infrastructure.
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyReport {
    pub success: bool,
    pub logs: BTreeMap<String, String>,
}

/// The external infrastructure tool, seen as a black box.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Materialize the configuration for `context` into `workdir`.
    fn render(&self, context: &StackContext, workdir: &Path) -> ProvisionResult<PathBuf>;

    /// First provisioning of a workdir: init, apply, read outputs.
    async fn init_apply(&self, workdir: &Path, env: &[(String, String)]) -> ProvisionReport;

    /// Re-apply an initialized workdir and read outputs.
    async fn apply(&self, workdir: &Path, env: &[(String, String)]) -> ProvisionReport;

    /// Current outputs; empty when unavailable.
    async fn outputs(&self, workdir: &Path, env: &[(String, String)]) -> StackOutputs;

    async fn destroy(&self, workdir: &Path, env: &[(String, String)]) -> DestroyReport;
}

/// [`Provisioner`] backed by the `terraform` CLI.
#[derive(Debug, Clone)]
pub struct TerraformDriver {
    renderer: TemplateRenderer,
    runner: CommandRunner,
}

impl TerraformDriver {
    pub fn new(tf_bin: impl Into<PathBuf>, template_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            renderer: TemplateRenderer::new(template_dir),
            runner: CommandRunner::new(tf_bin, timeout),
        }
    }

    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self::new(&config.tf_bin, config.template_dir.clone(), config.timeout())
    }

    async fn apply_and_read(
        &self,
        workdir: &Path,
        env: &[(String, String)],
        logs: &mut BTreeMap<String, String>,
    ) -> ProvisionPhase {
        let apply = self
            .runner
            .run(&["apply", "-auto-approve", "-input=false"], workdir, env)
            .await;
        logs.insert("apply".to_string(), apply.log());
        if !apply.success {
            warn!(?workdir, exit_code = ?apply.exit_code, timed_out = apply.timed_out, "apply failed");
            return ProvisionPhase::ApplyFailed;
        }

        let output = self.runner.run(&["output", "-json"], workdir, env).await;
        logs.insert("output".to_string(), output.log());
        let outputs = if output.success {
            parse_outputs(&output.stdout)
        } else {
            StackOutputs::default()
        };
        ProvisionPhase::Applied(outputs)
    }
}

#[async_trait]
impl Provisioner for TerraformDriver {
    fn render(&self, context: &StackContext, workdir: &Path) -> ProvisionResult<PathBuf> {
        self.renderer.render(context, workdir)
    }

    async fn init_apply(&self, workdir: &Path, env: &[(String, String)]) -> ProvisionReport {
        let mut logs = BTreeMap::new();

        let init = self
            .runner
            .run(&["init", "-input=false", "-upgrade"], workdir, env)
            .await;
        logs.insert("init".to_string(), init.log());
        if !init.success {
            warn!(?workdir, exit_code = ?init.exit_code, timed_out = init.timed_out, "init failed");
            return ProvisionReport {
                phase: ProvisionPhase::InitFailed,
                logs,
            };
        }

        let phase = self.apply_and_read(workdir, env, &mut logs).await;
        info!(?workdir, phase = phase.as_str(), "provisioning finished");
        ProvisionReport { phase, logs }
    }

    async fn apply(&self, workdir: &Path, env: &[(String, String)]) -> ProvisionReport {
        let mut logs = BTreeMap::new();
        let phase = self.apply_and_read(workdir, env, &mut logs).await;
        info!(?workdir, phase = phase.as_str(), "re-apply finished");
        ProvisionReport { phase, logs }
    }

    async fn outputs(&self, workdir: &Path, env: &[(String, String)]) -> StackOutputs {
        let output = self.runner.run(&["output", "-json"], workdir, env).await;
        if output.success {
            parse_outputs(&output.stdout)
        } else {
            StackOutputs::default()
        }
    }

    async fn destroy(&self, workdir: &Path, env: &[(String, String)]) -> DestroyReport {
        let run = self
            .runner
            .run(&["destroy", "-auto-approve", "-input=false"], workdir, env)
            .await;
        let mut logs = BTreeMap::new();
        logs.insert("destroy".to_string(), run.log());
        info!(?workdir, success = run.success, "destroy finished");
        DestroyReport {
            success: run.success,
            logs,
        }
    }
}
