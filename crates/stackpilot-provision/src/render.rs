//! Template rendering for `main.tf`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use stackpilot_state::StackContext;

use crate::error::{ProvisionError, ProvisionResult};

pub const TEMPLATE_NAME: &str = "main.tf.j2";
pub const RENDERED_FILE: &str = "main.tf";

const BUILTIN_TEMPLATE: &str = include_str!("../templates/main.tf.j2");

/// Renders the provisioning configuration of a stack.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    template_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    /// `template_dir` may override the built-in `main.tf.j2`.
    pub fn new(template_dir: Option<PathBuf>) -> Self {
        Self { template_dir }
    }

    fn source(&self) -> ProvisionResult<Cow<'static, str>> {
        if let Some(dir) = &self.template_dir {
            let path = dir.join(TEMPLATE_NAME);
            if path.is_file() {
                debug!(?path, "using template from template dir");
                return std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|e| ProvisionError::Template(format!("{}: {e}", path.display())));
            }
        }
        Ok(Cow::Borrowed(BUILTIN_TEMPLATE))
    }

    /// Render the template for `context`. Undefined variables are errors.
    pub fn render_to_string(&self, context: &StackContext) -> ProvisionResult<String> {
        let source = self.source()?;
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        let tmpl = env
            .template_from_str(&source)
            .map_err(|e| ProvisionError::Template(e.to_string()))?;
        tmpl.render(context)
            .map_err(|e| ProvisionError::Template(e.to_string()))
    }

    /// Render into `{workdir}/main.tf` and return its path.
    pub fn render(&self, context: &StackContext, workdir: &Path) -> ProvisionResult<PathBuf> {
        let rendered = self.render_to_string(context)?;
        std::fs::create_dir_all(workdir).map_err(|e| ProvisionError::Io(e.to_string()))?;
        let path = workdir.join(RENDERED_FILE);
        std::fs::write(&path, rendered).map_err(|e| ProvisionError::Io(e.to_string()))?;
        debug!(?path, instance_count = context.instance_count, "configuration rendered");
        Ok(path)
    }
}
