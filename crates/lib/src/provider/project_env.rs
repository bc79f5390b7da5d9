//! Provider for the provisioned environment inside the project directory.
//!
//! The environment lives at `envs/{spec_name}` under the project root. The
//! actual package-manager invocation sits behind the [`EnvTool`] trait so
//! tests can swap in a recording stub.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;

use crate::consts::{ENVS_DIRNAME, PROJECT_ENV_VAR};
use crate::provider::types::{Provider, ProvideContext, ProvideMode};
use crate::requirement::{Requirement, RequirementKind};

#[derive(Debug, Error)]
pub enum EnvToolError {
  #[error("failed to run {tool}: {source}")]
  Spawn {
    tool: String,
    #[source]
    source: io::Error,
  },
  #[error("{tool} exited with code {code}: {stderr}")]
  Failed { tool: String, code: i32, stderr: String },
}

/// Creates and updates project environments on disk.
pub trait EnvTool: Send + Sync {
  fn create(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<(), EnvToolError>;

  fn install(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<(), EnvToolError>;
}

/// Shells out to `conda` on the PATH.
pub struct CondaEnvTool;

impl CondaEnvTool {
  fn run(&self, verb: &str, prefix: &Path, packages: &[String], channels: &[String]) -> Result<(), EnvToolError> {
    let mut command = Command::new("conda");
    command.arg(verb).arg("--yes").arg("--prefix").arg(prefix);
    for channel in channels {
      command.arg("--channel").arg(channel);
    }
    command.args(packages);

    let output = command.output().map_err(|e| EnvToolError::Spawn {
      tool: "conda".to_string(),
      source: e,
    })?;
    if output.status.success() {
      Ok(())
    } else {
      Err(EnvToolError::Failed {
        tool: "conda".to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      })
    }
  }
}

impl EnvTool for CondaEnvTool {
  fn create(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<(), EnvToolError> {
    self.run("create", prefix, packages, channels)
  }

  fn install(&self, prefix: &Path, packages: &[String], channels: &[String]) -> Result<(), EnvToolError> {
    self.run("install", prefix, packages, channels)
  }
}

pub struct ProjectEnvProvider {
  tool: Arc<dyn EnvTool>,
}

impl Default for ProjectEnvProvider {
  fn default() -> Self {
    Self { tool: Arc::new(CondaEnvTool) }
  }
}

impl ProjectEnvProvider {
  pub fn with_tool(tool: Arc<dyn EnvTool>) -> Self {
    Self { tool }
  }
}

impl Provider for ProjectEnvProvider {
  fn config_key(&self) -> &'static str {
    "project_env"
  }

  fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) {
    let (spec_name, packages, channels) = match &requirement.kind {
      RequirementKind::ProjectEnv { spec_name, packages, channels } => (spec_name, packages, channels),
      _ => return,
    };
    let project_dir = match context.project_dir() {
      Some(dir) => dir,
      None => {
        context.append_error(format!("Cannot locate the project directory to provide {}.", requirement.env_var));
        return;
      }
    };
    let prefix = project_dir.join(ENVS_DIRNAME).join(spec_name);

    if context.mode() == ProvideMode::Check {
      if prefix.is_dir() {
        set_env_for_prefix(context, &prefix);
      }
      return;
    }

    if !prefix.is_dir() {
      match self.tool.create(&prefix, packages, channels) {
        Ok(()) => context.append_log(format!("Created environment at {}.", prefix.display())),
        Err(e) => {
          context.append_error(format!("Error creating environment at {}: {}", prefix.display(), e));
          return;
        }
      }
    } else if !packages.is_empty() {
      if let Err(e) = self.tool.install(&prefix, packages, channels) {
        context.append_error(format!("Error installing packages into {}: {}", prefix.display(), e));
        return;
      }
    }

    set_env_for_prefix(context, &prefix);
  }
}

fn set_env_for_prefix(context: &mut ProvideContext<'_>, prefix: &Path) {
  context
    .environ
    .insert(PROJECT_ENV_VAR.to_string(), prefix.display().to_string());
  prepend_to_path(context, &executable_dir(prefix));
}

fn executable_dir(prefix: &Path) -> PathBuf {
  if cfg!(windows) {
    prefix.join("Scripts")
  } else {
    prefix.join("bin")
  }
}

fn prepend_to_path(context: &mut ProvideContext<'_>, dir: &Path) {
  let existing = context.environ.get("PATH").cloned().unwrap_or_default();
  let mut parts = vec![dir.to_path_buf()];
  parts.extend(std::env::split_paths(&existing));
  // A path with an embedded separator cannot be joined; keep PATH as-is then.
  if let Ok(joined) = std::env::join_paths(parts) {
    context
      .environ
      .insert("PATH".to_string(), joined.to_string_lossy().into_owned());
  }
}
