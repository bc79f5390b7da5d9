//! The prepare engine: run the plan, validate, and commit the environment.
//!
//! `prepare` works on a private copy of the caller's environment. Providers
//! only ever mutate that copy; the caller's map is updated in one merge step
//! at the end, and only when every requirement validated. Local state is
//! loaded fresh at the start of each call and saved just before that merge,
//! so service run states recorded by providers survive even a failed run
//! and a save failure never follows a committed environment.
//!
//! `unprepare` is the reverse door: it replays the shutdown commands
//! recorded in local state and clears each service's run state.

use std::io;
use std::process::Command;
use std::str::FromStr;
use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::PROJECT_DIR_VAR;
use crate::environ::EnvMap;
use crate::local_state::LocalStateFile;
use crate::manifest::Project;
use crate::plan::{build_plan, PlanEntry};
use crate::provider::{ProvideContext, ProvideMode, ProviderRegistry};
use crate::yaml_file::{yaml_scalar_to_string, YamlFileError};

/// How much interaction the caller wants during prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
  /// Never prompt; take what is configured or fail.
  #[default]
  NonInteractive,
  /// Prompt on the terminal for missing choices.
  Text,
  /// Reserved; always reported as unsupported.
  Browser,
}

impl UiMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      UiMode::NonInteractive => "non-interactive",
      UiMode::Text => "text",
      UiMode::Browser => "browser",
    }
  }
}

impl std::fmt::Display for UiMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for UiMode {
  type Err = PrepareError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "non-interactive" | "not_interactive" => Ok(UiMode::NonInteractive),
      "text" => Ok(UiMode::Text),
      "browser" => Ok(UiMode::Browser),
      other => Err(PrepareError::InvalidUiMode(other.to_string())),
    }
  }
}

#[derive(Debug, Error)]
pub enum PrepareError {
  #[error("invalid UI mode '{0}', expected one of: non-interactive, text, browser")]
  InvalidUiMode(String),
  #[error("UI mode '{0}' is not supported")]
  UnsupportedUiMode(UiMode),
  #[error("unable to load the project: {}", problems.join("; "))]
  ProjectProblems { problems: Vec<String> },
  #[error("error during interactive configuration: {0}")]
  Configure(#[source] io::Error),
  #[error(transparent)]
  LocalState(#[from] YamlFileError),
}

/// Collects user choices for plan entries before execution. The text UI
/// implements this; non-interactive runs use [`NullConfigurer`].
pub trait Configurer {
  fn configure(
    &mut self,
    plan: &[PlanEntry],
    environ: &mut EnvMap,
    local_state: &mut LocalStateFile,
  ) -> io::Result<()>;
}

/// A configurer that asks nothing and changes nothing.
pub struct NullConfigurer;

impl Configurer for NullConfigurer {
  fn configure(
    &mut self,
    _plan: &[PlanEntry],
    _environ: &mut EnvMap,
    _local_state: &mut LocalStateFile,
  ) -> io::Result<()> {
    Ok(())
  }
}

pub struct PrepareOptions {
  pub mode: UiMode,
  /// Overrides the shipped registry. For tests.
  pub registry: Option<Arc<ProviderRegistry>>,
  /// Consulted in text mode only.
  pub configurer: Option<Box<dyn Configurer>>,
  /// When set, only plan entries for these env vars run. Validation still
  /// covers every requirement; the ops layer uses this to judge one
  /// requirement without provisioning the rest of the project.
  pub provide_whitelist: Option<Vec<String>>,
}

impl Default for PrepareOptions {
  fn default() -> Self {
    Self {
      mode: UiMode::NonInteractive,
      registry: None,
      configurer: None,
      provide_whitelist: None,
    }
  }
}

/// A requirement that failed validation after the plan ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetRequirement {
  pub env_var: String,
  pub title: String,
  pub reason: String,
}

#[derive(Debug, Default)]
pub struct PrepareResult {
  /// True when every requirement validated and the environment was merged.
  pub success: bool,
  pub unmet: Vec<UnmetRequirement>,
  /// Logs from plan entries that also reported errors.
  pub logs: Vec<String>,
  pub errors: Vec<String>,
}

/// Run the full prepare pipeline against `environ`.
///
/// On success, new and changed keys from the working copy are merged into
/// `environ`. On failure, `environ` is left exactly as it was and the
/// result lists what is still missing.
pub fn prepare(
  project: &Project,
  environ: &mut EnvMap,
  options: PrepareOptions,
) -> Result<PrepareResult, PrepareError> {
  let mut options = options;
  if options.mode == UiMode::Browser {
    return Err(PrepareError::UnsupportedUiMode(options.mode));
  }
  if !project.problems.is_empty() {
    return Err(PrepareError::ProjectProblems { problems: project.problems.clone() });
  }

  let registry = match options.registry.take() {
    Some(registry) => registry,
    None => Arc::new(ProviderRegistry::default()),
  };
  let mut local_state = LocalStateFile::load_for_directory(project.directory())?;

  let mut working = environ.clone();
  working.insert(PROJECT_DIR_VAR.to_string(), project.directory().display().to_string());

  let plan = build_plan(&registry, &project.requirements);
  debug!(entries = plan.len(), "built prepare plan");

  if options.mode == UiMode::Text {
    if let Some(mut configurer) = options.configurer.take() {
      configurer
        .configure(&plan, &mut working, &mut local_state)
        .map_err(PrepareError::Configure)?;
    }
  }

  let mut result = PrepareResult::default();
  for entry in &plan {
    if let Some(whitelist) = &options.provide_whitelist {
      if !whitelist.contains(&entry.requirement.env_var) {
        continue;
      }
    }
    if entry.requirement.why_not_provided(&working).is_none() {
      debug!(var = %entry.requirement.env_var, "requirement already satisfied");
      continue;
    }
    let config = entry
      .provider
      .read_config(&entry.requirement, &working, &local_state);
    let mut context = ProvideContext::new(&mut working, &mut local_state, config, ProvideMode::Provide);
    entry.provider.provide(&entry.requirement, &mut context);
    let (logs, errors) = context.into_logs_and_errors();
    if errors.is_empty() {
      for log in logs {
        debug!(provider = entry.provider.config_key(), "{}", log);
      }
    } else {
      // Logs give the errors their context, so both are surfaced.
      result.logs.extend(logs);
      for error in &errors {
        warn!(provider = entry.provider.config_key(), "{}", error);
      }
      result.errors.extend(errors);
    }
  }

  for requirement in &project.requirements {
    if let Some(reason) = requirement.why_not_provided(&working) {
      info!(var = %requirement.env_var, "unmet: {}", reason);
      result.unmet.push(UnmetRequirement {
        env_var: requirement.env_var.clone(),
        title: requirement.title(),
        reason,
      });
    }
  }

  // Save before the merge: a save failure must surface while the caller's
  // environment is still untouched.
  local_state.save()?;

  if result.unmet.is_empty() {
    for (key, value) in &working {
      if environ.get(key) != Some(value) {
        environ.insert(key.clone(), value.clone());
      }
    }
    result.success = true;
  }

  Ok(result)
}

#[derive(Debug, Default)]
pub struct UnprepareResult {
  pub logs: Vec<String>,
}

/// Shut down every service recorded in local state.
///
/// Each service's shutdown commands run and its run state is cleared and
/// saved before moving on, so a failure partway leaves the finished
/// services forgotten rather than half-remembered.
pub fn unprepare(project: &Project) -> Result<UnprepareResult, PrepareError> {
  let mut local_state = LocalStateFile::load_for_directory(project.directory())?;
  let mut result = UnprepareResult::default();
  for (name, state) in local_state.service_run_states() {
    result.logs.extend(run_shutdown_commands(&state));
    local_state.set_service_run_state(&name, Mapping::new());
    local_state.save()?;
    info!(service = %name, "cleared service run state");
  }
  Ok(result)
}

/// Run the argv lists under `shutdown_commands`, logging each invocation
/// and its exit code. Failures are logged, never propagated.
pub(crate) fn run_shutdown_commands(state: &Mapping) -> Vec<String> {
  let mut logs = Vec::new();
  for argv in shutdown_commands(state) {
    logs.push(format!("Running {:?}", argv));
    let (program, args) = match argv.split_first() {
      Some(pair) => pair,
      None => continue,
    };
    match Command::new(program).args(args).status() {
      Ok(status) => logs.push(format!("  exited with {}", status.code().unwrap_or(-1))),
      Err(e) => logs.push(format!("  failed to run: {}", e)),
    }
  }
  logs
}

fn shutdown_commands(state: &Mapping) -> Vec<Vec<String>> {
  let mut commands = Vec::new();
  if let Some(Value::Sequence(entries)) = state.get("shutdown_commands") {
    for entry in entries {
      if let Value::Sequence(parts) = entry {
        let argv: Vec<String> = parts.iter().filter_map(yaml_scalar_to_string).collect();
        if !argv.is_empty() {
          commands.push(argv);
        }
      }
    }
  }
  commands
}
