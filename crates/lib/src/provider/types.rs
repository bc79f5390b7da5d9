//! The provider protocol: how a requirement gets satisfied.
//!
//! A [`Provider`] is a stateless capability bound to one requirement kind.
//! All mutable state for a run lives in the [`ProvideContext`], which wraps
//! the engine's single working environment copy and local-state handle.
//!
//! Providers never return errors from [`Provider::provide`]: failures are
//! appended to the context's error list so the engine can keep executing the
//! remaining plan entries and report everything at the end.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_yaml::Value;

use crate::consts::PROJECT_DIR_VAR;
use crate::environ::EnvMap;
use crate::local_state::LocalStateFile;
use crate::requirement::Requirement;

/// Whether a provider run is allowed to perform real-world side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvideMode {
  /// Inspect and report only; nothing the provider does may outlive the call.
  Check,
  /// Actually do the work.
  Provide,
}

/// Per-provider configuration loaded from local state, keyed by setting name.
pub type ProviderConfig = BTreeMap<String, Value>;

/// A side-effect-free snapshot of a requirement's current satisfiability.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
  pub config: ProviderConfig,
  /// Env vars that must be set before the provider can even be configured.
  pub missing_env_vars_to_configure: Vec<String>,
  /// Env vars that must be set before the provider can provide.
  pub missing_env_vars_to_provide: Vec<String>,
  /// For downloads: the destination file, when it already exists.
  pub existing_filename: Option<PathBuf>,
}

/// Mutable working state handed to a provider for one plan entry.
#[derive(Debug)]
pub struct ProvideContext<'a> {
  /// The engine's private working copy of the environment.
  pub environ: &'a mut EnvMap,
  /// Local state, shared across the whole prepare call.
  pub local_state: &'a mut LocalStateFile,
  /// Config returned by this provider's `read_config`.
  pub config: ProviderConfig,
  mode: ProvideMode,
  logs: Vec<String>,
  errors: Vec<String>,
}

impl<'a> ProvideContext<'a> {
  pub fn new(
    environ: &'a mut EnvMap,
    local_state: &'a mut LocalStateFile,
    config: ProviderConfig,
    mode: ProvideMode,
  ) -> Self {
    Self {
      environ,
      local_state,
      config,
      mode,
      logs: Vec::new(),
      errors: Vec::new(),
    }
  }

  pub fn mode(&self) -> ProvideMode {
    self.mode
  }

  /// Record an informational message for the user.
  pub fn append_log(&mut self, message: impl Into<String>) {
    self.logs.push(message.into());
  }

  /// Record a failure. The entry counts as failed once any error is present.
  pub fn append_error(&mut self, message: impl Into<String>) {
    self.errors.push(message.into());
  }

  pub fn logs(&self) -> &[String] {
    &self.logs
  }

  pub fn errors(&self) -> &[String] {
    &self.errors
  }

  /// The project directory, from the `PROJECT_DIR` value the engine seeds
  /// into the working environment.
  pub fn project_dir(&self) -> Option<PathBuf> {
    self.environ.get(PROJECT_DIR_VAR).map(PathBuf::from)
  }

  pub(crate) fn into_logs_and_errors(self) -> (Vec<String>, Vec<String>) {
    (self.logs, self.errors)
  }
}

/// Local-state path holding a provider's persisted config for one
/// requirement: `runtime.{VAR}.providers.{config_key}`.
pub fn provider_config_path<'a>(env_var: &'a str, config_key: &'a str) -> [&'a str; 4] {
  ["runtime", env_var, "providers", config_key]
}

/// A capability that can inspect and satisfy one requirement kind.
pub trait Provider: Send + Sync {
  /// Key naming this provider in local-state config paths.
  fn config_key(&self) -> &'static str;

  /// Load persisted choices from local state. Side-effect-free.
  fn read_config(
    &self,
    requirement: &Requirement,
    environ: &EnvMap,
    local_state: &LocalStateFile,
  ) -> ProviderConfig {
    let _ = environ;
    read_config_section(self.config_key(), requirement, local_state)
  }

  /// Write user-chosen config values back into local state.
  fn set_config_values(
    &self,
    requirement: &Requirement,
    environ: &mut EnvMap,
    local_state: &mut LocalStateFile,
    values: &ProviderConfig,
  ) {
    let _ = environ;
    let section = provider_config_path(&requirement.env_var, self.config_key());
    for (key, value) in values {
      let mut path: Vec<&str> = section.to_vec();
      path.push(key);
      local_state.set_value(&path, value.clone());
    }
  }

  /// Inspect current status without side effects.
  fn analyze(&self, requirement: &Requirement, environ: &EnvMap, local_state: &LocalStateFile) -> Analysis {
    Analysis {
      config: self.read_config(requirement, environ, local_state),
      ..Analysis::default()
    }
  }

  /// Attempt to satisfy the requirement.
  ///
  /// On success, sets `context.environ[requirement.env_var]`. On failure,
  /// appends to `context.errors` and leaves the variable alone. In check
  /// mode, must not touch anything outside the context.
  fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>);
}

/// Read the `runtime.{VAR}.providers.{key}` mapping into a flat config.
pub(crate) fn read_config_section(
  config_key: &str,
  requirement: &Requirement,
  local_state: &LocalStateFile,
) -> ProviderConfig {
  let path = provider_config_path(&requirement.env_var, config_key);
  let mut config = ProviderConfig::new();
  if let Some(section) = local_state.get_value(&path).and_then(Value::as_mapping) {
    for (key, value) in section {
      if let Some(key) = key.as_str() {
        config.insert(key.to_string(), value.clone());
      }
    }
  }
  config
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::requirement::RequirementKind;
  use tempfile::TempDir;

  struct NullProvider;

  impl Provider for NullProvider {
    fn config_key(&self) -> &'static str {
      "null"
    }

    fn provide(&self, _requirement: &Requirement, _context: &mut ProvideContext<'_>) {}
  }

  #[test]
  fn config_path_shape() {
    assert_eq!(provider_config_path("REDIS_URL", "redis"), [
      "runtime",
      "REDIS_URL",
      "providers",
      "redis"
    ]);
  }

  #[test]
  fn context_accumulates_logs_and_errors() {
    let temp = TempDir::new().unwrap();
    let mut environ = EnvMap::new();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();

    let mut context = ProvideContext::new(&mut environ, &mut local_state, ProviderConfig::new(), ProvideMode::Provide);
    context.append_log("first");
    context.append_error("boom");
    context.append_log("second");

    assert_eq!(context.logs(), &["first".to_string(), "second".to_string()]);
    assert_eq!(context.errors(), &["boom".to_string()]);

    let (logs, errors) = context.into_logs_and_errors();
    assert_eq!(logs.len(), 2);
    assert_eq!(errors.len(), 1);
  }

  #[test]
  fn project_dir_comes_from_the_working_environ() {
    let temp = TempDir::new().unwrap();
    let mut environ = EnvMap::new();
    environ.insert(PROJECT_DIR_VAR.to_string(), "/work/mushrooms".to_string());
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();

    let context = ProvideContext::new(&mut environ, &mut local_state, ProviderConfig::new(), ProvideMode::Check);
    assert_eq!(context.project_dir(), Some(PathBuf::from("/work/mushrooms")));
    assert_eq!(context.mode(), ProvideMode::Check);
  }

  #[test]
  fn default_config_roundtrips_through_local_state() {
    let temp = TempDir::new().unwrap();
    let environ = EnvMap::new();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let requirement = Requirement::new("FOO", RequirementKind::EnvVar { default: None });

    let provider = NullProvider;
    let mut values = ProviderConfig::new();
    values.insert("source".to_string(), Value::from("environ"));

    let mut environ_mut = environ.clone();
    provider.set_config_values(&requirement, &mut environ_mut, &mut local_state, &values);

    let config = provider.read_config(&requirement, &environ, &local_state);
    assert_eq!(config.get("source"), Some(&Value::from("environ")));
  }
}
