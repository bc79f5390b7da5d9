//! Per-machine project state.
//!
//! `rigup-local.yml` lives next to `rigup.yml` but is not meant to be checked
//! in: it records choices and runtime facts specific to one machine, such as
//! locally overridden variable values and how to shut down services started
//! during preparation:
//!
//! ```yaml
//! variables:
//!   DB_PASSWORD: hunter2
//! service_run_states:
//!   REDIS_URL:
//!     port: 6379
//!     shutdown_commands:
//!       - [redis-cli, -p, "6379", shutdown, nosave]
//! ```

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::consts::LOCAL_STATE_FILENAME;
use crate::yaml_file::{YamlFile, YamlFileError};

/// Top-level key holding one run-state mapping per started service.
pub const SERVICE_RUN_STATES_KEY: &str = "service_run_states";

/// The `rigup-local.yml` file for a project directory.
#[derive(Debug, Clone)]
pub struct LocalStateFile {
  file: YamlFile,
}

impl LocalStateFile {
  /// Load the local state file for a project directory.
  ///
  /// A missing file is fine and loads as empty state.
  pub fn load_for_directory(project_dir: &Path) -> Result<Self, YamlFileError> {
    let file = YamlFile::load(project_dir.join(LOCAL_STATE_FILENAME))?;
    Ok(Self { file })
  }

  pub fn path(&self) -> &Path {
    self.file.path()
  }

  pub fn get_value(&self, path: &[&str]) -> Option<&Value> {
    self.file.get_value(path)
  }

  pub fn set_value(&mut self, path: &[&str], value: Value) {
    self.file.set_value(path, value);
  }

  pub fn unset_value(&mut self, path: &[&str]) {
    self.file.unset_value(path);
  }

  pub fn has_unsaved_changes(&self) -> bool {
    self.file.has_unsaved_changes()
  }

  pub fn save(&mut self) -> Result<(), YamlFileError> {
    self.file.save()
  }

  /// Run state recorded for one service requirement, keyed by env var name.
  pub fn service_run_state(&self, name: &str) -> Option<&Mapping> {
    self
      .file
      .get_value(&[SERVICE_RUN_STATES_KEY, name])
      .and_then(Value::as_mapping)
  }

  /// Record (or clear, with an empty mapping) the run state for a service.
  pub fn set_service_run_state(&mut self, name: &str, state: Mapping) {
    self.file.set_value(&[SERVICE_RUN_STATES_KEY, name], Value::Mapping(state));
  }

  /// All recorded service run states, in file order.
  pub fn service_run_states(&self) -> Vec<(String, Mapping)> {
    let mut states = Vec::new();
    if let Some(section) = self.file.get_value(&[SERVICE_RUN_STATES_KEY]).and_then(Value::as_mapping) {
      for (key, value) in section {
        if let (Some(name), Some(state)) = (key.as_str(), value.as_mapping()) {
          states.push((name.to_string(), state.clone()));
        }
      }
    }
    states
  }
}
