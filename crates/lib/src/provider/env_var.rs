//! Provider for plain environment variable requirements.
//!
//! The value is chosen in priority order: a value stored in local state
//! overrides the ambient environment, which overrides the manifest default.

use serde_yaml::Value;

use crate::environ::EnvMap;
use crate::local_state::LocalStateFile;
use crate::provider::types::{read_config_section, Provider, ProvideContext, ProviderConfig};
use crate::requirement::Requirement;
use crate::yaml_file::yaml_scalar_to_string;

pub struct EnvVarProvider;

impl Provider for EnvVarProvider {
  fn config_key(&self) -> &'static str {
    "env_var"
  }

  fn read_config(
    &self,
    requirement: &Requirement,
    environ: &EnvMap,
    local_state: &LocalStateFile,
  ) -> ProviderConfig {
    read_env_var_config(self.config_key(), requirement, environ, local_state)
  }

  fn set_config_values(
    &self,
    requirement: &Requirement,
    _environ: &mut EnvMap,
    local_state: &mut LocalStateFile,
    values: &ProviderConfig,
  ) {
    set_env_var_config_values(requirement, local_state, values);
  }

  fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) {
    let configured = context.config.get("value").and_then(yaml_scalar_to_string);
    if let Some(value) = configured {
      context.environ.insert(requirement.env_var.clone(), value);
    } else if context.environ.contains_key(&requirement.env_var) {
      // Already set; leave the ambient value alone.
    } else if let Some(default) = requirement.default_value() {
      context.environ.insert(requirement.env_var.clone(), default.to_string());
    } else {
      context.append_error(format!("Nothing to do to provide {}.", requirement.env_var));
    }
  }
}

/// Shared `read_config` for the env-var family of providers.
///
/// Besides the persisted provider section, reports where the value would
/// come from as `source`: `variables` (local state), `environ`, `default`,
/// or `unset`.
pub(crate) fn read_env_var_config(
  config_key: &str,
  requirement: &Requirement,
  environ: &EnvMap,
  local_state: &LocalStateFile,
) -> ProviderConfig {
  let mut config = read_config_section(config_key, requirement, local_state);
  let stored = local_state.get_value(&["variables", requirement.env_var.as_str()]);
  match stored {
    Some(value) if !value.is_null() => {
      config.insert("value".to_string(), value.clone());
      config.insert("source".to_string(), Value::from("variables"));
    }
    _ => {
      if let Some(value) = environ.get(&requirement.env_var) {
        config.insert("value".to_string(), Value::from(value.as_str()));
        config.insert("source".to_string(), Value::from("environ"));
      } else if requirement.default_value().is_some() {
        config.insert("source".to_string(), Value::from("default"));
      } else {
        config.insert("source".to_string(), Value::from("unset"));
      }
    }
  }
  config
}

/// Shared `set_config_values`: a `value` entry is persisted under
/// `variables.{VAR}`; null or empty string clears it instead.
pub(crate) fn set_env_var_config_values(
  requirement: &Requirement,
  local_state: &mut LocalStateFile,
  values: &ProviderConfig,
) {
  if let Some(value) = values.get("value") {
    let path = ["variables", requirement.env_var.as_str()];
    if value.is_null() || value.as_str() == Some("") {
      local_state.unset_value(&path);
    } else {
      local_state.set_value(&path, value.clone());
    }
  }
}
