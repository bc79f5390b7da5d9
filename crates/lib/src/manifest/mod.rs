//! The project manifest: `rigup.yml` and the requirements built from it.
//!
//! A [`Project`] pairs a directory with its parsed manifest. Loading computes
//! the ordered requirement list, the env specs, and the named commands, and
//! collects malformed declarations as problem strings rather than failing on
//! the first one. A project with problems refuses to prepare.
//!
//! # Example Manifest
//!
//! ```yaml
//! name: mushrooms
//! variables:
//!   DB_USERNAME:
//!     default: guest
//! downloads:
//!   MYDATA: http://example.com/data.csv
//! services:
//!   REDIS_URL: redis
//! packages:
//!   - python=3.9
//! commands:
//!   default:
//!     unix: python analyze.py
//! ```

mod types;

pub use types::{EnvSpec, KNOWN_SERVICE_TYPES, ProjectCommand};

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

use crate::consts::{PROJECT_ENV_VAR, PROJECT_FILENAME};
use crate::requirement::{Checksum, ChecksumAlgorithm, Requirement, RequirementKind};
use crate::yaml_file::{YamlFile, YamlFileError, yaml_scalar_to_string};

/// Errors that can occur when loading a project.
#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("project directory does not exist: {}", path.display())]
  NoSuchDirectory { path: PathBuf },

  #[error("project file not found: {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to resolve project directory {}: {source}", path.display())]
  Resolve { path: PathBuf, source: io::Error },

  #[error(transparent)]
  File(#[from] YamlFileError),
}

/// A project directory plus its parsed `rigup.yml`.
#[derive(Debug, Clone)]
pub struct Project {
  directory: PathBuf,
  file: YamlFile,
  pub name: String,
  pub description: Option<String>,
  /// Requirements in execution order: the project env first, then variables,
  /// downloads, and services in declaration order.
  pub requirements: Vec<Requirement>,
  pub commands: Vec<ProjectCommand>,
  pub env_specs: Vec<EnvSpec>,
  pub default_env_spec_name: String,
  /// Complaints about the manifest contents, empty for a well-formed file.
  pub problems: Vec<String>,
}

impl Project {
  /// Load the project at a directory.
  ///
  /// The directory and its `rigup.yml` must both exist; malformed manifest
  /// *contents* load fine and surface through [`Project::problems`].
  pub fn load(directory: impl Into<PathBuf>) -> Result<Self, ProjectError> {
    let directory = directory.into();
    if !directory.is_dir() {
      return Err(ProjectError::NoSuchDirectory { path: directory });
    }
    let directory = std::path::absolute(&directory).map_err(|source| ProjectError::Resolve {
      path: directory.clone(),
      source,
    })?;

    let manifest_path = directory.join(PROJECT_FILENAME);
    if !manifest_path.is_file() {
      return Err(ProjectError::NotFound { path: manifest_path });
    }

    let file = YamlFile::load(manifest_path)?;
    let mut project = Self {
      directory,
      file,
      name: String::new(),
      description: None,
      requirements: Vec::new(),
      commands: Vec::new(),
      env_specs: Vec::new(),
      default_env_spec_name: "default".to_string(),
      problems: Vec::new(),
    };
    project.recompute();
    debug!(
      directory = %project.directory.display(),
      requirements = project.requirements.len(),
      problems = project.problems.len(),
      "project loaded"
    );
    Ok(project)
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn file_path(&self) -> &Path {
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

  /// Write manifest edits to disk.
  pub fn save(&mut self) -> Result<(), ProjectError> {
    self.file.save()?;
    Ok(())
  }

  /// Discard in-memory manifest edits and re-read the file from disk.
  pub fn reload(&mut self) -> Result<(), ProjectError> {
    self.file.reload()?;
    self.recompute();
    Ok(())
  }

  pub fn find_requirement(&self, env_var: &str) -> Option<&Requirement> {
    self.requirements.iter().find(|r| r.env_var == env_var)
  }

  pub fn find_command(&self, name: &str) -> Option<&ProjectCommand> {
    self.commands.iter().find(|c| c.name == name)
  }

  /// Rebuild requirements, env specs, commands, and problems from the
  /// current (possibly edited, possibly unsaved) manifest tree.
  pub fn recompute(&mut self) {
    let root = self.file.root().clone();

    self.requirements = Vec::new();
    self.commands = Vec::new();
    self.env_specs = Vec::new();
    self.problems = Vec::new();

    self.name = match root.get("name") {
      None | Some(Value::Null) => directory_name(&self.directory),
      Some(Value::String(name)) if !name.is_empty() => name.clone(),
      Some(Value::String(_)) => {
        self.problems.push("name in rigup.yml cannot be an empty string".to_string());
        directory_name(&self.directory)
      }
      Some(_) => {
        self.problems.push("name in rigup.yml must be a string".to_string());
        directory_name(&self.directory)
      }
    };
    self.description = root.get("description").and_then(Value::as_str).map(str::to_string);

    // Env specs, with the global packages/channels lists folded into each
    let global_packages = string_list_field(&root, "packages", "packages", &mut self.problems);
    let global_channels = string_list_field(&root, "channels", "channels", &mut self.problems);

    let mut env_specs = Vec::new();
    match root.get("env_specs") {
      None | Some(Value::Null) => {}
      Some(Value::Mapping(section)) => {
        for (key, value) in section {
          let name = match key.as_str() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
              self.problems.push("env spec names must be non-empty strings".to_string());
              continue;
            }
          };
          match value {
            Value::Null => env_specs.push(EnvSpec {
              name,
              packages: global_packages.clone(),
              channels: global_channels.clone(),
              description: None,
            }),
            Value::Mapping(spec) => {
              let what_packages = format!("env spec '{}' packages", name);
              let own_packages = string_list_field(spec, "packages", &what_packages, &mut self.problems);
              let what_channels = format!("env spec '{}' channels", name);
              let own_channels = string_list_field(spec, "channels", &what_channels, &mut self.problems);
              env_specs.push(EnvSpec {
                name,
                packages: merged_list(&global_packages, own_packages),
                channels: merged_list(&global_channels, own_channels),
                description: spec.get("description").and_then(Value::as_str).map(str::to_string),
              });
            }
            _ => {
              self.problems.push(format!("env spec '{}' must be a mapping", name));
            }
          }
        }
      }
      Some(_) => {
        self.problems.push("env_specs section must be a mapping".to_string());
      }
    }
    if env_specs.is_empty() {
      env_specs.push(EnvSpec {
        name: "default".to_string(),
        packages: global_packages.clone(),
        channels: global_channels.clone(),
        description: None,
      });
    }
    self.default_env_spec_name = if env_specs.iter().any(|spec| spec.name == "default") {
      "default".to_string()
    } else {
      match env_specs.first() {
        Some(spec) => spec.name.clone(),
        None => "default".to_string(),
      }
    };

    // The project env requirement always comes first in the plan
    if let Some(spec) = env_specs.iter().find(|spec| spec.name == self.default_env_spec_name) {
      self.requirements.push(Requirement::new(
        PROJECT_ENV_VAR,
        RequirementKind::ProjectEnv {
          spec_name: spec.name.clone(),
          packages: spec.packages.clone(),
          channels: spec.channels.clone(),
        },
      ));
    }
    self.env_specs = env_specs;

    let mut claimed: BTreeSet<String> = BTreeSet::new();

    match root.get("variables") {
      None | Some(Value::Null) => {}
      Some(Value::Sequence(items)) => {
        for item in items {
          match item.as_str() {
            Some(name) if !name.is_empty() => {
              if claim_env_var(name, &mut claimed, &mut self.problems) {
                self
                  .requirements
                  .push(Requirement::new(name, RequirementKind::EnvVar { default: None }));
              }
            }
            _ => {
              self.problems.push("variable names must be non-empty strings".to_string());
            }
          }
        }
      }
      Some(Value::Mapping(section)) => {
        for (key, value) in section {
          let name = match key.as_str() {
            Some(name) if !name.is_empty() => name,
            _ => {
              self.problems.push("variable names must be non-empty strings".to_string());
              continue;
            }
          };
          if !claim_env_var(name, &mut claimed, &mut self.problems) {
            continue;
          }
          let mut requirement = Requirement::new(name, RequirementKind::EnvVar { default: None });
          match value {
            Value::Null => {}
            Value::Mapping(spec) => {
              let default = match spec.get("default") {
                None | Some(Value::Null) => None,
                Some(default) => match yaml_scalar_to_string(default) {
                  Some(default) => Some(default),
                  None => {
                    self
                      .problems
                      .push(format!("variable {} has a non-scalar default value", name));
                    None
                  }
                },
              };
              requirement.kind = RequirementKind::EnvVar { default };
              requirement.description = spec.get("description").and_then(Value::as_str).map(str::to_string);
            }
            _ => match yaml_scalar_to_string(value) {
              Some(default) => {
                requirement.kind = RequirementKind::EnvVar { default: Some(default) };
              }
              None => {
                self
                  .problems
                  .push(format!("variable {} has an unsupported value type", name));
              }
            },
          }
          self.requirements.push(requirement);
        }
      }
      Some(_) => {
        self
          .problems
          .push("variables section must be a list of names or a mapping".to_string());
      }
    }

    match root.get("downloads") {
      None | Some(Value::Null) => {}
      Some(Value::Mapping(section)) => {
        for (key, value) in section {
          let name = match key.as_str() {
            Some(name) if !name.is_empty() => name,
            _ => {
              self.problems.push("download names must be non-empty strings".to_string());
              continue;
            }
          };
          if !claim_env_var(name, &mut claimed, &mut self.problems) {
            continue;
          }
          match value {
            Value::String(url) if !url.is_empty() => {
              let filename = default_filename(url, name);
              self.requirements.push(Requirement::new(
                name,
                RequirementKind::Download {
                  url: url.clone(),
                  filename,
                  checksum: None,
                  unzip: false,
                },
              ));
            }
            Value::Mapping(spec) => {
              if let Some(requirement) = download_from_spec(name, spec, &mut self.problems) {
                self.requirements.push(requirement);
              }
            }
            _ => {
              self
                .problems
                .push(format!("download '{}' must be a URL string or a mapping with a url", name));
            }
          }
        }
      }
      Some(_) => {
        self.problems.push("downloads section must be a mapping".to_string());
      }
    }

    match root.get("services") {
      None | Some(Value::Null) => {}
      Some(Value::Mapping(section)) => {
        for (key, value) in section {
          let name = match key.as_str() {
            Some(name) if !name.is_empty() => name,
            _ => {
              self.problems.push("service names must be non-empty strings".to_string());
              continue;
            }
          };
          if !claim_env_var(name, &mut claimed, &mut self.problems) {
            continue;
          }
          let (service_type, description) = match value {
            Value::String(service_type) => (Some(service_type.as_str()), None),
            Value::Mapping(spec) => (
              spec.get("type").and_then(Value::as_str),
              spec.get("description").and_then(Value::as_str).map(str::to_string),
            ),
            _ => (None, None),
          };
          match service_type {
            Some(service_type) if KNOWN_SERVICE_TYPES.contains(&service_type) => {
              let mut requirement = Requirement::new(
                name,
                RequirementKind::Service {
                  service_type: service_type.to_string(),
                },
              );
              requirement.description = description;
              self.requirements.push(requirement);
            }
            Some(service_type) => {
              self
                .problems
                .push(format!("service {} has an unknown type '{}'", name, service_type));
            }
            None => {
              self.problems.push(format!("service {} must specify a type", name));
            }
          }
        }
      }
      Some(_) => {
        self.problems.push("services section must be a mapping".to_string());
      }
    }

    match root.get("commands") {
      None | Some(Value::Null) => {}
      Some(Value::Mapping(section)) => {
        for (key, value) in section {
          let name = match key.as_str() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
              self.problems.push("command names must be non-empty strings".to_string());
              continue;
            }
          };
          match value {
            Value::Mapping(spec) => {
              let unix = spec.get("unix").and_then(Value::as_str).map(str::to_string);
              let windows = spec.get("windows").and_then(Value::as_str).map(str::to_string);
              if unix.is_none() && windows.is_none() {
                self
                  .problems
                  .push(format!("command '{}' does not have a command line in it", name));
                continue;
              }
              self.commands.push(ProjectCommand {
                name,
                unix,
                windows,
                description: spec.get("description").and_then(Value::as_str).map(str::to_string),
                env_spec: spec.get("env_spec").and_then(Value::as_str).map(str::to_string),
              });
            }
            _ => {
              self
                .problems
                .push(format!("command '{}' must be a mapping of platform to command line", name));
            }
          }
        }
      }
      Some(_) => {
        self.problems.push("commands section must be a mapping".to_string());
      }
    }
  }
}

fn directory_name(directory: &Path) -> String {
  match directory.file_name() {
    Some(name) => name.to_string_lossy().into_owned(),
    None => "project".to_string(),
  }
}

fn claim_env_var(name: &str, claimed: &mut BTreeSet<String>, problems: &mut Vec<String>) -> bool {
  if name == PROJECT_ENV_VAR {
    problems.push(format!("{} is reserved and managed by the project environment", name));
    return false;
  }
  if !claimed.insert(name.to_string()) {
    problems.push(format!("{} is declared more than once in rigup.yml", name));
    return false;
  }
  true
}

fn string_list_field(section: &Mapping, key: &str, what: &str, problems: &mut Vec<String>) -> Vec<String> {
  match section.get(key) {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Sequence(items)) => {
      let mut out = Vec::new();
      for item in items {
        match item.as_str() {
          Some(item) if !item.is_empty() => out.push(item.to_string()),
          _ => problems.push(format!("{} must be a list of non-empty strings", what)),
        }
      }
      out
    }
    Some(_) => {
      problems.push(format!("{} must be a list of non-empty strings", what));
      Vec::new()
    }
  }
}

fn merged_list(global: &[String], own: Vec<String>) -> Vec<String> {
  let mut merged = global.to_vec();
  for item in own {
    if !merged.contains(&item) {
      merged.push(item);
    }
  }
  merged
}

fn download_from_spec(env_var: &str, spec: &Mapping, problems: &mut Vec<String>) -> Option<Requirement> {
  let url = match spec.get("url") {
    None | Some(Value::Null) => {
      problems.push(format!("download '{}' is missing a url", env_var));
      return None;
    }
    Some(Value::String(url)) => {
      if url.is_empty() {
        problems.push(format!("download '{}' is missing a url", env_var));
        return None;
      }
      url.clone()
    }
    Some(_) => {
      problems.push(format!("download '{}' has a non-string url", env_var));
      return None;
    }
  };

  let mut checksum = None;
  let mut algorithm_count = 0;
  for algorithm in ChecksumAlgorithm::ALL {
    match spec.get(algorithm.as_str()) {
      None | Some(Value::Null) => {}
      Some(value) => {
        algorithm_count += 1;
        match value.as_str() {
          Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            checksum = Some(Checksum {
              algorithm,
              value: hex.to_ascii_lowercase(),
            });
          }
          _ => {
            problems.push(format!("download '{}' has a malformed {} checksum", env_var, algorithm));
          }
        }
      }
    }
  }
  if algorithm_count > 1 {
    problems.push(format!("download '{}' specifies multiple checksums", env_var));
  }
  for unsupported in ["md5", "sha1"] {
    if spec.contains_key(unsupported) {
      problems.push(format!(
        "download '{}' uses unsupported checksum algorithm '{}'",
        env_var, unsupported
      ));
    }
  }

  let unzip = match spec.get("unzip") {
    None | Some(Value::Null) => false,
    Some(Value::Bool(unzip)) => *unzip,
    Some(_) => {
      problems.push(format!("download '{}' has a non-boolean unzip flag", env_var));
      false
    }
  };

  let filename = match spec.get("filename") {
    None | Some(Value::Null) => default_filename(&url, env_var),
    Some(Value::String(filename)) if !filename.is_empty() => filename.clone(),
    Some(_) => {
      problems.push(format!("download '{}' has an invalid filename", env_var));
      default_filename(&url, env_var)
    }
  };

  let mut requirement = Requirement::new(
    env_var,
    RequirementKind::Download {
      url,
      filename,
      checksum,
      unzip,
    },
  );
  requirement.description = spec.get("description").and_then(Value::as_str).map(str::to_string);
  Some(requirement)
}

/// Derive a destination filename from the URL's last path segment,
/// sanitized down to safe characters; fall back to the env var name.
fn default_filename(url: &str, env_var: &str) -> String {
  let last_segment = url.rsplit('/').next().unwrap_or("");
  let without_query = last_segment.split('?').next().unwrap_or("");
  let sanitized: String = without_query
    .chars()
    .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
    .collect();
  if sanitized.is_empty() { env_var.to_lowercase() } else { sanitized }
}

// =============================================================================
// Tests
// =============================================================================
