//! High-level project mutations: the operations behind the CLI subcommands.
//!
//! Ops that add something provisionable follow a commit-if-it-works rule:
//! edit the in-memory manifest, run a prepare restricted to the affected
//! requirement against a scratch copy of the caller's environment, and only
//! save the manifest when that requirement came out satisfied. On failure
//! the manifest is reloaded from disk, so a bad edit never lands in the
//! file. Ops that merely declare or remove things validate the edited
//! manifest for problems instead of preparing.

use std::io;
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{ENVS_DIRNAME, PROJECT_ENV_VAR, PROJECT_FILENAME, SERVICES_DIRNAME};
use crate::environ::EnvMap;
use crate::local_state::LocalStateFile;
use crate::manifest::{Project, ProjectError, KNOWN_SERVICE_TYPES};
use crate::prepare::{prepare, run_shutdown_commands, PrepareError, PrepareOptions, UnmetRequirement};
use crate::requirement::{Checksum, ChecksumAlgorithm, RequirementKind};
use crate::yaml_file::{yaml_scalar_to_string, YamlFile, YamlFileError};

#[derive(Debug, Error)]
pub enum OpsError {
  #[error("project file has problems: {}", problems.join("; "))]
  ProjectProblems { problems: Vec<String> },

  #[error("prepare failed: {}", prepare_failure_summary(unmet, errors))]
  PrepareFailed {
    unmet: Vec<UnmetRequirement>,
    errors: Vec<String>,
  },

  #[error("{0}")]
  NotFound(String),

  #[error("unknown service type '{service_type}', expected one of: {}", known.join(", "))]
  UnknownServiceType { service_type: String, known: Vec<String> },

  #[error("{0}")]
  Invalid(String),

  #[error("failed to remove {}: {source}", path.display())]
  RemoveFile { path: PathBuf, source: io::Error },

  #[error("failed to create {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: io::Error },

  #[error(transparent)]
  Project(#[from] ProjectError),

  #[error(transparent)]
  Prepare(#[from] PrepareError),

  #[error(transparent)]
  Yaml(#[from] YamlFileError),
}

fn prepare_failure_summary(unmet: &[UnmetRequirement], errors: &[String]) -> String {
  let mut parts: Vec<String> = errors.to_vec();
  for requirement in unmet {
    parts.push(format!("{} ({})", requirement.title, requirement.reason));
  }
  parts.join("; ")
}

/// Create a fresh project: a directory with a seeded `rigup.yml`.
pub fn init_project(directory: impl Into<PathBuf>, name: Option<&str>) -> Result<Project, OpsError> {
  let directory = directory.into();
  let manifest_path = directory.join(PROJECT_FILENAME);
  if manifest_path.exists() {
    return Err(OpsError::Invalid(format!("{} already exists.", manifest_path.display())));
  }
  std::fs::create_dir_all(&directory).map_err(|source| OpsError::CreateDir {
    path: directory.clone(),
    source,
  })?;

  let mut file = YamlFile::load(manifest_path)?;
  if let Some(name) = name {
    file.set_value(&["name"], Value::from(name));
  }
  file.set_value(&["env_specs", "default", "packages"], Value::Sequence(Vec::new()));
  file.set_value(&["env_specs", "default", "channels"], Value::Sequence(Vec::new()));
  file.save()?;

  let project = Project::load(directory)?;
  info!(directory = %project.directory().display(), "initialized project");
  Ok(project)
}

/// Declare variables in the manifest. A `(name, Some(default))` pair sets
/// the manifest default; a bare name is declared with no default.
pub fn add_variables(project: &mut Project, vars: &[(String, Option<String>)]) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  for (name, _) in vars {
    if let Some(existing) = project.find_requirement(name) {
      match existing.kind {
        RequirementKind::EnvVar { .. } => {}
        _ => return Err(OpsError::Invalid(format!("Variable {} is already in use.", name))),
      }
    }
  }
  for (name, default) in vars {
    match default {
      Some(default) => {
        let mut spec = Mapping::new();
        spec.insert(Value::from("default"), Value::from(default.as_str()));
        project.set_value(&["variables", name], Value::Mapping(spec));
      }
      None => {
        if project.find_requirement(name).is_none() {
          project.set_value(&["variables", name], Value::Null);
        }
      }
    }
  }
  commit_or_rollback(project)
}

/// Remove variable declarations, and any values stored for them in local
/// state.
pub fn remove_variables(project: &mut Project, names: &[String]) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  let mut local_state = LocalStateFile::load_for_directory(project.directory())?;
  for name in names {
    project.unset_value(&["variables", name]);
    local_state.unset_value(&["variables", name]);
  }
  local_state.save()?;
  project.save()?;
  project.recompute();
  Ok(())
}

/// Add (or update) a download requirement, then commit only if the file can
/// actually be fetched.
pub fn add_download(
  project: &mut Project,
  environ: &EnvMap,
  env_var: &str,
  url: &str,
  filename: Option<&str>,
  checksum: Option<Checksum>,
  options: PrepareOptions,
) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  if let Some(existing) = project.find_requirement(env_var) {
    match existing.kind {
      RequirementKind::Download { .. } => {}
      _ => return Err(OpsError::Invalid(format!("Variable {} is already in use.", env_var))),
    }
  }

  let existing = project.get_value(&["downloads", env_var]).cloned();
  let declaration = match existing {
    Some(Value::Mapping(spec)) => {
      Value::Mapping(download_spec(Some(spec), url, filename, checksum.as_ref()))
    }
    _ => {
      if filename.is_none() && checksum.is_none() {
        Value::from(url)
      } else {
        Value::Mapping(download_spec(None, url, filename, checksum.as_ref()))
      }
    }
  };
  project.set_value(&["downloads", env_var], declaration);
  commit_if_it_works(project, environ, env_var, options)
}

fn download_spec(
  existing: Option<Mapping>,
  url: &str,
  filename: Option<&str>,
  checksum: Option<&Checksum>,
) -> Mapping {
  let mut spec = existing.unwrap_or_default();
  spec.insert(Value::from("url"), Value::from(url));
  if let Some(filename) = filename {
    spec.insert(Value::from("filename"), Value::from(filename));
  }
  if let Some(checksum) = checksum {
    // Only one algorithm may be declared at a time
    for algorithm in ChecksumAlgorithm::ALL {
      spec.remove(algorithm.as_str());
    }
    spec.insert(
      Value::from(checksum.algorithm.as_str()),
      Value::from(checksum.value.as_str()),
    );
  }
  spec
}

/// Remove a download declaration and delete the downloaded file if it lives
/// inside the project directory.
pub fn remove_download(project: &mut Project, env_var: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  let filename = match project.find_requirement(env_var).map(|r| &r.kind) {
    Some(RequirementKind::Download { filename, .. }) => filename.clone(),
    _ => {
      return Err(OpsError::NotFound(format!("Download requirement: {} not found.", env_var)));
    }
  };

  let relative = Path::new(&filename);
  if is_safe_relative_path(relative) {
    let path = project.directory().join(relative);
    if path.exists() {
      remove_path(&path)?;
      debug!(path = %path.display(), "removed downloaded file");
    }
  }

  project.unset_value(&["downloads", env_var]);
  project.save()?;
  project.recompute();
  Ok(())
}

/// Add a service requirement, then commit only if the service can be
/// provided. The env var defaults to `{TYPE}_URL`.
pub fn add_service(
  project: &mut Project,
  environ: &EnvMap,
  service_type: &str,
  env_var: Option<&str>,
  options: PrepareOptions,
) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  if !KNOWN_SERVICE_TYPES.contains(&service_type) {
    return Err(OpsError::UnknownServiceType {
      service_type: service_type.to_string(),
      known: KNOWN_SERVICE_TYPES.iter().map(|t| t.to_string()).collect(),
    });
  }
  let env_var = match env_var {
    Some(env_var) => env_var.to_string(),
    None => format!("{}_URL", service_type.to_uppercase()),
  };

  if let Some(existing) = project.find_requirement(&env_var) {
    match &existing.kind {
      RequirementKind::Service { service_type: existing_type } if existing_type == service_type => {
        return Ok(());
      }
      _ => return Err(OpsError::Invalid(format!("Variable {} is already in use.", env_var))),
    }
  }

  project.set_value(&["services", &env_var], Value::from(service_type));
  commit_if_it_works(project, environ, &env_var, options)
}

/// Remove a service by env var or by type, shutting it down first.
pub fn remove_service(project: &mut Project, name: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  let matches: Vec<String> = project
    .requirements
    .iter()
    .filter(|requirement| match &requirement.kind {
      RequirementKind::Service { service_type } => {
        requirement.env_var == name || service_type == name
      }
      _ => false,
    })
    .map(|requirement| requirement.env_var.clone())
    .collect();
  let env_var = match matches.as_slice() {
    [] => {
      return Err(OpsError::NotFound(format!("Service '{}' not found in the project file.", name)));
    }
    [env_var] => env_var.clone(),
    _ => {
      return Err(OpsError::Invalid(format!(
        "Conflicting results, found {} matches; specify the environment variable name instead.",
        matches.len()
      )));
    }
  };

  let mut local_state = LocalStateFile::load_for_directory(project.directory())?;
  if let Some(state) = local_state.service_run_state(&env_var).cloned() {
    for log in run_shutdown_commands(&state) {
      info!("{}", log);
    }
    local_state.set_service_run_state(&env_var, Mapping::new());
    local_state.save()?;
  }

  let service_dir = project.directory().join(SERVICES_DIRNAME).join(&env_var);
  if service_dir.is_dir() {
    remove_path(&service_dir)?;
  }

  project.unset_value(&["services", &env_var]);
  project.save()?;
  project.recompute();
  Ok(())
}

/// Set a command line under `commands.{name}.{command_type}`.
pub fn add_command(project: &mut Project, name: &str, command_type: &str, line: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  validate_command_type(command_type)?;
  project.set_value(&["commands", name, command_type], Value::from(line));
  commit_or_rollback(project)
}

/// Replace the line of an existing command.
pub fn update_command(project: &mut Project, name: &str, command_type: &str, line: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  validate_command_type(command_type)?;
  if project.find_command(name).is_none() {
    return Err(OpsError::NotFound(format!("Command: '{}' not found in project file.", name)));
  }
  project.set_value(&["commands", name, command_type], Value::from(line));
  commit_or_rollback(project)
}

pub fn remove_command(project: &mut Project, name: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  if project.find_command(name).is_none() {
    return Err(OpsError::NotFound(format!("Command: '{}' not found in project file.", name)));
  }
  project.unset_value(&["commands", name]);
  project.save()?;
  project.recompute();
  Ok(())
}

fn validate_command_type(command_type: &str) -> Result<(), OpsError> {
  match command_type {
    "unix" | "windows" => Ok(()),
    other => Err(OpsError::Invalid(format!(
      "Invalid command type '{}', choose from: unix, windows",
      other
    ))),
  }
}

/// Declare a new (empty) env spec.
pub fn add_env_spec(project: &mut Project, name: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  if project.get_value(&["env_specs", name]).is_some() {
    return Ok(());
  }
  project.set_value(&["env_specs", name, "packages"], Value::Sequence(Vec::new()));
  project.set_value(&["env_specs", name, "channels"], Value::Sequence(Vec::new()));
  commit_or_rollback(project)
}

/// Remove an env spec declaration and its provisioned directory.
pub fn remove_env_spec(project: &mut Project, name: &str) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  if name == project.default_env_spec_name {
    return Err(OpsError::Invalid("Cannot remove default environment spec.".to_string()));
  }
  if project.get_value(&["env_specs", name]).is_none() {
    return Err(OpsError::NotFound(format!("Environment spec {} doesn't exist.", name)));
  }

  let env_dir = project.directory().join(ENVS_DIRNAME).join(name);
  if env_dir.is_dir() {
    remove_path(&env_dir)?;
  }

  project.unset_value(&["env_specs", name]);
  project.save()?;
  project.recompute();
  Ok(())
}

/// Add packages (and channels) to an env spec, or to the global lists when
/// `env_spec` is `None`. Commits only if the default environment still
/// provisions afterwards.
pub fn add_packages(
  project: &mut Project,
  environ: &EnvMap,
  env_spec: Option<&str>,
  packages: &[String],
  channels: &[String],
  options: PrepareOptions,
) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  let affects_default = match env_spec {
    None => true,
    Some(name) => {
      if project.get_value(&["env_specs", name]).is_none() {
        return Err(OpsError::NotFound(format!("Environment spec {} doesn't exist.", name)));
      }
      name == project.default_env_spec_name
    }
  };

  match env_spec {
    None => {
      append_missing(project, &["packages"], packages);
      append_missing(project, &["channels"], channels);
    }
    Some(name) => {
      append_missing(project, &["env_specs", name, "packages"], packages);
      append_missing(project, &["env_specs", name, "channels"], channels);
    }
  }

  if affects_default {
    commit_if_it_works(project, environ, PROJECT_ENV_VAR, options)
  } else {
    commit_or_rollback(project)
  }
}

/// Remove packages from an env spec, or from the global list and every
/// spec when `env_spec` is `None`. Files already installed into the
/// environment are left for `clean` to deal with.
pub fn remove_packages(
  project: &mut Project,
  environ: &EnvMap,
  env_spec: Option<&str>,
  packages: &[String],
  options: PrepareOptions,
) -> Result<(), OpsError> {
  ensure_no_problems(project)?;
  let affects_default = match env_spec {
    None => true,
    Some(name) => {
      if project.get_value(&["env_specs", name]).is_none() {
        return Err(OpsError::NotFound(format!("Environment spec {} doesn't exist.", name)));
      }
      name == project.default_env_spec_name
    }
  };

  match env_spec {
    None => {
      remove_from_list(project, &["packages"], packages);
      let names: Vec<String> = project.env_specs.iter().map(|spec| spec.name.clone()).collect();
      for name in names {
        remove_from_list(project, &["env_specs", name.as_str(), "packages"], packages);
      }
    }
    Some(name) => {
      remove_from_list(project, &["env_specs", name, "packages"], packages);
    }
  }

  if affects_default {
    commit_if_it_works(project, environ, PROJECT_ENV_VAR, options)
  } else {
    commit_or_rollback(project)
  }
}

#[derive(Debug, Default)]
pub struct CleanResult {
  pub logs: Vec<String>,
  pub errors: Vec<String>,
}

impl CleanResult {
  pub fn is_success(&self) -> bool {
    self.errors.is_empty()
  }
}

/// Shut everything down and delete the provisioned state: service run
/// states, `services/`, and `envs/`.
pub fn clean(project: &Project) -> Result<CleanResult, OpsError> {
  let mut result = CleanResult::default();
  let unprepared = crate::prepare::unprepare(project)?;
  result.logs.extend(unprepared.logs);

  for dirname in [SERVICES_DIRNAME, ENVS_DIRNAME] {
    let path = project.directory().join(dirname);
    if !path.is_dir() {
      continue;
    }
    match std::fs::remove_dir_all(&path) {
      Ok(()) => result.logs.push(format!("Removing {}.", path.display())),
      Err(e) => result.errors.push(format!("Error removing {}: {}.", path.display(), e)),
    }
  }
  Ok(result)
}

fn ensure_no_problems(project: &Project) -> Result<(), OpsError> {
  if project.problems.is_empty() {
    Ok(())
  } else {
    Err(OpsError::ProjectProblems {
      problems: project.problems.clone(),
    })
  }
}

/// Validate the edited manifest; save if clean, reload (discarding the
/// edit) if it now has problems.
fn commit_or_rollback(project: &mut Project) -> Result<(), OpsError> {
  project.recompute();
  if !project.problems.is_empty() {
    let problems = project.problems.clone();
    project.reload()?;
    return Err(OpsError::ProjectProblems { problems });
  }
  project.save()?;
  Ok(())
}

/// Prepare just the affected requirement against a scratch environment;
/// save the manifest only when it came out satisfied.
fn commit_if_it_works(
  project: &mut Project,
  environ: &EnvMap,
  target_env_var: &str,
  options: PrepareOptions,
) -> Result<(), OpsError> {
  project.recompute();
  if !project.problems.is_empty() {
    let problems = project.problems.clone();
    project.reload()?;
    return Err(OpsError::ProjectProblems { problems });
  }

  let mut options = options;
  options.provide_whitelist = Some(vec![target_env_var.to_string()]);
  let mut scratch = environ.clone();
  let result = match prepare(project, &mut scratch, options) {
    Ok(result) => result,
    Err(e) => {
      project.reload()?;
      return Err(e.into());
    }
  };

  let target_unmet = result.unmet.iter().any(|u| u.env_var == target_env_var);
  if target_unmet || !result.errors.is_empty() {
    project.reload()?;
    return Err(OpsError::PrepareFailed {
      unmet: result.unmet,
      errors: result.errors,
    });
  }
  project.save()?;
  Ok(())
}

fn append_missing(project: &mut Project, path: &[&str], additions: &[String]) {
  if additions.is_empty() {
    return;
  }
  let mut items: Vec<Value> = match project.get_value(path) {
    Some(Value::Sequence(items)) => items.clone(),
    _ => Vec::new(),
  };
  let existing: Vec<String> = items.iter().filter_map(yaml_scalar_to_string).collect();
  let mut changed = false;
  for addition in additions {
    if !existing.contains(addition) {
      items.push(Value::from(addition.as_str()));
      changed = true;
    }
  }
  if changed {
    project.set_value(path, Value::Sequence(items));
  }
}

fn remove_from_list(project: &mut Project, path: &[&str], removals: &[String]) {
  let items: Vec<Value> = match project.get_value(path) {
    Some(Value::Sequence(items)) => items.clone(),
    _ => return,
  };
  let kept: Vec<Value> = items
    .iter()
    .filter(|item| match yaml_scalar_to_string(item) {
      Some(text) => !removals.contains(&text),
      None => true,
    })
    .cloned()
    .collect();
  if kept.len() != items.len() {
    project.set_value(path, Value::Sequence(kept));
  }
}

fn is_safe_relative_path(path: &Path) -> bool {
  !path.as_os_str().is_empty()
    && path.is_relative()
    && path.components().all(|component| matches!(component, Component::Normal(_)))
}

fn remove_path(path: &Path) -> Result<(), OpsError> {
  let result = if path.is_dir() {
    std::fs::remove_dir_all(path)
  } else {
    std::fs::remove_file(path)
  };
  result.map_err(|source| OpsError::RemoveFile {
    path: path.to_path_buf(),
    source,
  })
}
