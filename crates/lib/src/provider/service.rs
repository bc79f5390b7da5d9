//! Provider for the redis service requirement.
//!
//! Depending on the configured scope, this reuses a system-wide server on
//! the default port, reuses a project-scoped server recorded in local state,
//! or starts a fresh `redis-server` under `services/{env_var}/` and records
//! how to shut it down again.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::Command;
use std::time::{Duration, Instant};

use serde_yaml::{Mapping, Value};

use crate::consts::SERVICES_DIRNAME;
use crate::environ::EnvMap;
use crate::local_state::LocalStateFile;
use crate::provider::types::{read_config_section, Provider, ProvideContext, ProvideMode, ProviderConfig};
use crate::requirement::{Requirement, RequirementKind};

pub const DEFAULT_REDIS_PORT: u16 = 6379;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct RedisProvider {
  system_port: u16,
}

impl Default for RedisProvider {
  fn default() -> Self {
    Self { system_port: DEFAULT_REDIS_PORT }
  }
}

impl RedisProvider {
  /// Probe a non-standard port for the system-wide server. For tests.
  pub fn with_system_port(port: u16) -> Self {
    Self { system_port: port }
  }

  fn start_project_scoped(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) {
    let project_dir = match context.project_dir() {
      Some(dir) => dir,
      None => {
        context.append_error(format!("Cannot locate the project directory to provide {}.", requirement.env_var));
        return;
      }
    };
    let service_dir = project_dir.join(SERVICES_DIRNAME).join(&requirement.env_var);
    if let Err(e) = std::fs::create_dir_all(&service_dir) {
      context.append_error(format!("Error creating {}: {}", service_dir.display(), e));
      return;
    }
    let port = match free_port() {
      Ok(port) => port,
      Err(e) => {
        context.append_error(format!("Error finding a free port: {}", e));
        return;
      }
    };

    let pidfile = service_dir.join("redis.pid");
    let config_file = service_dir.join("redis.conf");
    let config_contents = format!(
      "daemonize yes\npidfile {}\nport {}\nlogfile {}\ndir {}\n",
      pidfile.display(),
      port,
      service_dir.join("redis.log").display(),
      service_dir.display()
    );
    if let Err(e) = std::fs::write(&config_file, config_contents) {
      context.append_error(format!("Error writing {}: {}", config_file.display(), e));
      return;
    }

    let started = match Command::new("redis-server").arg(&config_file).status() {
      Ok(status) if status.success() => wait_until_connectable(port, STARTUP_TIMEOUT),
      Ok(status) => {
        context.append_error(format!("redis-server exited with {}", status.code().unwrap_or(-1)));
        false
      }
      Err(e) => {
        context.append_error(format!("Error running redis-server: {}", e));
        false
      }
    };
    if !started {
      if context.errors().is_empty() {
        context.append_error(format!("redis-server did not start listening on port {}", port));
      }
      context.local_state.set_service_run_state(&requirement.env_var, Mapping::new());
      return;
    }

    let mut run_state = Mapping::new();
    run_state.insert(Value::from("port"), Value::from(port));
    run_state.insert(Value::from("pidfile"), Value::from(pidfile.display().to_string()));
    run_state.insert(
      Value::from("shutdown_commands"),
      Value::Sequence(vec![Value::Sequence(vec![
        Value::from("redis-cli"),
        Value::from("-p"),
        Value::from(port.to_string()),
        Value::from("shutdown"),
        Value::from("nosave"),
      ])]),
    );
    context.local_state.set_service_run_state(&requirement.env_var, run_state);
    context
      .environ
      .insert(requirement.env_var.clone(), redis_url(port));
    context.append_log(format!("Started redis-server on port {}.", port));
  }
}

impl Provider for RedisProvider {
  fn config_key(&self) -> &'static str {
    "redis"
  }

  fn read_config(
    &self,
    requirement: &Requirement,
    _environ: &EnvMap,
    local_state: &LocalStateFile,
  ) -> ProviderConfig {
    let mut config = read_config_section(self.config_key(), requirement, local_state);
    config
      .entry("scope".to_string())
      .or_insert_with(|| Value::from("find_all"));
    config
  }

  fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) {
    let service_type = match &requirement.kind {
      RequirementKind::Service { service_type } => service_type,
      _ => return,
    };
    if service_type != "redis" {
      return;
    }

    let scope = context
      .config
      .get("scope")
      .and_then(Value::as_str)
      .unwrap_or("find_all")
      .to_string();
    if scope == "environ" {
      return;
    }

    if scope != "find_project" && can_connect(self.system_port) {
      context
        .environ
        .insert(requirement.env_var.clone(), redis_url(self.system_port));
      return;
    }

    if let Some(port) = recorded_port(context.local_state, &requirement.env_var) {
      if can_connect(port) {
        context.environ.insert(requirement.env_var.clone(), redis_url(port));
        return;
      }
    }

    if context.mode() == ProvideMode::Check {
      return;
    }
    self.start_project_scoped(requirement, context);
  }
}

fn redis_url(port: u16) -> String {
  format!("redis://localhost:{}", port)
}

fn recorded_port(local_state: &LocalStateFile, name: &str) -> Option<u16> {
  let state = local_state.service_run_state(name)?;
  let port = state.get("port")?.as_u64()?;
  u16::try_from(port).ok()
}

fn free_port() -> std::io::Result<u16> {
  let listener = TcpListener::bind(("127.0.0.1", 0))?;
  Ok(listener.local_addr()?.port())
}

fn can_connect(port: u16) -> bool {
  let address = SocketAddr::from(([127, 0, 0, 1], port));
  TcpStream::connect_timeout(&address, CONNECT_TIMEOUT).is_ok()
}

fn wait_until_connectable(port: u16, timeout: Duration) -> bool {
  let deadline = Instant::now() + timeout;
  loop {
    if can_connect(port) {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    std::thread::sleep(Duration::from_millis(100));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  // Nothing listens on port 1, and connecting fails fast.
  const CLOSED_PORT: u16 = 1;

  fn redis_requirement() -> Requirement {
    Requirement::new("REDIS_URL", RequirementKind::Service {
      service_type: "redis".to_string(),
    })
  }

  fn run_provide(
    provider: &RedisProvider,
    project_dir: &std::path::Path,
    local_state: &mut LocalStateFile,
    mode: ProvideMode,
  ) -> (EnvMap, Vec<String>, Vec<String>) {
    let requirement = redis_requirement();
    let mut environ = EnvMap::new();
    environ.insert("PROJECT_DIR".to_string(), project_dir.display().to_string());
    let config = provider.read_config(&requirement, &environ, local_state);
    let mut context = ProvideContext::new(&mut environ, local_state, config, mode);
    provider.provide(&requirement, &mut context);
    let (logs, errors) = context.into_logs_and_errors();
    (environ, logs, errors)
  }

  #[test]
  fn scope_defaults_to_find_all() {
    let temp = TempDir::new().unwrap();
    let local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let config = RedisProvider::default().read_config(&redis_requirement(), &EnvMap::new(), &local_state);
    assert_eq!(config.get("scope"), Some(&Value::from("find_all")));
  }

  #[test]
  fn environ_scope_does_nothing() {
    let temp = TempDir::new().unwrap();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    local_state.set_value(&["runtime", "REDIS_URL", "providers", "redis", "scope"], Value::from("environ"));

    let provider = RedisProvider::with_system_port(CLOSED_PORT);
    let (environ, logs, errors) = run_provide(&provider, temp.path(), &mut local_state, ProvideMode::Provide);

    assert!(logs.is_empty());
    assert!(errors.is_empty());
    assert!(!environ.contains_key("REDIS_URL"));
  }

  #[test]
  fn reuses_a_system_wide_server() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let temp = TempDir::new().unwrap();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let provider = RedisProvider::with_system_port(port);
    let (environ, _, errors) = run_provide(&provider, temp.path(), &mut local_state, ProvideMode::Provide);

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(
      environ.get("REDIS_URL").map(String::as_str),
      Some(format!("redis://localhost:{}", port).as_str())
    );
    assert!(local_state.service_run_state("REDIS_URL").is_none());
  }

  #[test]
  fn reuses_a_recorded_project_server_that_still_answers() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let temp = TempDir::new().unwrap();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let mut run_state = Mapping::new();
    run_state.insert(Value::from("port"), Value::from(port));
    local_state.set_service_run_state("REDIS_URL", run_state);

    let provider = RedisProvider::with_system_port(CLOSED_PORT);
    let (environ, _, errors) = run_provide(&provider, temp.path(), &mut local_state, ProvideMode::Provide);

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(
      environ.get("REDIS_URL").map(String::as_str),
      Some(format!("redis://localhost:{}", port).as_str())
    );
  }

  #[test]
  fn check_mode_never_starts_a_server() {
    let temp = TempDir::new().unwrap();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let provider = RedisProvider::with_system_port(CLOSED_PORT);
    let (environ, logs, errors) = run_provide(&provider, temp.path(), &mut local_state, ProvideMode::Check);

    assert!(logs.is_empty());
    assert!(errors.is_empty());
    assert!(!environ.contains_key("REDIS_URL"));
    assert!(!temp.path().join(SERVICES_DIRNAME).exists());
  }

  #[test]
  #[serial]
  fn spawn_failure_reports_an_error_and_clears_run_state() {
    let temp = TempDir::new().unwrap();
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let provider = RedisProvider::with_system_port(CLOSED_PORT);

    // An empty PATH guarantees redis-server cannot be found.
    let (environ, _, errors) = temp_env::with_var("PATH", Some(""), || {
      run_provide(&provider, temp.path(), &mut local_state, ProvideMode::Provide)
    });

    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error running redis-server: "), "{}", errors[0]);
    assert!(!environ.contains_key("REDIS_URL"));
    let run_state = local_state.service_run_state("REDIS_URL").unwrap();
    assert!(run_state.is_empty());
  }
}
