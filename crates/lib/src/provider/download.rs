//! Provider for downloaded-file requirements.
//!
//! Fetches the URL into the project directory, optionally verifying a
//! checksum first, and points the requirement's env var at the absolute
//! path of the result. A file that is already on disk is reused without
//! touching the network.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::consts::PROJECT_DIR_VAR;
use crate::environ::EnvMap;
use crate::local_state::LocalStateFile;
use crate::provider::env_var::{read_env_var_config, set_env_var_config_values};
use crate::provider::types::{Analysis, Provider, ProvideContext, ProvideMode, ProviderConfig};
use crate::requirement::{Checksum, ChecksumAlgorithm, Requirement, RequirementKind};
use crate::yaml_file::yaml_scalar_to_string;

pub struct DownloadProvider;

impl Provider for DownloadProvider {
  fn config_key(&self) -> &'static str {
    "download"
  }

  fn read_config(
    &self,
    requirement: &Requirement,
    environ: &EnvMap,
    local_state: &LocalStateFile,
  ) -> ProviderConfig {
    let mut config = read_env_var_config(self.config_key(), requirement, environ, local_state);
    if config.get("source").and_then(Value::as_str) == Some("unset") {
      config.insert("source".to_string(), Value::from("download"));
    }
    config
  }

  fn set_config_values(
    &self,
    requirement: &Requirement,
    environ: &mut EnvMap,
    local_state: &mut LocalStateFile,
    values: &ProviderConfig,
  ) {
    set_env_var_config_values(requirement, local_state, values);
    // Choosing any source other than the ambient environment means the
    // stale ambient value must not shadow the chosen one.
    if values.get("source").and_then(Value::as_str) != Some("environ") {
      environ.remove(&requirement.env_var);
    }
  }

  fn analyze(&self, requirement: &Requirement, environ: &EnvMap, local_state: &LocalStateFile) -> Analysis {
    Analysis {
      config: self.read_config(requirement, environ, local_state),
      existing_filename: previously_downloaded_file(requirement, environ),
      ..Analysis::default()
    }
  }

  fn provide(&self, requirement: &Requirement, context: &mut ProvideContext<'_>) {
    let (url, filename, checksum) = match &requirement.kind {
      RequirementKind::Download { url, filename, checksum, .. } => (url, filename, checksum),
      _ => return,
    };

    let configured = context.config.get("value").and_then(yaml_scalar_to_string);
    if let Some(value) = configured {
      context.environ.insert(requirement.env_var.clone(), value);
    }
    if context.mode() == ProvideMode::Check {
      return;
    }

    let source = context
      .config
      .get("source")
      .and_then(Value::as_str)
      .unwrap_or("download");
    if context.environ.contains_key(&requirement.env_var) && source != "download" {
      return;
    }

    let project_dir = match context.project_dir() {
      Some(dir) => dir,
      None => {
        context.append_error(format!("Cannot locate the project directory to provide {}.", requirement.env_var));
        return;
      }
    };
    let destination = project_dir.join(filename);
    if destination.exists() {
      context.append_log(format!("Previously downloaded file located at {}", destination.display()));
      context
        .environ
        .insert(requirement.env_var.clone(), destination.display().to_string());
      return;
    }

    let mut response = match reqwest::blocking::get(url.as_str()) {
      Ok(response) => response,
      Err(e) => {
        context.append_error(format!("Error downloading {}: {}", url, e));
        return;
      }
    };
    if !response.status().is_success() {
      context.append_error(format!(
        "Error downloading {}: response code {}",
        url,
        response.status().as_u16()
      ));
      return;
    }

    // The body streams straight to a temp file beside the destination, so
    // a partial or rejected transfer never lands under the final name.
    let temp = match stream_to_temp_file(&mut response, &destination) {
      Ok(temp) => temp,
      Err(e) => {
        context.append_error(format!("Error downloading {}: {}", url, e));
        return;
      }
    };

    if let Some(checksum) = checksum {
      let actual = match hex_digest_file(checksum.algorithm, temp.path()) {
        Ok(actual) => actual,
        Err(e) => {
          context.append_error(format!("Error reading {}: {}", temp.path().display(), e));
          return;
        }
      };
      if actual != checksum.value {
        context.append_error(format!(
          "Checksum mismatch for {}: expected {}, got {}",
          url, checksum.value, actual
        ));
        return;
      }
    }

    if let Err(e) = temp.persist(&destination) {
      context.append_error(format!("Error writing {}: {}", destination.display(), e.error));
      return;
    }
    context
      .environ
      .insert(requirement.env_var.clone(), destination.display().to_string());
  }
}

fn previously_downloaded_file(requirement: &Requirement, environ: &EnvMap) -> Option<PathBuf> {
  let filename = match &requirement.kind {
    RequirementKind::Download { filename, .. } => filename,
    _ => return None,
  };
  let project_dir = environ.get(PROJECT_DIR_VAR)?;
  let path = PathBuf::from(project_dir).join(filename);
  if path.exists() { Some(path) } else { None }
}

fn stream_to_temp_file(
  response: &mut reqwest::blocking::Response,
  destination: &Path,
) -> io::Result<tempfile::NamedTempFile> {
  let parent = match destination.parent() {
    Some(parent) => parent,
    None => return Err(io::Error::other("destination has no parent directory")),
  };
  std::fs::create_dir_all(parent)?;
  let mut temp = tempfile::NamedTempFile::new_in(parent)?;
  response.copy_to(&mut temp).map_err(io::Error::other)?;
  temp.flush()?;
  Ok(temp)
}

fn hex_digest_file(algorithm: ChecksumAlgorithm, path: &Path) -> io::Result<String> {
  fn digest_of<D: Digest + io::Write>(file: &mut std::fs::File) -> io::Result<String> {
    let mut hasher = D::new();
    io::copy(file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
  }

  let mut file = std::fs::File::open(path)?;
  match algorithm {
    ChecksumAlgorithm::Sha224 => digest_of::<Sha224>(&mut file),
    ChecksumAlgorithm::Sha256 => digest_of::<Sha256>(&mut file),
    ChecksumAlgorithm::Sha384 => digest_of::<Sha384>(&mut file),
    ChecksumAlgorithm::Sha512 => digest_of::<Sha512>(&mut file),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

  fn download_requirement(url: &str, checksum: Option<Checksum>) -> Requirement {
    Requirement::new("DATA_FILE", RequirementKind::Download {
      url: url.to_string(),
      filename: "data.csv".to_string(),
      checksum,
      unzip: false,
    })
  }

  fn run_provide(
    requirement: &Requirement,
    project_dir: &std::path::Path,
    mode: ProvideMode,
  ) -> (EnvMap, Vec<String>, Vec<String>) {
    let provider = DownloadProvider;
    let mut environ = EnvMap::new();
    environ.insert(PROJECT_DIR_VAR.to_string(), project_dir.display().to_string());
    let mut local_state = LocalStateFile::load_for_directory(project_dir).unwrap();
    let config = provider.read_config(requirement, &environ, &local_state);
    let mut context = ProvideContext::new(&mut environ, &mut local_state, config, mode);
    provider.provide(requirement, &mut context);
    let (logs, errors) = context.into_logs_and_errors();
    (environ, logs, errors)
  }

  #[test]
  fn downloads_into_the_project_directory() {
    let mut server = mockito::Server::new();
    let mock = server
      .mock("GET", "/data.csv")
      .with_status(200)
      .with_body("hello")
      .create();
    let temp = tempfile::TempDir::new().unwrap();
    let requirement = download_requirement(&format!("{}/data.csv", server.url()), None);

    let (environ, _, errors) = run_provide(&requirement, temp.path(), ProvideMode::Provide);

    mock.assert();
    assert!(errors.is_empty(), "{:?}", errors);
    let destination = temp.path().join("data.csv");
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), "hello");
    assert_eq!(
      environ.get("DATA_FILE").map(String::as_str),
      Some(destination.display().to_string().as_str())
    );
  }

  #[test]
  fn reuses_a_previously_downloaded_file() {
    let temp = tempfile::TempDir::new().unwrap();
    std::fs::write(temp.path().join("data.csv"), "already here").unwrap();
    // Unreachable URL proves the network is never touched.
    let requirement = download_requirement("http://127.0.0.1:1/data.csv", None);

    let (environ, logs, errors) = run_provide(&requirement, temp.path(), ProvideMode::Provide);

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("Previously downloaded file located at "), "{}", logs[0]);
    assert!(environ.contains_key("DATA_FILE"));
  }

  #[test]
  fn bad_response_code_is_reported() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/data.csv").with_status(404).create();
    let temp = tempfile::TempDir::new().unwrap();
    let url = format!("{}/data.csv", server.url());
    let requirement = download_requirement(&url, None);

    let (environ, _, errors) = run_provide(&requirement, temp.path(), ProvideMode::Provide);

    assert_eq!(errors, [format!("Error downloading {}: response code 404", url)]);
    assert!(!environ.contains_key("DATA_FILE"));
    assert!(!temp.path().join("data.csv").exists());
  }

  #[test]
  fn connection_failure_is_reported() {
    let temp = tempfile::TempDir::new().unwrap();
    let url = "http://127.0.0.1:1/data.csv";
    let requirement = download_requirement(url, None);

    let (_, _, errors) = run_provide(&requirement, temp.path(), ProvideMode::Provide);

    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with(&format!("Error downloading {}: ", url)), "{}", errors[0]);
  }

  #[test]
  fn checksum_mismatch_discards_the_body() {
    let mut server = mockito::Server::new();
    server
      .mock("GET", "/data.csv")
      .with_status(200)
      .with_body("hello")
      .create();
    let temp = tempfile::TempDir::new().unwrap();
    let url = format!("{}/data.csv", server.url());
    let requirement = download_requirement(&url, Some(Checksum {
      algorithm: ChecksumAlgorithm::Sha256,
      value: "00".repeat(32),
    }));

    let (environ, _, errors) = run_provide(&requirement, temp.path(), ProvideMode::Provide);

    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with(&format!("Checksum mismatch for {}: ", url)), "{}", errors[0]);
    assert!(!temp.path().join("data.csv").exists());
    assert!(!environ.contains_key("DATA_FILE"));

    // The rejected body streamed into a temp file; nothing may be left of it.
    let leftovers: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
  }

  #[test]
  fn matching_checksum_accepts_the_body() {
    let mut server = mockito::Server::new();
    server
      .mock("GET", "/data.csv")
      .with_status(200)
      .with_body("hello")
      .create();
    let temp = tempfile::TempDir::new().unwrap();
    let url = format!("{}/data.csv", server.url());
    let requirement = download_requirement(&url, Some(Checksum {
      algorithm: ChecksumAlgorithm::Sha256,
      value: HELLO_SHA256.to_string(),
    }));

    let (environ, _, errors) = run_provide(&requirement, temp.path(), ProvideMode::Provide);

    assert!(errors.is_empty(), "{:?}", errors);
    assert!(temp.path().join("data.csv").exists());
    assert!(environ.contains_key("DATA_FILE"));
  }

  #[test]
  fn check_mode_never_touches_the_network_or_disk() {
    let temp = tempfile::TempDir::new().unwrap();
    let requirement = download_requirement("http://127.0.0.1:1/data.csv", None);

    let (environ, logs, errors) = run_provide(&requirement, temp.path(), ProvideMode::Check);

    assert!(logs.is_empty());
    assert!(errors.is_empty());
    assert!(!environ.contains_key("DATA_FILE"));
    assert!(!temp.path().join("data.csv").exists());
  }

  #[test]
  fn ambient_value_from_environ_skips_the_download() {
    let temp = tempfile::TempDir::new().unwrap();
    let requirement = download_requirement("http://127.0.0.1:1/data.csv", None);
    let provider = DownloadProvider;

    let mut environ = EnvMap::new();
    environ.insert(PROJECT_DIR_VAR.to_string(), temp.path().display().to_string());
    environ.insert("DATA_FILE".to_string(), "/elsewhere/data.csv".to_string());
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let config = provider.read_config(&requirement, &environ, &local_state);
    assert_eq!(config.get("source"), Some(&Value::from("environ")));

    let mut context = ProvideContext::new(&mut environ, &mut local_state, config, ProvideMode::Provide);
    provider.provide(&requirement, &mut context);
    let (_, errors) = context.into_logs_and_errors();

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(environ.get("DATA_FILE").map(String::as_str), Some("/elsewhere/data.csv"));
  }

  #[test]
  fn read_config_maps_unset_to_download() {
    let temp = tempfile::TempDir::new().unwrap();
    let requirement = download_requirement("http://example.com/data.csv", None);
    let local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();

    let config = DownloadProvider.read_config(&requirement, &EnvMap::new(), &local_state);
    assert_eq!(config.get("source"), Some(&Value::from("download")));
  }

  #[test]
  fn choosing_a_non_environ_source_clears_the_ambient_value() {
    let temp = tempfile::TempDir::new().unwrap();
    let requirement = download_requirement("http://example.com/data.csv", None);
    let mut local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();
    let mut environ = EnvMap::new();
    environ.insert("DATA_FILE".to_string(), "/stale/data.csv".to_string());

    let mut values = ProviderConfig::new();
    values.insert("source".to_string(), Value::from("download"));
    DownloadProvider.set_config_values(&requirement, &mut environ, &mut local_state, &values);

    assert!(!environ.contains_key("DATA_FILE"));
  }

  #[test]
  fn analyze_reports_an_existing_file() {
    let temp = tempfile::TempDir::new().unwrap();
    std::fs::write(temp.path().join("data.csv"), "x").unwrap();
    let requirement = download_requirement("http://example.com/data.csv", None);
    let local_state = LocalStateFile::load_for_directory(temp.path()).unwrap();

    let mut environ = EnvMap::new();
    environ.insert(PROJECT_DIR_VAR.to_string(), temp.path().display().to_string());
    let analysis = DownloadProvider.analyze(&requirement, &environ, &local_state);

    assert_eq!(analysis.existing_filename, Some(temp.path().join("data.csv")));
  }

  #[test]
  fn sha256_digest_matches_a_known_vector() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("hello.txt");
    std::fs::write(&path, "hello").unwrap();
    assert_eq!(hex_digest_file(ChecksumAlgorithm::Sha256, &path).unwrap(), HELLO_SHA256);
  }
}
