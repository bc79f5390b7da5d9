//! Requirements a project declares before it can run.
//!
//! A requirement is always "an environment variable must hold a usable
//! value"; the kind says what that value points at (a plain variable, a
//! provisioned environment, a downloaded file, a running service) and drives
//! which providers can satisfy it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::environ::EnvMap;

/// Hash algorithms accepted for download integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
  Sha224,
  Sha256,
  Sha384,
  Sha512,
}

impl ChecksumAlgorithm {
  pub const ALL: [ChecksumAlgorithm; 4] = [
    ChecksumAlgorithm::Sha224,
    ChecksumAlgorithm::Sha256,
    ChecksumAlgorithm::Sha384,
    ChecksumAlgorithm::Sha512,
  ];

  /// The manifest key / command-line name for this algorithm.
  pub fn as_str(self) -> &'static str {
    match self {
      ChecksumAlgorithm::Sha224 => "sha224",
      ChecksumAlgorithm::Sha256 => "sha256",
      ChecksumAlgorithm::Sha384 => "sha384",
      ChecksumAlgorithm::Sha512 => "sha512",
    }
  }
}

impl fmt::Display for ChecksumAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Error for a checksum algorithm name we don't recognize.
#[derive(Debug, Error)]
#[error("unknown checksum algorithm '{0}', expected one of: sha224, sha256, sha384, sha512")]
pub struct UnknownChecksumAlgorithm(pub String);

impl FromStr for ChecksumAlgorithm {
  type Err = UnknownChecksumAlgorithm;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "sha224" => Ok(ChecksumAlgorithm::Sha224),
      "sha256" => Ok(ChecksumAlgorithm::Sha256),
      "sha384" => Ok(ChecksumAlgorithm::Sha384),
      "sha512" => Ok(ChecksumAlgorithm::Sha512),
      _ => Err(UnknownChecksumAlgorithm(s.to_string())),
    }
  }
}

/// An expected hash for a downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
  pub algorithm: ChecksumAlgorithm,
  /// Lowercase hex digest.
  pub value: String,
}

/// What category of provider can satisfy a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
  EnvVar,
  ProjectEnv,
  Download,
  Service,
}

/// Kind-specific requirement data.
#[derive(Debug, Clone, PartialEq)]
pub enum RequirementKind {
  /// A plain environment variable, optionally with a default value.
  EnvVar { default: Option<String> },

  /// An environment provisioned inside the project directory.
  ProjectEnv {
    spec_name: String,
    packages: Vec<String>,
    channels: Vec<String>,
  },

  /// A file downloaded into the project directory.
  Download {
    url: String,
    filename: String,
    checksum: Option<Checksum>,
    unzip: bool,
  },

  /// A running service, located by a URL in the env var.
  Service { service_type: String },
}

impl RequirementKind {
  pub fn capability(&self) -> Capability {
    match self {
      RequirementKind::EnvVar { .. } => Capability::EnvVar,
      RequirementKind::ProjectEnv { .. } => Capability::ProjectEnv,
      RequirementKind::Download { .. } => Capability::Download,
      RequirementKind::Service { .. } => Capability::Service,
    }
  }
}

/// One thing the project needs before it can run.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
  /// The environment variable this requirement fills in.
  pub env_var: String,
  /// Optional author-supplied description, overrides the default title.
  pub description: Option<String>,
  pub kind: RequirementKind,
}

impl Requirement {
  pub fn new(env_var: impl Into<String>, kind: RequirementKind) -> Self {
    Self {
      env_var: env_var.into(),
      description: None,
      kind,
    }
  }

  pub fn capability(&self) -> Capability {
    self.kind.capability()
  }

  /// The declared default value, for plain variable requirements.
  pub fn default_value(&self) -> Option<&str> {
    match &self.kind {
      RequirementKind::EnvVar { default } => default.as_deref(),
      _ => None,
    }
  }

  /// Human-readable description, used in diagnostics.
  pub fn title(&self) -> String {
    if let Some(description) = &self.description {
      return description.clone();
    }
    match &self.kind {
      RequirementKind::EnvVar { .. } => format!("{} environment variable must be set", self.env_var),
      RequirementKind::ProjectEnv { .. } => "A provisioned environment inside the project directory".to_string(),
      RequirementKind::Download { .. } => {
        format!("A downloaded file which is referenced by {}", self.env_var)
      }
      RequirementKind::Service { service_type } => {
        format!("A running {} server, located by a URL set as {}", service_type, self.env_var)
      }
    }
  }

  /// Why the requirement is unmet given an environment, or `None` if met.
  ///
  /// This is a pure check against the environment and the filesystem. It
  /// never changes anything, so the engine can call it both to skip already
  /// satisfied requirements and to validate after providers run.
  pub fn why_not_provided(&self, environ: &EnvMap) -> Option<String> {
    let value = match environ.get(&self.env_var) {
      None => return Some(format!("Environment variable {} is not set.", self.env_var)),
      Some(value) if value.is_empty() => {
        return Some(format!("Environment variable {} is set to an empty string.", self.env_var));
      }
      Some(value) => value,
    };

    match &self.kind {
      RequirementKind::Download { .. } => {
        if Path::new(value).exists() {
          None
        } else {
          Some(format!("File not found: {}", value))
        }
      }
      RequirementKind::ProjectEnv { .. } => {
        if Path::new(value).is_dir() {
          None
        } else {
          Some(format!("'{}' does not look like a usable environment directory.", value))
        }
      }
      _ => None,
    }
  }

  /// Version-control ignore patterns for files this requirement puts inside
  /// the project directory.
  pub fn ignore_patterns(&self) -> Vec<String> {
    match &self.kind {
      RequirementKind::EnvVar { .. } => Vec::new(),
      RequirementKind::ProjectEnv { .. } => vec!["/envs/".to_string()],
      RequirementKind::Download { filename, .. } => vec![format!("/{}", filename)],
      RequirementKind::Service { .. } => vec!["/services/".to_string()],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn env_with(pairs: &[(&str, &str)]) -> EnvMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn unset_variable_is_not_provided() {
    let req = Requirement::new("DB_NAME", RequirementKind::EnvVar { default: None });
    assert_eq!(
      req.why_not_provided(&EnvMap::new()),
      Some("Environment variable DB_NAME is not set.".to_string())
    );
  }

  #[test]
  fn empty_variable_is_not_provided() {
    let req = Requirement::new("DB_NAME", RequirementKind::EnvVar { default: None });
    let environ = env_with(&[("DB_NAME", "")]);
    assert_eq!(
      req.why_not_provided(&environ),
      Some("Environment variable DB_NAME is set to an empty string.".to_string())
    );
  }

  #[test]
  fn set_variable_is_provided() {
    let req = Requirement::new("DB_NAME", RequirementKind::EnvVar { default: None });
    let environ = env_with(&[("DB_NAME", "mydb")]);
    assert_eq!(req.why_not_provided(&environ), None);
  }

  #[test]
  fn download_requires_the_file_to_exist() {
    let temp = tempfile::TempDir::new().unwrap();
    let existing = temp.path().join("data.csv");
    std::fs::write(&existing, "a,b\n").unwrap();

    let req = Requirement::new(
      "DATA_FILE",
      RequirementKind::Download {
        url: "http://example.com/data.csv".to_string(),
        filename: "data.csv".to_string(),
        checksum: None,
        unzip: false,
      },
    );

    let environ = env_with(&[("DATA_FILE", existing.to_str().unwrap())]);
    assert_eq!(req.why_not_provided(&environ), None);

    let missing = temp.path().join("gone.csv");
    let environ = env_with(&[("DATA_FILE", missing.to_str().unwrap())]);
    assert_eq!(
      req.why_not_provided(&environ),
      Some(format!("File not found: {}", missing.display()))
    );
  }

  #[test]
  fn project_env_requires_a_directory() {
    let temp = tempfile::TempDir::new().unwrap();
    let env_dir = temp.path().join("envs").join("default");
    std::fs::create_dir_all(&env_dir).unwrap();

    let req = Requirement::new(
      "PROJECT_ENV_PATH",
      RequirementKind::ProjectEnv {
        spec_name: "default".to_string(),
        packages: vec![],
        channels: vec![],
      },
    );

    let environ = env_with(&[("PROJECT_ENV_PATH", env_dir.to_str().unwrap())]);
    assert_eq!(req.why_not_provided(&environ), None);

    let file_path = temp.path().join("not_a_dir");
    std::fs::write(&file_path, "x").unwrap();
    let environ = env_with(&[("PROJECT_ENV_PATH", file_path.to_str().unwrap())]);
    assert!(req.why_not_provided(&environ).is_some());
  }

  #[test]
  fn description_overrides_default_title() {
    let mut req = Requirement::new("DB_NAME", RequirementKind::EnvVar { default: None });
    assert_eq!(req.title(), "DB_NAME environment variable must be set");

    req.description = Some("Name of the analytics database".to_string());
    assert_eq!(req.title(), "Name of the analytics database");
  }

  #[test]
  fn titles_mention_the_env_var() {
    let download = Requirement::new(
      "DATA_FILE",
      RequirementKind::Download {
        url: "http://example.com/d.csv".to_string(),
        filename: "d.csv".to_string(),
        checksum: None,
        unzip: false,
      },
    );
    assert_eq!(download.title(), "A downloaded file which is referenced by DATA_FILE");

    let service = Requirement::new(
      "REDIS_URL",
      RequirementKind::Service {
        service_type: "redis".to_string(),
      },
    );
    assert_eq!(service.title(), "A running redis server, located by a URL set as REDIS_URL");
  }

  #[test]
  fn capability_follows_kind() {
    let req = Requirement::new("X", RequirementKind::EnvVar { default: None });
    assert_eq!(req.capability(), Capability::EnvVar);

    let req = Requirement::new(
      "X",
      RequirementKind::Service {
        service_type: "redis".to_string(),
      },
    );
    assert_eq!(req.capability(), Capability::Service);
  }

  #[test]
  fn ignore_patterns_cover_project_files() {
    let download = Requirement::new(
      "DATA_FILE",
      RequirementKind::Download {
        url: "http://example.com/d.csv".to_string(),
        filename: "d.csv".to_string(),
        checksum: None,
        unzip: false,
      },
    );
    assert_eq!(download.ignore_patterns(), vec!["/d.csv".to_string()]);

    let service = Requirement::new(
      "REDIS_URL",
      RequirementKind::Service {
        service_type: "redis".to_string(),
      },
    );
    assert_eq!(service.ignore_patterns(), vec!["/services/".to_string()]);
  }

  #[test]
  fn checksum_algorithm_parse_and_display() {
    assert_eq!("sha256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
    assert_eq!(ChecksumAlgorithm::Sha512.to_string(), "sha512");
    assert!("md5".parse::<ChecksumAlgorithm>().is_err());
  }
}
