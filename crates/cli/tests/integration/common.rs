//! Shared test helpers for CLI integration tests.

use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment: a temp directory holding one project.
pub struct TestEnv {
  temp: TempDir,
}

impl TestEnv {
  /// Create a project from manifest text.
  ///
  /// Also pre-creates `envs/default`, so projects that declare no packages
  /// prepare without reaching for the environment tool.
  pub fn with_manifest(manifest: &str) -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("rigup.yml"), manifest).unwrap();
    std::fs::create_dir_all(temp.path().join("envs").join("default")).unwrap();
    Self { temp }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// The manifest as currently on disk.
  pub fn manifest(&self) -> String {
    std::fs::read_to_string(self.path().join("rigup.yml")).unwrap()
  }

  /// The local state file as currently on disk, or empty if absent.
  pub fn local_state(&self) -> String {
    std::fs::read_to_string(self.path().join("rigup-local.yml")).unwrap_or_default()
  }

  /// Get a pre-configured Command for the rig binary, pointed at this
  /// project.
  pub fn rig_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("rig");
    cmd.arg("--directory").arg(self.path());
    cmd
  }
}
