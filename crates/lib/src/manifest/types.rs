//! Public manifest types.
//!
//! These are the parsed, validated shapes the rest of the crate consumes.
//! `Project::recompute` builds them from the raw YAML tree, collecting
//! problems instead of failing on the first malformed entry.

/// Service types the shipped provider registry knows how to start.
pub const KNOWN_SERVICE_TYPES: [&str; 1] = ["redis"];

/// A named set of packages and channels describing one provisionable
/// environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSpec {
  pub name: String,
  /// Package specs, global `packages:` entries folded in first.
  pub packages: Vec<String>,
  /// Channels, global `channels:` entries folded in first.
  pub channels: Vec<String>,
  pub description: Option<String>,
}

/// A named command from the manifest's `commands:` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectCommand {
  pub name: String,
  pub unix: Option<String>,
  pub windows: Option<String>,
  pub description: Option<String>,
  pub env_spec: Option<String>,
}

impl ProjectCommand {
  /// The shell line to run on the current platform.
  ///
  /// Windows falls back to the unix line when no windows line is declared.
  pub fn line_for_current_platform(&self) -> Option<&str> {
    if cfg!(windows) {
      self.windows.as_deref().or(self.unix.as_deref())
    } else {
      self.unix.as_deref()
    }
  }
}
