//! In-place editing support for YAML files.
//!
//! A [`YamlFile`] holds the parsed top-level mapping of a YAML file plus a
//! dirty flag. Values are addressed by a path of nested keys, so
//! `["runtime", "REDIS_URL", "providers", "redis"]` reaches into:
//!
//! ```yaml
//! runtime:
//!   REDIS_URL:
//!     providers:
//!       redis:
//!         scope: find_all
//! ```
//!
//! Saving is atomic (write to temp, then rename) and skipped entirely when
//! nothing changed, so loading and re-saving a file never rewrites it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when reading or writing a tracked YAML file.
#[derive(Debug, Error)]
pub enum YamlFileError {
  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: io::Error },

  #[error("failed to parse {}: {source}", path.display())]
  Parse { path: PathBuf, source: serde_yaml::Error },

  #[error("{} does not contain a YAML mapping at the top level", path.display())]
  NotMapping { path: PathBuf },

  #[error("failed to serialize {}: {source}", path.display())]
  Serialize { path: PathBuf, source: serde_yaml::Error },

  #[error("failed to write {}: {source}", path.display())]
  Write { path: PathBuf, source: io::Error },

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: io::Error },
}

/// A YAML file that can be read, edited by key path, and saved atomically.
#[derive(Debug, Clone)]
pub struct YamlFile {
  path: PathBuf,
  root: Mapping,
  dirty: bool,
}

impl YamlFile {
  /// Load a YAML file from disk.
  ///
  /// A missing file loads as an empty mapping, as does a file containing only
  /// `null`. Any other non-mapping top level is an error.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self, YamlFileError> {
    let path = path.into();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "file not found, starting empty");
        return Ok(Self {
          path,
          root: Mapping::new(),
          dirty: false,
        });
      }
      Err(source) => return Err(YamlFileError::Read { path, source }),
    };

    let value: Value = if content.trim().is_empty() {
      Value::Null
    } else {
      serde_yaml::from_str(&content).map_err(|source| YamlFileError::Parse { path: path.clone(), source })?
    };

    let root = match value {
      Value::Null => Mapping::new(),
      Value::Mapping(mapping) => mapping,
      _ => return Err(YamlFileError::NotMapping { path }),
    };

    Ok(Self {
      path,
      root,
      dirty: false,
    })
  }

  /// Path this file loads from and saves to.
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The top-level mapping.
  pub fn root(&self) -> &Mapping {
    &self.root
  }

  /// Whether there are edits not yet written to disk.
  pub fn has_unsaved_changes(&self) -> bool {
    self.dirty
  }

  /// Look up the value at a path of nested keys.
  pub fn get_value(&self, path: &[&str]) -> Option<&Value> {
    let mut iter = path.iter();
    let first = iter.next()?;
    let mut current = self.root.get(*first)?;
    for segment in iter {
      current = current.get(*segment)?;
    }
    Some(current)
  }

  /// Set the value at a path of nested keys.
  ///
  /// Intermediate mappings are created as needed; an intermediate scalar or
  /// sequence in the way is replaced by a mapping.
  pub fn set_value(&mut self, path: &[&str], value: Value) {
    if path.is_empty() {
      return;
    }
    set_in_mapping(&mut self.root, path, value);
    self.dirty = true;
  }

  /// Remove the value at a path of nested keys, if present.
  ///
  /// Only marks the file dirty when something was actually removed.
  pub fn unset_value(&mut self, path: &[&str]) {
    if unset_in_mapping(&mut self.root, path) {
      self.dirty = true;
    }
  }

  /// Write the file to disk if there are unsaved changes.
  pub fn save(&mut self) -> Result<(), YamlFileError> {
    if !self.dirty {
      debug!(path = %self.path.display(), "no unsaved changes, skipping save");
      return Ok(());
    }

    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent).map_err(|source| YamlFileError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let content = serde_yaml::to_string(&self.root).map_err(|source| YamlFileError::Serialize {
      path: self.path.clone(),
      source,
    })?;

    // Write atomically: write to temp file, then rename
    let mut temp_name = self.path.clone().into_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, &content).map_err(|source| YamlFileError::Write {
      path: self.path.clone(),
      source,
    })?;
    fs::rename(&temp_path, &self.path).map_err(|source| YamlFileError::Write {
      path: self.path.clone(),
      source,
    })?;

    self.dirty = false;
    info!(path = %self.path.display(), "file saved");
    Ok(())
  }

  /// Throw away in-memory edits and re-read the file from disk.
  pub fn reload(&mut self) -> Result<(), YamlFileError> {
    let fresh = Self::load(self.path.clone())?;
    self.root = fresh.root;
    self.dirty = false;
    Ok(())
  }
}

fn set_in_mapping(mapping: &mut Mapping, path: &[&str], value: Value) {
  match path {
    [] => {}
    [last] => {
      mapping.insert(Value::String((*last).to_string()), value);
    }
    [first, rest @ ..] => {
      let entry = mapping
        .entry(Value::String((*first).to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
      if !entry.is_mapping() {
        *entry = Value::Mapping(Mapping::new());
      }
      if let Some(child) = entry.as_mapping_mut() {
        set_in_mapping(child, rest, value);
      }
    }
  }
}

fn unset_in_mapping(mapping: &mut Mapping, path: &[&str]) -> bool {
  match path {
    [] => false,
    [last] => mapping.remove(*last).is_some(),
    [first, rest @ ..] => match mapping.get_mut(*first).and_then(Value::as_mapping_mut) {
      Some(child) => unset_in_mapping(child, rest),
      None => false,
    },
  }
}

/// Render a scalar value the way manifest authors expect env var values to
/// read: strings as-is, numbers and booleans via their YAML form.
pub(crate) fn yaml_scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}
