//! `rig add-download` / `rig remove-download`.
//!
//! Adding a download runs a restricted prepare first, so a URL that cannot
//! actually be fetched never lands in the manifest.

use std::path::Path;

use anyhow::{Result, bail};

use rigup_lib::environ::process_environ;
use rigup_lib::ops::{add_download, remove_download};
use rigup_lib::prepare::PrepareOptions;
use rigup_lib::requirement::Checksum;

use crate::output::print_success;

pub fn cmd_add_download(
  directory: &Path,
  env_var: &str,
  url: &str,
  filename: Option<&str>,
  hash_algorithm: Option<&str>,
  hash_value: Option<&str>,
) -> Result<()> {
  let checksum = match (hash_algorithm, hash_value) {
    (Some(algorithm), Some(value)) => {
      if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Checksum value '{}' is not a hex digest.", value);
      }
      Some(Checksum {
        algorithm: algorithm.parse()?,
        value: value.to_ascii_lowercase(),
      })
    }
    _ => None,
  };

  let mut project = super::load_project(directory)?;
  let environ = process_environ();
  add_download(
    &mut project,
    &environ,
    env_var,
    url,
    filename,
    checksum,
    PrepareOptions::default(),
  )?;
  print_success(&format!("Added {} to the project file.", url));
  Ok(())
}

pub fn cmd_remove_download(directory: &Path, env_var: &str) -> Result<()> {
  let mut project = super::load_project(directory)?;
  remove_download(&mut project, env_var)?;
  print_success(&format!("Removed {} from the project.", env_var));
  Ok(())
}
