//! `rig add-packages` / `rig remove-packages`.
//!
//! Changes that affect the default environment spec re-provision it before
//! the manifest is saved; a package list that cannot be solved rolls back.

use std::path::Path;

use anyhow::Result;

use rigup_lib::environ::process_environ;
use rigup_lib::ops::{add_packages, remove_packages};
use rigup_lib::prepare::PrepareOptions;

use crate::output::print_success;

pub fn cmd_add_packages(
  directory: &Path,
  env_spec: Option<&str>,
  packages: &[String],
  channels: &[String],
) -> Result<()> {
  let mut project = super::load_project(directory)?;
  let environ = process_environ();
  add_packages(
    &mut project,
    &environ,
    env_spec,
    packages,
    channels,
    PrepareOptions::default(),
  )?;
  print_success(&format!("Added packages: {}.", packages.join(", ")));
  Ok(())
}

pub fn cmd_remove_packages(directory: &Path, env_spec: Option<&str>, packages: &[String]) -> Result<()> {
  let mut project = super::load_project(directory)?;
  let environ = process_environ();
  remove_packages(&mut project, &environ, env_spec, packages, PrepareOptions::default())?;
  print_success(&format!("Removed packages: {}.", packages.join(", ")));
  Ok(())
}
