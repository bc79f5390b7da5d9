//! Implementation of the `rig init` command.

use std::path::Path;

use anyhow::Result;

use rigup_lib::consts::PROJECT_FILENAME;
use rigup_lib::ops::init_project;

use crate::output::print_success;

pub fn cmd_init(directory: &Path, name: Option<&str>) -> Result<()> {
  let project = init_project(directory, name)?;
  print_success(&format!(
    "Created {} in {}",
    PROJECT_FILENAME,
    project.directory().display()
  ));
  Ok(())
}
