//! `rig add-variable` / `rig remove-variable`.

use std::path::Path;

use anyhow::Result;

use rigup_lib::ops::{add_variables, remove_variables};

use crate::output::print_success;

pub fn cmd_add_variable(directory: &Path, name: &str, default: Option<&str>) -> Result<()> {
  let mut project = super::load_project(directory)?;
  add_variables(&mut project, &[(name.to_string(), default.map(str::to_string))])?;
  print_success(&format!("Added variable {} to the project.", name));
  Ok(())
}

pub fn cmd_remove_variable(directory: &Path, name: &str) -> Result<()> {
  let mut project = super::load_project(directory)?;
  remove_variables(&mut project, &[name.to_string()])?;
  print_success(&format!("Removed variable {} from the project.", name));
  Ok(())
}
