//! `rig add-command` / `rig update-command` / `rig remove-command`.

use std::path::Path;

use anyhow::Result;

use rigup_lib::ops::{add_command, remove_command, update_command};

use crate::output::print_success;

pub fn cmd_add_command(directory: &Path, name: &str, command_type: &str, line: &str) -> Result<()> {
  let mut project = super::load_project(directory)?;
  add_command(&mut project, name, command_type, line)?;
  print_success(&format!("Added command '{}' to the project.", name));
  Ok(())
}

pub fn cmd_update_command(directory: &Path, name: &str, command_type: &str, line: &str) -> Result<()> {
  let mut project = super::load_project(directory)?;
  update_command(&mut project, name, command_type, line)?;
  print_success(&format!("Updated command '{}'.", name));
  Ok(())
}

pub fn cmd_remove_command(directory: &Path, name: &str) -> Result<()> {
  let mut project = super::load_project(directory)?;
  remove_command(&mut project, name)?;
  print_success(&format!("Removed command '{}' from the project.", name));
  Ok(())
}
