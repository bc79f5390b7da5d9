//! `rig add-service` / `rig remove-service`.

use std::path::Path;

use anyhow::Result;

use rigup_lib::environ::process_environ;
use rigup_lib::ops::{add_service, remove_service};
use rigup_lib::prepare::PrepareOptions;

use crate::output::print_success;

pub fn cmd_add_service(directory: &Path, service_type: &str, variable: Option<&str>) -> Result<()> {
  let mut project = super::load_project(directory)?;
  let environ = process_environ();
  add_service(&mut project, &environ, service_type, variable, PrepareOptions::default())?;
  print_success(&format!("Added service {} to the project.", service_type));
  Ok(())
}

pub fn cmd_remove_service(directory: &Path, name: &str) -> Result<()> {
  let mut project = super::load_project(directory)?;
  remove_service(&mut project, name)?;
  print_success(&format!("Removed service {} from the project.", name));
  Ok(())
}
