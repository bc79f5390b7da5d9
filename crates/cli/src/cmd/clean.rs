//! Implementation of the `rig clean` command.

use std::path::Path;

use anyhow::{Result, bail};

use rigup_lib::ops::clean;

use crate::output::{print_error, print_info, print_success};
use crate::prompts::confirm;

pub fn cmd_clean(directory: &Path, force: bool) -> Result<()> {
  let project = super::load_project(directory)?;

  if !confirm("Remove all provisioned environments and services?", force)? {
    print_info("Aborted.");
    return Ok(());
  }

  let result = clean(&project)?;
  for log in &result.logs {
    print_info(log);
  }
  for error in &result.errors {
    print_error(error);
  }
  if !result.is_success() {
    bail!("Unable to clean everything.");
  }
  print_success("Cleaned.");
  Ok(())
}
