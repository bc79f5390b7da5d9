//! Implementation of the `rig unprepare` command.

use std::path::Path;

use anyhow::Result;

use rigup_lib::prepare::unprepare;

use crate::output::{print_info, print_success};

pub fn cmd_unprepare(directory: &Path) -> Result<()> {
  let project = super::load_project(directory)?;
  let result = unprepare(&project)?;
  for log in &result.logs {
    print_info(log);
  }
  print_success("Services shut down.");
  Ok(())
}
