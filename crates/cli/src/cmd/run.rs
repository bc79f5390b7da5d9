//! Implementation of the `rig run` command.
//!
//! Prepares the project, then runs the named manifest command with the
//! prepared environment. The child's exit code becomes ours.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

use rigup_lib::prepare::UiMode;

use crate::output::print_warning;

pub fn cmd_run(directory: &Path, command_name: &str, mode: UiMode) -> Result<()> {
  let project = super::load_project(directory)?;
  let command = match project.find_command(command_name) {
    Some(command) => command.clone(),
    None => bail!("Command '{}' not found in the project file.", command_name),
  };
  let line = match command.line_for_current_platform() {
    Some(line) => line.to_string(),
    None => bail!("Command '{}' is not runnable on this platform.", command_name),
  };

  let mut environ = rigup_lib::environ::process_environ();
  let result = super::prepare::run_prepare(&project, &mut environ, mode)?;
  if !result.success {
    for unmet in &result.unmet {
      print_warning(&format!("{}  ({})", unmet.title, unmet.reason));
    }
    bail!("Unable to prepare the project.");
  }

  let status = shell_command(&line)
    .current_dir(project.directory())
    .env_clear()
    .envs(&environ)
    .status()
    .with_context(|| format!("Failed to run '{}'", line))?;

  match status.code() {
    Some(0) => Ok(()),
    Some(code) => std::process::exit(code),
    None => bail!("Command '{}' was terminated by a signal.", command_name),
  }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
  let mut command = Command::new("/bin/sh");
  command.arg("-c").arg(line);
  command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
  let mut command = Command::new("cmd");
  command.arg("/C").arg(line);
  command
}
