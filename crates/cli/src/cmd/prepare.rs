//! Implementation of the `rig prepare` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};
use tracing::debug;

use rigup_lib::environ::{EnvMap, process_environ};
use rigup_lib::manifest::Project;
use rigup_lib::prepare::{PrepareOptions, PrepareResult, UiMode, prepare};

use crate::output::{format_duration, print_error, print_info, print_success, print_warning};
use crate::prompts::TextConfigurer;

pub fn cmd_prepare(directory: &Path, mode: UiMode) -> Result<()> {
  let project = super::load_project(directory)?;
  let mut environ = process_environ();

  let start = Instant::now();
  let result = run_prepare(&project, &mut environ, mode)?;
  if !result.success {
    for unmet in &result.unmet {
      print_warning(&format!("{}  ({})", unmet.title, unmet.reason));
    }
    bail!("Unable to prepare the project.");
  }

  for requirement in &project.requirements {
    if let Some(value) = environ.get(&requirement.env_var) {
      print_info(&format!("{}={}", requirement.env_var, value));
    }
  }
  print_success(&format!("Project prepared in {}.", format_duration(start.elapsed())));
  Ok(())
}

/// Run the prepare pipeline with CLI reporting: logs first, then errors,
/// exactly as collected. Shared with `rig run`.
pub(crate) fn run_prepare(project: &Project, environ: &mut EnvMap, mode: UiMode) -> Result<PrepareResult> {
  let options = PrepareOptions {
    mode,
    configurer: match mode {
      UiMode::Text => Some(Box::new(TextConfigurer)),
      _ => None,
    },
    ..PrepareOptions::default()
  };

  let result = prepare(project, environ, options)?;
  debug!(success = result.success, unmet = result.unmet.len(), "prepare finished");
  for log in &result.logs {
    print_info(log);
  }
  for error in &result.errors {
    print_error(error);
  }
  Ok(result)
}
