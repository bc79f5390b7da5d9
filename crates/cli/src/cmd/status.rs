//! Status command implementation.
//!
//! Displays each requirement and whether the current environment already
//! satisfies it, without running any provider.

use std::path::Path;

use anyhow::{Result, bail};

use rigup_lib::environ::process_environ;

use crate::output::{print_error, print_json, print_stat, print_success, print_warning, symbols};

pub fn cmd_status(directory: &Path, json: bool) -> Result<()> {
  let project = super::load_project(directory)?;

  if !project.problems.is_empty() {
    for problem in &project.problems {
      print_error(problem);
    }
    bail!("The project file has problems.");
  }

  let environ = process_environ();
  let statuses: Vec<(String, String, Option<String>)> = project
    .requirements
    .iter()
    .map(|requirement| {
      (
        requirement.env_var.clone(),
        requirement.title(),
        requirement.why_not_provided(&environ),
      )
    })
    .collect();

  if json {
    let requirements: Vec<_> = statuses
      .iter()
      .map(|(env_var, title, reason)| {
        serde_json::json!({
          "env_var": env_var,
          "title": title,
          "satisfied": reason.is_none(),
          "reason": reason,
        })
      })
      .collect();
    let commands: Vec<&str> = project.commands.iter().map(|c| c.name.as_str()).collect();
    let json_output = serde_json::json!({
      "name": project.name,
      "directory": project.directory().display().to_string(),
      "requirements": requirements,
      "commands": commands,
    });
    print_json(&json_output)?;
    return Ok(());
  }

  print_success(&format!("Project: {}", project.name));
  print_stat("Directory", &project.directory().display().to_string());
  println!();
  for (env_var, title, reason) in &statuses {
    match reason {
      None => print_success(&format!("{}  {} {}", title, symbols::ARROW, env_var)),
      Some(reason) => print_warning(&format!("{}  ({})", title, reason)),
    }
  }
  if !project.commands.is_empty() {
    println!();
    println!("Commands:");
    for command in &project.commands {
      match command.line_for_current_platform() {
        Some(line) => print_stat(&command.name, line),
        None => print_stat(&command.name, "(not runnable on this platform)"),
      }
    }
  }
  Ok(())
}
