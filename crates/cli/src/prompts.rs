//! Terminal prompts: confirmation and the text-mode configure step.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, bail};
use serde_yaml::Value;

use rigup_lib::environ::EnvMap;
use rigup_lib::local_state::LocalStateFile;
use rigup_lib::plan::PlanEntry;
use rigup_lib::prepare::Configurer;
use rigup_lib::provider::ProviderConfig;
use rigup_lib::requirement::Capability;

pub fn confirm(message: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Cannot prompt for confirmation in non-interactive mode. Use --force to proceed.");
  }

  write!(io::stderr(), "{} [y/N] ", message)?;
  io::stderr().flush()?;

  let mut input = String::new();
  io::stdin().read_line(&mut input)?;

  Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// The text-mode configure step: before the plan runs, ask on the terminal
/// for variable values that nothing would otherwise supply. Answers are
/// stored through the provider, so they persist in local state for the
/// next run; an empty answer leaves the requirement for the plan to report.
pub struct TextConfigurer;

impl Configurer for TextConfigurer {
  fn configure(
    &mut self,
    plan: &[PlanEntry],
    environ: &mut EnvMap,
    local_state: &mut LocalStateFile,
  ) -> io::Result<()> {
    let stdin = io::stdin();
    configure_plan(plan, environ, local_state, &mut stdin.lock(), &mut io::stderr())
  }
}

fn configure_plan<R: BufRead, W: Write>(
  plan: &[PlanEntry],
  environ: &mut EnvMap,
  local_state: &mut LocalStateFile,
  input: &mut R,
  output: &mut W,
) -> io::Result<()> {
  for entry in plan {
    // Only plain variables take a typed-in value.
    if entry.requirement.capability() != Capability::EnvVar {
      continue;
    }
    if entry.requirement.why_not_provided(environ).is_none() {
      continue;
    }
    let config = entry.provider.read_config(&entry.requirement, environ, local_state);
    if config.get("value").is_some() || entry.requirement.default_value().is_some() {
      continue;
    }

    write!(output, "Value for {}: ", entry.requirement.env_var)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    if answer.is_empty() {
      continue;
    }

    let mut values = ProviderConfig::new();
    values.insert("value".to_string(), Value::from(answer));
    entry
      .provider
      .set_config_values(&entry.requirement, environ, local_state, &values);
  }
  Ok(())
}
