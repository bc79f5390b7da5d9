use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rigup_lib::prepare::UiMode;

mod cmd;
mod output;
mod prompts;

use cmd::{
  cmd_add_command, cmd_add_download, cmd_add_packages, cmd_add_service, cmd_add_variable, cmd_clean,
  cmd_init, cmd_prepare, cmd_remove_command, cmd_remove_download, cmd_remove_packages,
  cmd_remove_service, cmd_remove_variable, cmd_run, cmd_status, cmd_unprepare, cmd_update_command,
};

/// rigup - reproducible project environments
#[derive(Parser)]
#[command(name = "rig")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project directory to operate on
  #[arg(long, global = true, default_value = ".")]
  directory: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create a new project
  Init {
    /// Project name (defaults to the directory name)
    #[arg(long)]
    name: Option<String>,
  },

  /// Provision everything the project needs to run
  Prepare {
    /// UI mode: non-interactive, text, or browser
    #[arg(long)]
    mode: Option<String>,
  },

  /// Shut down services started by a previous prepare
  Unprepare,

  /// Unprepare and delete provisioned files (envs/, services/)
  Clean {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    force: bool,
  },

  /// Show each requirement and whether it is currently satisfied
  Status {
    /// Emit machine-readable JSON
    #[arg(long)]
    json: bool,
  },

  /// Prepare the project, then run one of its commands
  Run {
    /// Command name from the manifest
    #[arg(default_value = "default")]
    command: String,

    /// UI mode: non-interactive, text, or browser
    #[arg(long)]
    mode: Option<String>,
  },

  /// Declare a variable requirement
  AddVariable {
    /// Environment variable name
    name: String,

    /// Default value recorded in the manifest
    #[arg(long)]
    default: Option<String>,
  },

  /// Remove a variable declaration (and any locally stored value)
  RemoveVariable {
    name: String,
  },

  /// Declare a download requirement and verify it can be fetched
  AddDownload {
    /// Environment variable that will hold the downloaded file's path
    env_var: String,

    url: String,

    /// Destination filename inside the project directory
    #[arg(long)]
    filename: Option<String>,

    /// Checksum algorithm: sha224, sha256, sha384, or sha512
    #[arg(long, requires = "hash_value")]
    hash_algorithm: Option<String>,

    /// Expected hex digest of the downloaded file
    #[arg(long, requires = "hash_algorithm")]
    hash_value: Option<String>,
  },

  /// Remove a download declaration and its downloaded file
  RemoveDownload {
    env_var: String,
  },

  /// Declare a service requirement and verify it can be started
  AddService {
    /// Service type (currently: redis)
    service_type: String,

    /// Environment variable to hold the service URL (defaults to {TYPE}_URL)
    #[arg(long)]
    variable: Option<String>,
  },

  /// Remove a service, shutting it down first
  RemoveService {
    /// Service type or environment variable name
    name: String,
  },

  /// Add packages to an environment spec and re-provision it
  AddPackages {
    #[arg(required = true)]
    packages: Vec<String>,

    /// Environment spec to update (defaults to the shared lists)
    #[arg(long)]
    env_spec: Option<String>,

    /// Package channel to add alongside the packages
    #[arg(long = "channel")]
    channels: Vec<String>,
  },

  /// Remove packages from an environment spec
  RemovePackages {
    #[arg(required = true)]
    packages: Vec<String>,

    /// Environment spec to update (defaults to every spec)
    #[arg(long)]
    env_spec: Option<String>,
  },

  /// Add a named command to the manifest
  AddCommand {
    name: String,

    /// The shell line to run
    line: String,

    /// Command type: unix or windows
    #[arg(long = "type", default_value = "unix")]
    command_type: String,
  },

  /// Replace the line of an existing command
  UpdateCommand {
    name: String,
    line: String,

    /// Command type: unix or windows
    #[arg(long = "type", default_value = "unix")]
    command_type: String,
  },

  /// Remove a named command
  RemoveCommand {
    name: String,
  },
}

/// Resolve the UI mode: an explicit flag wins, otherwise prompt only when
/// stdin is a terminal.
fn resolve_mode(flag: Option<&str>) -> Result<UiMode> {
  match flag {
    Some(text) => Ok(text.parse()?),
    None if std::io::stdin().is_terminal() => Ok(UiMode::Text),
    None => Ok(UiMode::NonInteractive),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .without_time()
    .init();

  let cli = Cli::parse();
  let dir = cli.directory;

  match cli.command {
    Commands::Init { name } => cmd_init(&dir, name.as_deref()),
    Commands::Prepare { mode } => cmd_prepare(&dir, resolve_mode(mode.as_deref())?),
    Commands::Unprepare => cmd_unprepare(&dir),
    Commands::Clean { force } => cmd_clean(&dir, force),
    Commands::Status { json } => cmd_status(&dir, json),
    Commands::Run { command, mode } => cmd_run(&dir, &command, resolve_mode(mode.as_deref())?),
    Commands::AddVariable { name, default } => cmd_add_variable(&dir, &name, default.as_deref()),
    Commands::RemoveVariable { name } => cmd_remove_variable(&dir, &name),
    Commands::AddDownload {
      env_var,
      url,
      filename,
      hash_algorithm,
      hash_value,
    } => cmd_add_download(
      &dir,
      &env_var,
      &url,
      filename.as_deref(),
      hash_algorithm.as_deref(),
      hash_value.as_deref(),
    ),
    Commands::RemoveDownload { env_var } => cmd_remove_download(&dir, &env_var),
    Commands::AddService { service_type, variable } => {
      cmd_add_service(&dir, &service_type, variable.as_deref())
    }
    Commands::RemoveService { name } => cmd_remove_service(&dir, &name),
    Commands::AddPackages {
      packages,
      env_spec,
      channels,
    } => cmd_add_packages(&dir, env_spec.as_deref(), &packages, &channels),
    Commands::RemovePackages { packages, env_spec } => {
      cmd_remove_packages(&dir, env_spec.as_deref(), &packages)
    }
    Commands::AddCommand {
      name,
      line,
      command_type,
    } => cmd_add_command(&dir, &name, &command_type, &line),
    Commands::UpdateCommand {
      name,
      line,
      command_type,
    } => cmd_update_command(&dir, &name, &command_type, &line),
    Commands::RemoveCommand { name } => cmd_remove_command(&dir, &name),
  }
}
