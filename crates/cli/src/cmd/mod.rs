//! One module per command family.

use std::path::Path;

use anyhow::{Context, Result};
use rigup_lib::manifest::Project;

mod clean;
mod command;
mod download;
mod init;
mod packages;
mod prepare;
mod run;
mod service;
mod status;
mod unprepare;
mod variable;

pub use clean::cmd_clean;
pub use command::{cmd_add_command, cmd_remove_command, cmd_update_command};
pub use download::{cmd_add_download, cmd_remove_download};
pub use init::cmd_init;
pub use packages::{cmd_add_packages, cmd_remove_packages};
pub use prepare::cmd_prepare;
pub use run::cmd_run;
pub use service::{cmd_add_service, cmd_remove_service};
pub use status::cmd_status;
pub use unprepare::cmd_unprepare;
pub use variable::{cmd_add_variable, cmd_remove_variable};

/// Load the project for a command, with the directory in the error.
pub(crate) fn load_project(directory: &Path) -> Result<Project> {
  Project::load(directory).with_context(|| format!("Failed to load project in {}", directory.display()))
}
