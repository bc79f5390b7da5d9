//! Well-known names shared across the crate.

/// Project manifest filename, relative to the project directory.
pub const PROJECT_FILENAME: &str = "rigup.yml";

/// Per-machine state filename, relative to the project directory.
pub const LOCAL_STATE_FILENAME: &str = "rigup-local.yml";

/// Directory holding provisioned environments, relative to the project directory.
pub const ENVS_DIRNAME: &str = "envs";

/// Directory holding service working files, relative to the project directory.
pub const SERVICES_DIRNAME: &str = "services";

/// Environment variable set to the project directory during preparation.
pub const PROJECT_DIR_VAR: &str = "PROJECT_DIR";

/// Environment variable set to the provisioned environment directory.
pub const PROJECT_ENV_VAR: &str = "PROJECT_ENV_PATH";
