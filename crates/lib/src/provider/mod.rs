//! Providers: the capabilities that satisfy requirements.
//!
//! Each requirement kind has one shipped provider:
//! - [`EnvVarProvider`] for plain environment variables
//! - [`ProjectEnvProvider`] for the provisioned project environment
//! - [`DownloadProvider`] for downloaded files
//! - [`RedisProvider`] for the redis service
//!
//! [`ProviderRegistry::default`] wires them all up; tests build registries
//! with stub providers via [`ProviderRegistry::empty`].

pub mod download;
pub mod env_var;
pub mod project_env;
pub mod registry;
pub mod service;
pub mod types;

pub use download::DownloadProvider;
pub use env_var::EnvVarProvider;
pub use project_env::{CondaEnvTool, EnvTool, EnvToolError, ProjectEnvProvider};
pub use registry::ProviderRegistry;
pub use service::{RedisProvider, DEFAULT_REDIS_PORT};
pub use types::{provider_config_path, Analysis, Provider, ProvideContext, ProvideMode, ProviderConfig};
