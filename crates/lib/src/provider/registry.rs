//! Maps requirement capabilities to the providers that can satisfy them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::provider::download::DownloadProvider;
use crate::provider::env_var::EnvVarProvider;
use crate::provider::project_env::ProjectEnvProvider;
use crate::provider::service::RedisProvider;
use crate::provider::types::Provider;
use crate::requirement::Capability;

/// Registry of available providers, keyed by the capability they serve.
///
/// Registration order is preserved per capability and determines plan order.
pub struct ProviderRegistry {
  providers: BTreeMap<Capability, Vec<Arc<dyn Provider>>>,
}

impl ProviderRegistry {
  /// A registry with no providers at all. Useful in tests.
  pub fn empty() -> Self {
    Self { providers: BTreeMap::new() }
  }

  pub fn register(&mut self, capability: Capability, provider: Arc<dyn Provider>) {
    self.providers.entry(capability).or_default().push(provider);
  }

  /// All registered providers for a capability, in registration order.
  pub fn providers_for(&self, capability: Capability) -> &[Arc<dyn Provider>] {
    match self.providers.get(&capability) {
      Some(providers) => providers,
      None => &[],
    }
  }
}

/// The shipped registry: one provider per requirement kind.
impl Default for ProviderRegistry {
  fn default() -> Self {
    let mut registry = Self::empty();
    registry.register(Capability::EnvVar, Arc::new(EnvVarProvider));
    registry.register(Capability::ProjectEnv, Arc::new(ProjectEnvProvider::default()));
    registry.register(Capability::Download, Arc::new(DownloadProvider));
    registry.register(Capability::Service, Arc::new(RedisProvider::default()));
    registry
  }
}
