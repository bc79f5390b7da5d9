//! Plan construction: flattening requirements against the provider registry.

use std::fmt;
use std::sync::Arc;

use crate::provider::{Provider, ProviderRegistry};
use crate::requirement::Requirement;

/// One unit of work for the prepare engine: a provider paired with the
/// requirement it should satisfy.
pub struct PlanEntry {
  pub provider: Arc<dyn Provider>,
  pub requirement: Requirement,
}

impl fmt::Debug for PlanEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PlanEntry")
      .field("provider", &self.provider.config_key())
      .field("requirement", &self.requirement.env_var)
      .finish()
  }
}

/// Flatten requirements into (provider, requirement) pairs.
///
/// Requirement declaration order is the outer order and provider
/// registration order the inner one; the engine executes the result front
/// to back. A requirement whose capability has no registered provider
/// contributes no entries and is left for validation to report.
pub fn build_plan(registry: &ProviderRegistry, requirements: &[Requirement]) -> Vec<PlanEntry> {
  let mut plan = Vec::new();
  for requirement in requirements {
    for provider in registry.providers_for(requirement.capability()) {
      plan.push(PlanEntry {
        provider: Arc::clone(provider),
        requirement: requirement.clone(),
      });
    }
  }
  plan
}
