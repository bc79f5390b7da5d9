//! Environment snapshots.
//!
//! Preparation never touches the process environment. Callers take one
//! snapshot up front and thread it through every operation, which keeps the
//! library deterministic and easy to test.

use std::collections::BTreeMap;

/// An environment snapshot: variable names mapped to values.
pub type EnvMap = BTreeMap<String, String>;

/// Snapshot the current process environment.
///
/// This is the only place the crate reads `std::env::vars`.
pub fn process_environ() -> EnvMap {
  std::env::vars().collect()
}
