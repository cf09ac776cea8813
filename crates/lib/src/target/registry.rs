use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use tracing::debug;

use super::{PlatformGate, Target, TargetError};
use crate::context::TargetContext;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
  #[error("target '{0}' is already registered")]
  DuplicateTarget(String),

  #[error("unknown target '{name}'{}", dependency_of(.required_by))]
  UnknownTarget {
    name: String,
    required_by: Option<String>,
  },
}

pub(crate) fn dependency_of(required_by: &Option<String>) -> String {
  required_by
    .as_ref()
    .map(|t| format!(" (dependency of '{}')", t))
    .unwrap_or_default()
}

/// Collects targets during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
  targets: Vec<Target>,
  index: HashMap<String, usize>,
}

impl RegistryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a target built with [`Target::new`] and friends.
  pub fn add(&mut self, target: Target) -> Result<&mut Self, RegistryError> {
    if self.index.contains_key(target.name()) {
      return Err(RegistryError::DuplicateTarget(target.name().to_string()));
    }
    debug!(target = %target.name(), deps = ?target.dependencies(), "registered target");
    self.index.insert(target.name().to_string(), self.targets.len());
    self.targets.push(target);
    Ok(self)
  }

  /// Register a target from its parts.
  pub fn register<F, Fut>(
    &mut self,
    name: &str,
    dependencies: &[&str],
    gate: PlatformGate,
    body: F,
  ) -> Result<&mut Self, RegistryError>
  where
    F: Fn(TargetContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TargetError>> + Send + 'static,
  {
    self.add(Target::new(name, body).depends_on(dependencies).gated(gate))
  }

  /// Freeze the registry.
  ///
  /// Fails if any target depends on a name that was never registered.
  pub fn build(self) -> Result<TargetRegistry, RegistryError> {
    for target in &self.targets {
      if let Some(missing) = target.dependencies().iter().find(|d| !self.index.contains_key(*d)) {
        return Err(RegistryError::UnknownTarget {
          name: missing.clone(),
          required_by: Some(target.name().to_string()),
        });
      }
    }

    Ok(TargetRegistry {
      targets: self.targets,
      index: self.index,
    })
  }
}

/// Immutable set of declared targets.
#[derive(Debug)]
pub struct TargetRegistry {
  targets: Vec<Target>,
  index: HashMap<String, usize>,
}

impl TargetRegistry {
  pub fn builder() -> RegistryBuilder {
    RegistryBuilder::new()
  }

  pub fn get(&self, name: &str) -> Option<&Target> {
    self.index.get(name).map(|&i| &self.targets[i])
  }

  pub fn lookup(&self, name: &str) -> Result<&Target, RegistryError> {
    self.get(name).ok_or_else(|| RegistryError::UnknownTarget {
      name: name.to_string(),
      required_by: None,
    })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// Targets in registration order.
  pub fn iter(&self) -> impl Iterator<Item = &Target> {
    self.targets.iter()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}
