//! Dependency resolution for requested targets.
//!
//! The resolver expands the requested roots into every target they
//! transitively depend on and orders them so each dependency precedes its
//! dependents. Each target appears exactly once, which is what makes a run
//! execute shared dependencies only once.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::types::ResolveError;
use crate::target::{Target, TargetRegistry};

/// Visit state of a target during the depth-first walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
  InProgress,
  Done,
}

/// Targets to run, dependencies first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
  /// Requested roots, deduplicated, in the order given.
  pub roots: Vec<String>,
  /// Every target reachable from the roots.
  pub order: Vec<String>,
}

impl ResolvedOrder {
  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn position(&self, name: &str) -> Option<usize> {
    self.order.iter().position(|n| n == name)
  }
}

/// Depth-first resolver over a frozen registry.
///
/// Dependencies are visited in declared order and roots in the order given,
/// so a fixed registry and root list always yield the same sequence.
pub struct GraphResolver<'r> {
  registry: &'r TargetRegistry,
  state: HashMap<&'r str, VisitState>,
  /// Targets currently on the DFS stack, used to name a cycle.
  path: Vec<&'r str>,
  order: Vec<String>,
}

impl<'r> GraphResolver<'r> {
  pub fn new(registry: &'r TargetRegistry) -> Self {
    Self {
      registry,
      state: HashMap::new(),
      path: Vec::new(),
      order: Vec::new(),
    }
  }

  /// Resolve `roots` into a dependency-first order.
  pub fn resolve<S: AsRef<str>>(mut self, roots: &[S]) -> Result<ResolvedOrder, ResolveError> {
    if roots.is_empty() {
      return Err(ResolveError::NoTargets);
    }

    let mut unique_roots: Vec<String> = Vec::with_capacity(roots.len());
    for root in roots {
      let root = root.as_ref();
      if !unique_roots.iter().any(|r| r == root) {
        unique_roots.push(root.to_string());
      }
    }

    for root in &unique_roots {
      let target = lookup(self.registry, root)?;
      self.visit(target.name())?;
    }

    debug!(roots = ?unique_roots, order = ?self.order, "resolved targets");

    Ok(ResolvedOrder {
      roots: unique_roots,
      order: self.order,
    })
  }

  fn visit(&mut self, name: &'r str) -> Result<(), ResolveError> {
    match self.state.get(name) {
      Some(VisitState::Done) => return Ok(()),
      Some(VisitState::InProgress) => return Err(self.cycle_error(name)),
      None => {}
    }

    let registry = self.registry;
    let target = registry.get(name).ok_or_else(|| ResolveError::UnknownTarget {
      name: name.to_string(),
      required_by: self.path.last().map(|p| p.to_string()),
    })?;

    self.state.insert(target.name(), VisitState::InProgress);
    self.path.push(target.name());

    for dependency in target.dependencies() {
      let dep = registry.get(dependency).ok_or_else(|| ResolveError::UnknownTarget {
        name: dependency.clone(),
        required_by: Some(target.name().to_string()),
      })?;
      trace!(target = %target.name(), dependency = %dep.name(), "visiting dependency");
      self.visit(dep.name())?;
    }

    self.path.pop();
    self.state.insert(target.name(), VisitState::Done);
    self.order.push(target.name().to_string());
    Ok(())
  }

  /// Build `a -> b -> a` from the stack, starting at the repeated target.
  fn cycle_error(&self, repeated: &str) -> ResolveError {
    let start = self.path.iter().position(|p| *p == repeated).unwrap_or(0);
    let mut path: Vec<String> = self.path[start..].iter().map(|p| p.to_string()).collect();
    path.push(repeated.to_string());
    ResolveError::Cycle { path }
  }
}

/// Look up a requested or already resolved target by name.
pub(crate) fn lookup<'r>(registry: &'r TargetRegistry, name: &str) -> Result<&'r Target, ResolveError> {
  registry.get(name).ok_or_else(|| ResolveError::UnknownTarget {
    name: name.to_string(),
    required_by: None,
  })
}

/// Resolve `roots` against `registry`.
pub fn resolve<S: AsRef<str>>(registry: &TargetRegistry, roots: &[S]) -> Result<ResolvedOrder, ResolveError> {
  GraphResolver::new(registry).resolve(roots)
}
