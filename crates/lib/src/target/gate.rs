//! Platform gates.
//!
//! A gate decides whether a target runs on the platform of the current build.
//! It is evaluated by the executor, never by the target body, so a target that
//! is gated out is recorded as skipped instead of failing.

use std::fmt;
use std::sync::Arc;

use crate::platform::{Os, Platform};

type Predicate = Arc<dyn Fn(&Platform) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub enum PlatformGate {
  /// Runs everywhere.
  #[default]
  All,
  /// Runs only on the listed operating systems. An empty list means all.
  Only(Vec<Os>),
  /// Arbitrary predicate over the host descriptor.
  When { label: String, predicate: Predicate },
}

impl PlatformGate {
  pub fn all() -> Self {
    Self::All
  }

  pub fn only(systems: &[Os]) -> Self {
    if systems.is_empty() {
      Self::All
    } else {
      Self::Only(systems.to_vec())
    }
  }

  pub fn windows() -> Self {
    Self::only(&[Os::Windows])
  }

  pub fn macos() -> Self {
    Self::only(&[Os::MacOs])
  }

  /// Gate on a custom condition; `label` is shown in plans and skip reasons.
  pub fn when<F>(label: impl Into<String>, predicate: F) -> Self
  where
    F: Fn(&Platform) -> bool + Send + Sync + 'static,
  {
    Self::When {
      label: label.into(),
      predicate: Arc::new(predicate),
    }
  }

  pub fn allows(&self, platform: &Platform) -> bool {
    match self {
      Self::All => true,
      Self::Only(systems) => systems.is_empty() || systems.contains(&platform.os),
      Self::When { predicate, .. } => predicate(platform),
    }
  }

  pub fn is_unrestricted(&self) -> bool {
    match self {
      Self::All => true,
      Self::Only(systems) => systems.is_empty(),
      Self::When { .. } => false,
    }
  }

  /// Human readable description, e.g. `all`, `windows` or `darwin, linux`.
  pub fn describe(&self) -> String {
    match self {
      Self::All => "all".to_string(),
      Self::Only(systems) if systems.is_empty() => "all".to_string(),
      Self::Only(systems) => systems.iter().map(Os::as_str).collect::<Vec<_>>().join(", "),
      Self::When { label, .. } => label.clone(),
    }
  }
}

impl fmt::Debug for PlatformGate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "PlatformGate({})", self.describe())
  }
}
