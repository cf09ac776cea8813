//! Build targets and their registry.
//!
//! A [`Target`] is a named unit of work: an ordered list of dependency names,
//! a [`PlatformGate`], and an async body that receives a [`TargetContext`].
//! Targets are collected with a [`RegistryBuilder`] once at startup and then
//! frozen into an immutable [`TargetRegistry`].

pub mod gate;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::context::{ContextError, TargetContext};
use crate::files::FileError;
use crate::process::ProcessError;

pub use gate::PlatformGate;
pub(crate) use registry::dependency_of;
pub use registry::{RegistryBuilder, RegistryError, TargetRegistry};

/// Future returned by a target body.
pub type BodyFuture = Pin<Box<dyn Future<Output = Result<(), TargetError>> + Send + 'static>>;

/// Type-erased target body.
pub type TargetBody = Arc<dyn Fn(TargetContext) -> BodyFuture + Send + Sync>;

/// Why a target body failed.
#[derive(Debug, Error)]
pub enum TargetError {
  #[error(transparent)]
  Context(#[from] ContextError),

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error(transparent)]
  File(#[from] FileError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The body rejected the state it found.
  #[error("{0}")]
  Failed(String),

  #[error("target panicked: {0}")]
  Panicked(String),
}

impl TargetError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed(message.into())
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Context(ContextError::MissingKey { .. }) => ErrorKind::MissingContextKey,
      Self::Context(_) => ErrorKind::ContextType,
      Self::Process(_) => ErrorKind::ExternalToolFailure,
      Self::File(_) => ErrorKind::File,
      Self::Io(_) => ErrorKind::Io,
      Self::Failed(_) => ErrorKind::Failed,
      Self::Panicked(_) => ErrorKind::Panicked,
    }
  }

  pub fn detail(&self) -> ErrorDetail {
    ErrorDetail {
      kind: self.kind(),
      message: self.to_string(),
    }
  }
}

/// Category of a target failure, as surfaced in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  MissingContextKey,
  ContextType,
  ExternalToolFailure,
  File,
  Io,
  Failed,
  Panicked,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::MissingContextKey => "missing context key",
      Self::ContextType => "context type mismatch",
      Self::ExternalToolFailure => "external tool failure",
      Self::File => "file error",
      Self::Io => "io error",
      Self::Failed => "target failed",
      Self::Panicked => "target panicked",
    };
    f.write_str(s)
  }
}

/// Structured error carried by an execution record: kind plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
  pub kind: ErrorKind,
  pub message: String,
}

impl fmt::Display for ErrorDetail {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

/// A named unit of build work.
#[derive(Clone)]
pub struct Target {
  name: String,
  dependencies: Vec<String>,
  gate: PlatformGate,
  description: Option<String>,
  body: TargetBody,
}

impl Target {
  pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
  where
    F: Fn(TargetContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TargetError>> + Send + 'static,
  {
    Self {
      name: name.into(),
      dependencies: Vec::new(),
      gate: PlatformGate::All,
      description: None,
      body: Arc::new(move |ctx| -> BodyFuture { Box::pin(body(ctx)) }),
    }
  }

  /// A target with no work of its own that only pulls in its dependencies.
  pub fn aggregate(name: impl Into<String>, dependencies: &[&str]) -> Self {
    Self::new(name, |_| async { Ok(()) }).depends_on(dependencies)
  }

  pub fn depends_on(mut self, dependencies: &[&str]) -> Self {
    self.dependencies.extend(dependencies.iter().map(|d| d.to_string()));
    self
  }

  pub fn gated(mut self, gate: PlatformGate) -> Self {
    self.gate = gate;
    self
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Dependency names in declared order.
  pub fn dependencies(&self) -> &[String] {
    &self.dependencies
  }

  pub fn gate(&self) -> &PlatformGate {
    &self.gate
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  /// Start the body. The returned future owns everything it needs.
  pub fn invoke(&self, ctx: TargetContext) -> BodyFuture {
    (self.body)(ctx)
  }
}

impl fmt::Debug for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Target")
      .field("name", &self.name)
      .field("dependencies", &self.dependencies)
      .field("gate", &self.gate)
      .finish_non_exhaustive()
  }
}
