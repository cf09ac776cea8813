//! Types for target resolution and execution.
//!
//! This module defines the error types, per-target execution records, and
//! configuration for running a resolved set of targets.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::target::{ErrorDetail, RegistryError, TargetError, dependency_of};

/// Process exit codes reported by the CLI.
pub mod exit_code {
  pub const SUCCESS: i32 = 0;
  pub const TARGET_FAILED: i32 = 1;
  pub const USAGE: i32 = 2;
  pub const UNKNOWN_TARGET: i32 = 3;
  pub const CYCLE: i32 = 4;
  pub const DUPLICATE_TARGET: i32 = 5;
  pub const INVALID_INPUT: i32 = 6;
}

/// Errors that abort a run before any target executes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
  /// A requested root or a dependency is not registered.
  #[error("unknown target '{name}'{}", dependency_of(.required_by))]
  UnknownTarget {
    name: String,
    required_by: Option<String>,
  },

  /// The dependency graph reachable from the roots has a cycle.
  #[error("dependency cycle detected: {}", .path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("no targets requested")]
  NoTargets,
}

impl ResolveError {
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::UnknownTarget { .. } => exit_code::UNKNOWN_TARGET,
      Self::Cycle { .. } => exit_code::CYCLE,
      Self::NoTargets => exit_code::USAGE,
    }
  }
}

impl RegistryError {
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::DuplicateTarget(_) => exit_code::DUPLICATE_TARGET,
      Self::UnknownTarget { .. } => exit_code::UNKNOWN_TARGET,
    }
  }
}

/// Lifecycle of one target within a run.
///
/// `NotScheduled -> SkippedByPlatform`, or
/// `NotScheduled -> Running -> Succeeded | Failed`. Skipped and the terminal
/// states are final for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
  NotScheduled,
  SkippedByPlatform,
  Running,
  Succeeded,
  Failed,
}

impl TargetStatus {
  pub fn is_final(self) -> bool {
    matches!(self, Self::SkippedByPlatform | Self::Succeeded | Self::Failed)
  }

  /// Whether dependents may start: a skipped dependency does not block.
  pub fn unblocks_dependents(self) -> bool {
    matches!(self, Self::SkippedByPlatform | Self::Succeeded)
  }
}

impl fmt::Display for TargetStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::NotScheduled => "not scheduled",
      Self::SkippedByPlatform => "skipped (platform)",
      Self::Running => "running",
      Self::Succeeded => "succeeded",
      Self::Failed => "failed",
    };
    f.write_str(s)
  }
}

/// Outcome of one target in one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
  pub target: String,
  pub status: TargetStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorDetail>,
  /// Why the target was skipped, e.g. `only runs on windows`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<String>,
  #[serde(skip)]
  pub started_at: Option<Instant>,
  #[serde(skip)]
  pub finished_at: Option<Instant>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub elapsed: Option<Duration>,
}

impl ExecutionRecord {
  pub fn new(target: impl Into<String>) -> Self {
    Self {
      target: target.into(),
      status: TargetStatus::NotScheduled,
      error: None,
      skip_reason: None,
      started_at: None,
      finished_at: None,
      elapsed: None,
    }
  }

  pub fn skip(&mut self, reason: impl Into<String>) {
    self.status = TargetStatus::SkippedByPlatform;
    self.skip_reason = Some(reason.into());
  }

  pub fn start(&mut self) {
    self.status = TargetStatus::Running;
    self.started_at = Some(Instant::now());
  }

  pub fn succeed(&mut self) {
    self.finish(TargetStatus::Succeeded);
  }

  pub fn fail(&mut self, error: &TargetError) {
    self.error = Some(error.detail());
    self.finish(TargetStatus::Failed);
  }

  fn finish(&mut self, status: TargetStatus) {
    let now = Instant::now();
    self.status = status;
    self.finished_at = Some(now);
    self.elapsed = self.started_at.map(|start| now.duration_since(start));
  }
}

/// Configuration for an execution run.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of target bodies running at once. `1` runs the resolved
  /// order strictly sequentially.
  pub parallelism: usize,

  /// Resolve and gate targets without invoking any body.
  pub dry_run: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: 1,
      dry_run: false,
    }
  }
}

impl ExecuteConfig {
  pub fn is_concurrent(&self) -> bool {
    self.parallelism > 1
  }
}

/// Get the number of CPUs, used as the default for `--jobs` without a value.
pub fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
