//! Run reports.
//!
//! A [`RunReport`] aggregates the execution records of one run into an
//! overall outcome, a process exit code, and a plain-text trace.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use super::types::{ExecutionRecord, TargetStatus, exit_code};
use crate::platform::Platform;
use crate::target::ErrorDetail;

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
  Succeeded,
  Failed,
  /// Dry run: nothing was invoked.
  Planned,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub platform: Platform,
  pub roots: Vec<String>,
  /// Resolved order; one record per entry, same positions.
  pub records: Vec<ExecutionRecord>,
  pub dry_run: bool,
  pub elapsed: Duration,
  /// Target whose failure stopped the run.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_failure: Option<String>,
}

impl RunReport {
  pub fn outcome(&self) -> RunOutcome {
    if self.first_failure.is_some() {
      RunOutcome::Failed
    } else if self.dry_run {
      RunOutcome::Planned
    } else {
      RunOutcome::Succeeded
    }
  }

  /// All non-skipped targets succeeded (or would run, for a dry run).
  pub fn is_success(&self) -> bool {
    self.first_failure.is_none()
  }

  pub fn record(&self, target: &str) -> Option<&ExecutionRecord> {
    self.records.iter().find(|r| r.target == target)
  }

  pub fn status(&self, target: &str) -> Option<TargetStatus> {
    self.record(target).map(|r| r.status)
  }

  /// Targets whose body completed, in resolved order. Under concurrent
  /// execution this is not necessarily the order they finished in.
  pub fn executed(&self) -> Vec<&str> {
    self.with_status(TargetStatus::Succeeded)
  }

  pub fn skipped(&self) -> Vec<&str> {
    self.with_status(TargetStatus::SkippedByPlatform)
  }

  /// Targets never started: everything after a failure, or every planned
  /// target in a dry run.
  pub fn not_run(&self) -> Vec<&str> {
    self.with_status(TargetStatus::NotScheduled)
  }

  pub fn failed(&self) -> Vec<&str> {
    self.with_status(TargetStatus::Failed)
  }

  fn with_status(&self, status: TargetStatus) -> Vec<&str> {
    self
      .records
      .iter()
      .filter(|r| r.status == status)
      .map(|r| r.target.as_str())
      .collect()
  }

  /// Error of the target that stopped the run.
  pub fn failure(&self) -> Option<(&str, &ErrorDetail)> {
    let name = self.first_failure.as_deref()?;
    let detail = self.record(name)?.error.as_ref()?;
    Some((name, detail))
  }

  pub fn exit_code(&self) -> i32 {
    if self.is_success() {
      exit_code::SUCCESS
    } else {
      exit_code::TARGET_FAILED
    }
  }

  /// Plain-text trace, one line per target, followed by a summary line.
  pub fn render(&self) -> String {
    let mut out = String::new();
    for record in &self.records {
      let _ = write!(out, "{:<44} {}", record.target, record.status);
      if let Some(reason) = &record.skip_reason {
        let _ = write!(out, ": {}", reason);
      }
      if let Some(elapsed) = record.elapsed {
        let _ = write!(out, " ({}ms)", elapsed.as_millis());
      }
      if let Some(error) = &record.error {
        let _ = write!(out, "\n    {}: {}", error.kind, error.message);
      }
      out.push('\n');
    }

    let _ = match self.outcome() {
      RunOutcome::Succeeded => write!(
        out,
        "build succeeded on {}: {} executed, {} skipped",
        self.platform,
        self.executed().len(),
        self.skipped().len()
      ),
      RunOutcome::Planned => write!(
        out,
        "dry run on {}: {} would run, {} skipped",
        self.platform,
        self.not_run().len(),
        self.skipped().len()
      ),
      RunOutcome::Failed => write!(
        out,
        "build failed on {}: target '{}' failed, {} not run",
        self.platform,
        self.first_failure.as_deref().unwrap_or_default(),
        self.not_run().len()
      ),
    };
    out
  }
}
