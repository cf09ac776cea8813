//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output: colored status
//! messages, human-readable durations, Unicode symbols and the per-target
//! lines of a run report.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use targetry_lib::execute::{ExecutionRecord, RunOutcome, RunReport, TargetStatus};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIP: &str = "-";
  pub const PENDING: &str = "○";
}

/// Duration rounded to milliseconds, e.g. `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let rounded = Duration::from_millis(duration.as_millis() as u64);
  if rounded.is_zero() {
    return "0ms".to_string();
  }
  humantime::format_duration(rounded).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

fn status_symbol(status: TargetStatus) -> &'static str {
  match status {
    TargetStatus::Succeeded => symbols::SUCCESS,
    TargetStatus::Failed => symbols::ERROR,
    TargetStatus::SkippedByPlatform => symbols::SKIP,
    TargetStatus::NotScheduled | TargetStatus::Running => symbols::PENDING,
  }
}

/// One report line without colors: symbol, target, status detail.
pub fn record_line(record: &ExecutionRecord) -> String {
  let mut line = format!("{} {}", status_symbol(record.status), record.target);
  match record.status {
    TargetStatus::Succeeded => {
      if let Some(elapsed) = record.elapsed {
        line.push_str(&format!(" ({})", format_duration(elapsed)));
      }
    }
    TargetStatus::SkippedByPlatform => {
      let reason = record.skip_reason.as_deref().unwrap_or("skipped");
      line.push_str(&format!(" (skipped: {})", reason));
    }
    TargetStatus::Failed => {
      if let Some(error) = &record.error {
        line.push_str(&format!(": {} ({})", error.message, error.kind));
      }
    }
    TargetStatus::NotScheduled | TargetStatus::Running => line.push_str(" (not run)"),
  }
  line
}

/// Print every record followed by a summary line.
pub fn print_report(report: &RunReport) {
  for record in &report.records {
    let line = record_line(record);
    match record.status {
      TargetStatus::Succeeded => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.green())),
      TargetStatus::Failed => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.red())),
      _ => println!("{}", line.if_supports_color(Stream::Stdout, |s| s.dimmed())),
    }
  }
  println!();

  let elapsed = format_duration(report.elapsed);
  match report.outcome() {
    RunOutcome::Succeeded => print_success(&format!(
      "Build succeeded on {} in {} ({} executed, {} skipped)",
      report.platform,
      elapsed,
      report.executed().len(),
      report.skipped().len()
    )),
    RunOutcome::Planned => print_info(&format!(
      "Dry run on {}: {} would run, {} skipped",
      report.platform,
      report.not_run().len(),
      report.skipped().len()
    )),
    RunOutcome::Failed => {
      let (target, error) = match report.failure() {
        Some((target, error)) => (target, error.message.as_str()),
        None => ("<unknown>", "no error recorded"),
      };
      let mut message = format!(
        "Build failed on {}: target '{}' failed: {} ({} not run",
        report.platform,
        target,
        error,
        report.not_run().len()
      );
      // Targets already running when the first one failed may fail too
      let also_failed = report.failed().len().saturating_sub(1);
      if also_failed > 0 {
        message.push_str(&format!(", {} more failed", also_failed));
      }
      message.push(')');
      print_error(&message);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use targetry_lib::target::TargetError;

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_micros(300)), "0ms");
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
  }

  #[test]
  fn record_line_shows_skip_reason() {
    let mut record = ExecutionRecord::new("init-msi");
    record.skip("only runs on windows");
    assert_eq!(record_line(&record), "- init-msi (skipped: only runs on windows)");
  }

  #[test]
  fn record_line_shows_failure_kind() {
    let mut record = ExecutionRecord::new("compile-core-host");
    record.start();
    record.fail(&TargetError::failed("cmake exploded"));
    assert_eq!(
      record_line(&record),
      "✗ compile-core-host: cmake exploded (target failed)"
    );
  }

  #[test]
  fn record_line_marks_unscheduled_targets() {
    let record = ExecutionRecord::new("package");
    assert_eq!(record_line(&record), "○ package (not run)");
  }
}
