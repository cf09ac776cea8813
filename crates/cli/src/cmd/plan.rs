//! Implementation of the `targetry plan` command.
//!
//! Resolves the requested targets and shows, without running anything, the
//! order they would run in, the wave each would start in with `--jobs`, and
//! which ones the platform gate would skip.

use anyhow::{Context, Result};

use targetry_lib::execute::Executor;

use super::resolve_platform;
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};
use crate::pipeline;

pub fn cmd_plan(targets: &[String], platform: Option<&str>, output: OutputFormat) -> Result<()> {
  let registry = pipeline::registry().context("Failed to register targets")?;
  let platform = resolve_platform(platform)?;

  let plan = Executor::new(&registry)
    .plan(targets, &platform)
    .context("Failed to resolve targets")?;

  if output.is_json() {
    return print_json(&serde_json::json!({
      "platform": platform.triple(),
      "roots": targets,
      "targets": plan,
    }));
  }

  print_info(&format!("Plan for {} on {}", targets.join(", "), platform));
  for entry in &plan {
    let marker = if entry.runs { symbols::ARROW } else { symbols::SKIP };
    let mut line = format!("  {} [{}] {}", marker, entry.wave, entry.target);
    if !entry.dependencies.is_empty() {
      line.push_str(&format!(" after {}", entry.dependencies.join(", ")));
    }
    if !entry.runs {
      line.push_str(&format!(" (skipped: only runs on {})", entry.platforms));
    }
    println!("{}", line);
  }

  let skipped = plan.iter().filter(|e| !e.runs).count();
  println!();
  print_stat("Targets", &plan.len().to_string());
  print_stat("Would run", &(plan.len() - skipped).to_string());
  print_stat("Skipped", &skipped.to_string());
  Ok(())
}
