//! Implementation of the `targetry list` command.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use crate::output::{OutputFormat, print_json, symbols};
use crate::pipeline;

pub fn cmd_list(output: OutputFormat) -> Result<()> {
  let registry = pipeline::registry().context("Failed to register targets")?;

  if output.is_json() {
    let targets: Vec<_> = registry
      .iter()
      .map(|t| {
        serde_json::json!({
          "name": t.name(),
          "description": t.description(),
          "dependencies": t.dependencies(),
          "platforms": t.gate().describe(),
        })
      })
      .collect();
    return print_json(&targets);
  }

  println!("Targets ({}):", registry.len());
  for target in registry.iter() {
    println!(
      "  {} {}",
      symbols::INFO,
      target.name().if_supports_color(Stream::Stdout, |s| s.bold())
    );
    if let Some(description) = target.description() {
      println!("      {}", description);
    }
    if !target.dependencies().is_empty() {
      println!(
        "      {} {}",
        "depends on:".if_supports_color(Stream::Stdout, |s| s.dimmed()),
        target.dependencies().join(", ")
      );
    }
    if !target.gate().is_unrestricted() {
      println!(
        "      {} {}",
        "platforms:".if_supports_color(Stream::Stdout, |s| s.dimmed()),
        target.gate().describe()
      );
    }
  }
  Ok(())
}
