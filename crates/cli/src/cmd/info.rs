use anyhow::{Context, Result};

use targetry_lib::platform::Platform;

use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_info(output: OutputFormat) -> Result<()> {
  let platform = Platform::detect().context("Failed to detect host platform")?;

  if output.is_json() {
    return print_json(&serde_json::json!({
      "platform": platform.triple(),
      "os": platform.os,
      "arch": platform.arch,
      "rid": platform.rid(),
      "host_rid": platform.host_rid(),
    }));
  }

  println!("System:");
  print_stat("Platform", &platform.triple());
  print_stat("Runtime identifier", &platform.host_rid());
  if platform.host_rid() != platform.rid() {
    print_stat("Generic runtime identifier", &platform.rid());
  }
  Ok(())
}
