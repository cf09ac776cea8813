mod info;
mod list;
mod plan;
mod run;

use anyhow::{Context, Result};

use targetry_lib::platform::Platform;

pub use info::cmd_info;
pub use list::cmd_list;
pub use plan::cmd_plan;
pub use run::cmd_run;

/// The `--platform` override, or the detected host.
fn resolve_platform(raw: Option<&str>) -> Result<Platform> {
  match raw {
    Some(triple) => triple
      .parse()
      .with_context(|| format!("Invalid --platform '{}'", triple)),
    None => Platform::detect().context("Failed to detect host platform"),
  }
}
