//! Implementation of the `targetry run` command.
//!
//! Builds the run's [`BuildContext`] from the command line, then resolves and
//! executes the requested targets:
//! - Platform: `--platform` or the detected host
//! - Repository root: `--repo-root` or the current directory, canonicalized
//! - Seeds: `TARGETRY_*` environment, then `--params`, then `--set` (last wins)

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use targetry_lib::context::{BuildContext, ENV_PREFIX, parse_assignment};
use targetry_lib::execute::{ExecuteConfig, Executor, types::num_cpus};
use targetry_lib::files::{self, FileError};

use super::resolve_platform;
use crate::RunArgs;
use crate::output::{print_json, print_report};
use crate::pipeline;

pub fn cmd_run(args: RunArgs) -> Result<i32> {
  let registry = pipeline::registry().context("Failed to register targets")?;
  let build = build_context(&args)?;

  let config = ExecuteConfig {
    parallelism: if args.jobs == 0 { num_cpus() } else { args.jobs },
    dry_run: args.dry_run,
  };
  info!(
    targets = ?args.targets,
    platform = %build.platform(),
    parallelism = config.parallelism,
    dry_run = config.dry_run,
    "starting run"
  );

  let executor = Executor::new(&registry).with_config(config);
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(executor.run(&args.targets, Arc::new(build)))
    .context("Failed to resolve targets")?;

  if args.format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }
  Ok(report.exit_code())
}

fn build_context(args: &RunArgs) -> Result<BuildContext> {
  let platform = resolve_platform(args.platform.as_deref())?;

  let repo_root = match &args.repo_root {
    Some(path) => path.clone(),
    None => std::env::current_dir().context("Failed to read current directory")?,
  };
  let repo_root = canonical_repo_root(&repo_root).context("Invalid --repo-root")?;

  let build = BuildContext::new(platform)
    .with_configuration(&args.configuration)
    .with_repo_root(repo_root);

  let from_env = build.seed_from_env(ENV_PREFIX);

  let from_params = match &args.params {
    Some(path) => {
      let json = files::read_json(path).with_context(|| format!("Failed to read params file: {}", path.display()))?;
      build
        .seed_from_json(&json)
        .with_context(|| format!("Invalid params file: {}", path.display()))?
    }
    None => 0,
  };

  let assignments = args
    .set
    .iter()
    .map(|raw| parse_assignment(raw))
    .collect::<Result<Vec<_>, _>>()
    .context("Invalid --set value")?;
  let from_flags = assignments.len();
  build.seed(assignments);

  debug!(from_env, from_params, from_flags, "seeded build context");
  Ok(build)
}

fn canonical_repo_root(path: &Path) -> Result<std::path::PathBuf, FileError> {
  dunce::canonicalize(path).map_err(|source| FileError::Io {
    action: "failed to resolve",
    path: path.to_path_buf(),
    source,
  })
}
