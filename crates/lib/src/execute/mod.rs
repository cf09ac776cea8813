//! Target execution module.
//!
//! This module provides the entry point for running requested targets. It
//! handles:
//! - Dependency resolution into a run-once order
//! - Platform gating against the build's host platform
//! - Fail-fast: the first failing body stops the run
//! - Optional concurrent scheduling of independent targets

pub mod dag;
pub mod report;
pub mod resolver;
pub mod types;

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::{BuildContext, TargetContext};
use crate::platform::Platform;
use crate::target::{BodyFuture, Target, TargetError, TargetRegistry};

pub use dag::ExecutionDag;
pub use report::{RunOutcome, RunReport};
pub use resolver::{GraphResolver, ResolvedOrder, resolve};
pub use types::{ExecuteConfig, ExecutionRecord, ResolveError, TargetStatus, exit_code};

/// One line of a plan: what would happen to a target on a platform.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
  pub target: String,
  pub dependencies: Vec<String>,
  pub platforms: String,
  pub runs: bool,
  /// Wave the target would start in when running concurrently.
  pub wave: usize,
}

/// Runs resolved targets against a shared build context.
pub struct Executor<'r> {
  registry: &'r TargetRegistry,
  config: ExecuteConfig,
}

impl<'r> Executor<'r> {
  pub fn new(registry: &'r TargetRegistry) -> Self {
    Self {
      registry,
      config: ExecuteConfig::default(),
    }
  }

  pub fn with_config(mut self, config: ExecuteConfig) -> Self {
    self.config = config;
    self
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  pub fn resolve<S: AsRef<str>>(&self, roots: &[S]) -> Result<ResolvedOrder, ResolveError> {
    resolve(self.registry, roots)
  }

  /// Resolve `roots` and report the gate decision for each target.
  pub fn plan<S: AsRef<str>>(&self, roots: &[S], platform: &Platform) -> Result<Vec<PlanEntry>, ResolveError> {
    let resolved = self.resolve(roots)?;
    let dag = ExecutionDag::from_order(self.registry, &resolved)?;
    let waves = dag.waves()?;

    resolved
      .order
      .iter()
      .map(|name| {
        let target = resolver::lookup(self.registry, name)?;
        let wave = waves.iter().position(|w| w.contains(name)).unwrap_or_default();
        Ok(PlanEntry {
          target: name.clone(),
          dependencies: target.dependencies().to_vec(),
          platforms: target.gate().describe(),
          runs: target.gate().allows(platform),
          wave,
        })
      })
      .collect()
  }

  /// Resolve `roots` and run them against `build`.
  ///
  /// Resolution errors abort before any body runs. A failing body does not
  /// produce an `Err`: it is recorded in the returned report.
  pub async fn run<S: AsRef<str>>(&self, roots: &[S], build: Arc<BuildContext>) -> Result<RunReport, ResolveError> {
    let resolved = self.resolve(roots)?;
    self.execute(resolved, build).await
  }

  /// Run an already resolved order.
  pub async fn execute(&self, resolved: ResolvedOrder, build: Arc<BuildContext>) -> Result<RunReport, ResolveError> {
    let started = Instant::now();
    let platform = build.platform();
    let targets = resolved
      .order
      .iter()
      .map(|name| resolver::lookup(self.registry, name))
      .collect::<Result<Vec<_>, _>>()?;
    let mut records: Vec<ExecutionRecord> = resolved.order.iter().map(ExecutionRecord::new).collect();

    info!(
      platform = %platform,
      targets = targets.len(),
      parallelism = self.config.parallelism,
      dry_run = self.config.dry_run,
      "starting run"
    );

    let first_failure = if self.config.dry_run {
      plan_only(&targets, &mut records, &platform);
      None
    } else if self.config.is_concurrent() {
      let dag = ExecutionDag::from_order(self.registry, &resolved)?;
      self.run_concurrent(&targets, &dag, &mut records, &build).await
    } else {
      run_sequential(&targets, &mut records, &build).await
    };

    let report = RunReport {
      platform,
      roots: resolved.roots,
      records,
      dry_run: self.config.dry_run,
      elapsed: started.elapsed(),
      first_failure,
    };

    info!(
      outcome = ?report.outcome(),
      executed = report.executed().len(),
      skipped = report.skipped().len(),
      elapsed = ?report.elapsed,
      "run complete"
    );

    Ok(report)
  }

  /// Start targets as soon as their dependencies are done, up to
  /// `parallelism` at once. Returns the first failing target.
  async fn run_concurrent(
    &self,
    targets: &[&Target],
    dag: &ExecutionDag,
    records: &mut [ExecutionRecord],
    build: &Arc<BuildContext>,
  ) -> Option<String> {
    let platform = build.platform();
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
    let mut join_set: JoinSet<(usize, Result<(), TargetError>)> = JoinSet::new();
    let mut first_failure: Option<String> = None;

    loop {
      if first_failure.is_none() {
        // Resolved order is topological, so one forward pass sees skips
        // made earlier in the same pass.
        for (i, target) in targets.iter().enumerate() {
          if records[i].status != TargetStatus::NotScheduled {
            continue;
          }
          let ready = dag
            .dependencies(NodeIndex::new(i))
            .iter()
            .all(|dep| records[dep.index()].status.unblocks_dependents());
          if !ready {
            continue;
          }
          if !target.gate().allows(&platform) {
            skip(target, &mut records[i]);
            continue;
          }

          let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
            break;
          };

          records[i].start();
          info!(target = %target.name(), running = join_set.len() + 1, "running target");
          let body = target.invoke(TargetContext::new(target.name(), Arc::clone(build)));
          join_set.spawn(async move {
            let _permit = permit;
            (i, run_body(body).await)
          });
        }
      }

      let Some(joined) = join_set.join_next().await else {
        break;
      };

      match joined {
        Ok((i, Ok(()))) => {
          records[i].succeed();
          info!(target = %records[i].target, elapsed = ?records[i].elapsed, "target succeeded");
        }
        Ok((i, Err(e))) => {
          error!(target = %records[i].target, error = %e, "target failed");
          records[i].fail(&e);
          if first_failure.is_none() {
            first_failure = Some(records[i].target.clone());
            if !join_set.is_empty() {
              warn!(running = join_set.len(), "waiting for running targets after failure");
            }
          }
        }
        Err(e) => {
          error!(error = %e, "target task aborted");
          if first_failure.is_none() {
            first_failure = records
              .iter()
              .find(|r| r.status == TargetStatus::Running)
              .map(|r| r.target.clone());
          }
        }
      }
    }

    // Only reachable after an aborted task
    for record in records.iter_mut().filter(|r| r.status == TargetStatus::Running) {
      record.fail(&TargetError::Panicked("task aborted".to_string()));
    }

    first_failure
  }
}

/// Run the resolved order one target at a time. Returns the first failing
/// target, after which nothing else is started.
async fn run_sequential(
  targets: &[&Target],
  records: &mut [ExecutionRecord],
  build: &Arc<BuildContext>,
) -> Option<String> {
  let platform = build.platform();

  for (target, record) in targets.iter().zip(records.iter_mut()) {
    if !target.gate().allows(&platform) {
      skip(target, record);
      continue;
    }

    record.start();
    info!(target = %target.name(), "running target");
    let body = target.invoke(TargetContext::new(target.name(), Arc::clone(build)));

    match run_body(body).await {
      Ok(()) => {
        record.succeed();
        info!(target = %target.name(), elapsed = ?record.elapsed, "target succeeded");
      }
      Err(e) => {
        error!(target = %target.name(), error = %e, "target failed");
        record.fail(&e);
        return Some(target.name().to_string());
      }
    }
  }

  None
}

fn plan_only(targets: &[&Target], records: &mut [ExecutionRecord], platform: &Platform) {
  for (target, record) in targets.iter().zip(records.iter_mut()) {
    if target.gate().allows(platform) {
      debug!(target = %target.name(), "would run target");
    } else {
      skip(target, record);
    }
  }
}

fn skip(target: &Target, record: &mut ExecutionRecord) {
  let reason = format!("only runs on {}", target.gate().describe());
  info!(target = %target.name(), reason = %reason, "skipping target");
  record.skip(reason);
}

/// Await a body on its own task so a panic becomes a failure of that target.
async fn run_body(body: BodyFuture) -> Result<(), TargetError> {
  match tokio::spawn(body).await {
    Ok(result) => result,
    Err(e) if e.is_panic() => Err(TargetError::Panicked(panic_message(e.into_panic()))),
    Err(e) => Err(TargetError::Panicked(e.to_string())),
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
