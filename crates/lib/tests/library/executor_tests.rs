use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use targetry_lib::context::TargetContext;
use targetry_lib::execute::{ExecuteConfig, Executor, ResolveError, RunOutcome, TargetStatus, exit_code};
use targetry_lib::platform::Os;
use targetry_lib::target::{ErrorKind, PlatformGate, Target, TargetError, TargetRegistry};

use super::common::{Calls, context_on, failing, recording};

fn concurrent(parallelism: usize) -> ExecuteConfig {
  ExecuteConfig {
    parallelism,
    ..Default::default()
  }
}

#[tokio::test]
async fn fail_fast_stops_before_dependents() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(failing("t1", &[], &calls)).unwrap();
  builder.add(recording("t2", &["t1"], &calls)).unwrap();
  builder.add(recording("root", &["t1", "t2"], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .run(&["root"], context_on(Os::Linux))
    .await
    .unwrap();

  assert_eq!(calls.names(), vec!["t1"]);
  assert_eq!(report.outcome(), RunOutcome::Failed);
  assert_eq!(report.exit_code(), exit_code::TARGET_FAILED);
  assert_eq!(report.first_failure.as_deref(), Some("t1"));
  assert_eq!(report.status("t2"), Some(TargetStatus::NotScheduled));
  assert_eq!(report.status("root"), Some(TargetStatus::NotScheduled));

  let (_, detail) = report.failure().unwrap();
  assert_eq!(detail.kind, ErrorKind::Failed);
  assert_eq!(detail.message, "t1 broke");
}

#[tokio::test]
async fn failure_does_not_run_independent_later_targets() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(failing("first", &[], &calls)).unwrap();
  builder.add(recording("second", &[], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .run(&["first", "second"], context_on(Os::Linux))
    .await
    .unwrap();

  assert_eq!(calls.names(), vec!["first"]);
  assert_eq!(report.not_run(), vec!["second"]);
}

#[tokio::test]
async fn gated_target_is_skipped_without_failing() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(recording("init", &[], &calls)).unwrap();
  builder
    .add(recording("init-msi", &["init"], &calls).gated(PlatformGate::windows()))
    .unwrap();
  builder
    .add(recording("generate-msis", &["init-msi"], &calls).gated(PlatformGate::windows()))
    .unwrap();
  builder
    .add(Target::aggregate("package", &["init", "generate-msis"]))
    .unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .run(&["package"], context_on(Os::MacOs))
    .await
    .unwrap();

  assert!(report.is_success());
  assert_eq!(report.exit_code(), exit_code::SUCCESS);
  assert_eq!(calls.names(), vec!["init"]);
  assert_eq!(report.skipped(), vec!["init-msi", "generate-msis"]);
  assert_eq!(report.executed(), vec!["init", "package"]);
  assert_eq!(
    report.record("init-msi").unwrap().skip_reason.as_deref(),
    Some("only runs on windows")
  );
}

#[tokio::test]
async fn unrestricted_gate_runs_on_every_platform() {
  for os in [Os::Linux, Os::MacOs, Os::Windows] {
    let calls = Calls::default();
    let mut builder = TargetRegistry::builder();
    builder
      .add(recording("init", &[], &calls).gated(PlatformGate::only(&[])))
      .unwrap();
    let registry = builder.build().unwrap();

    let report = Executor::new(&registry).run(&["init"], context_on(os)).await.unwrap();
    assert!(report.is_success());
    assert_eq!(calls.names(), vec!["init"]);
  }
}

#[tokio::test]
async fn context_flows_from_dependency_to_dependent() {
  let mut builder = TargetRegistry::builder();
  builder
    .register("init", &[], PlatformGate::all(), |ctx: TargetContext| async move {
      ctx.set("Configuration", "Release");
      Ok(())
    })
    .unwrap();
  builder
    .register("compile", &["init"], PlatformGate::all(), |ctx: TargetContext| async move {
      let configuration = ctx.get_str("Configuration")?;
      ctx.set("CompiledWith", configuration);
      Ok(())
    })
    .unwrap();
  let registry = builder.build().unwrap();

  let build = context_on(Os::Linux);
  let report = Executor::new(&registry).run(&["compile"], Arc::clone(&build)).await.unwrap();

  assert!(report.is_success());
  assert_eq!(build.get_str("CompiledWith").unwrap(), "Release");
}

#[tokio::test]
async fn reader_without_dependency_sees_missing_key() {
  // `reader` does not depend on `writer`, so resolving [reader, writer] runs it first
  let mut builder = TargetRegistry::builder();
  builder
    .register("writer", &[], PlatformGate::all(), |ctx: TargetContext| async move {
      ctx.set("HostVersion", "1.0.1");
      Ok(())
    })
    .unwrap();
  builder
    .register("reader", &[], PlatformGate::all(), |ctx: TargetContext| async move {
      ctx.get_str("HostVersion")?;
      Ok(())
    })
    .unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .run(&["reader", "writer"], context_on(Os::Linux))
    .await
    .unwrap();

  let (name, detail) = report.failure().unwrap();
  assert_eq!(name, "reader");
  assert_eq!(detail.kind, ErrorKind::MissingContextKey);
  assert_eq!(
    detail.message,
    "missing context key 'HostVersion' (required by target 'reader')"
  );
  assert_eq!(report.status("writer"), Some(TargetStatus::NotScheduled));
}

#[tokio::test]
async fn dependent_of_skipped_target_still_runs() {
  let mut builder = TargetRegistry::builder();
  builder
    .register("init-pkg", &[], PlatformGate::macos(), |ctx: TargetContext| async move {
      ctx.set("SharedHostComponentId", "com.example.host");
      Ok(())
    })
    .unwrap();
  builder
    .register("summary", &["init-pkg"], PlatformGate::all(), |ctx: TargetContext| async move {
      if ctx.contains("SharedHostComponentId") {
        return Err(TargetError::failed("key set by a skipped target"));
      }
      ctx.set("Summary", "no packages on this platform");
      Ok(())
    })
    .unwrap();
  let registry = builder.build().unwrap();

  let build = context_on(Os::Windows);
  let report = Executor::new(&registry).run(&["summary"], Arc::clone(&build)).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.skipped(), vec!["init-pkg"]);
  assert_eq!(build.get_str("Summary").unwrap(), "no packages on this platform");
}

#[tokio::test]
async fn cycle_is_reported_and_nothing_runs() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(recording("init", &[], &calls)).unwrap();
  builder.add(recording("a", &["init", "b"], &calls)).unwrap();
  builder.add(recording("b", &["a"], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let err = Executor::new(&registry)
    .run(&["a"], context_on(Os::Linux))
    .await
    .unwrap_err();

  assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
  assert_eq!(err.exit_code(), exit_code::CYCLE);
  assert!(calls.names().is_empty());
}

#[tokio::test]
async fn unknown_root_aborts_before_execution() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(recording("init", &[], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let err = Executor::new(&registry)
    .run(&["init", "compile"], context_on(Os::Linux))
    .await
    .unwrap_err();

  assert!(matches!(err, ResolveError::UnknownTarget { ref name, .. } if name == "compile"));
  assert_eq!(err.exit_code(), exit_code::UNKNOWN_TARGET);
  assert!(calls.names().is_empty());
}

#[tokio::test]
async fn repeated_runs_resolve_identically() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(recording("a", &[], &calls)).unwrap();
  builder.add(recording("b", &["a"], &calls)).unwrap();
  builder.add(recording("c", &["a", "b"], &calls)).unwrap();
  let registry = builder.build().unwrap();
  let executor = Executor::new(&registry);

  let first = executor.resolve(&["c"]).unwrap();
  let second = executor.resolve(&["c"]).unwrap();
  assert_eq!(first, second);

  let report = executor.run(&["c"], context_on(Os::Linux)).await.unwrap();
  let order: Vec<_> = report.records.iter().map(|r| r.target.clone()).collect();
  assert_eq!(order, first.order);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mode_runs_each_target_once() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(recording("a", &[], &calls)).unwrap();
  builder.add(recording("b", &["a"], &calls)).unwrap();
  builder.add(recording("c", &["a"], &calls)).unwrap();
  builder.add(recording("d", &["b", "c"], &calls)).unwrap();
  builder
    .add(recording("e", &["a"], &calls).gated(PlatformGate::windows()))
    .unwrap();
  builder.add(recording("f", &["e", "d"], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .with_config(concurrent(4))
    .run(&["f", "d"], context_on(Os::Linux))
    .await
    .unwrap();

  assert!(report.is_success());
  for name in ["a", "b", "c", "d", "f"] {
    assert_eq!(calls.count(name), 1, "{} ran once", name);
  }
  assert_eq!(calls.count("e"), 0);
  assert_eq!(report.skipped(), vec!["e"]);

  let names = calls.names();
  let pos = |n: &str| names.iter().position(|x| x == n).unwrap();
  assert!(pos("a") < pos("b") && pos("a") < pos("c"));
  assert!(pos("b") < pos("d") && pos("c") < pos("d"));
  assert!(pos("d") < pos("f"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mode_respects_parallelism_limit() {
  let running = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let mut builder = TargetRegistry::builder();
  for name in ["w1", "w2", "w3", "w4", "w5", "w6"] {
    let running = Arc::clone(&running);
    let peak = Arc::clone(&peak);
    builder
      .add(Target::new(name, move |_| {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        async move {
          let now = running.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(20)).await;
          running.fetch_sub(1, Ordering::SeqCst);
          Ok::<(), TargetError>(())
        }
      }))
      .unwrap();
  }
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .with_config(concurrent(2))
    .run(&["w1", "w2", "w3", "w4", "w5", "w6"], context_on(Os::Linux))
    .await
    .unwrap();

  assert!(report.is_success());
  assert_eq!(report.executed().len(), 6);
  assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mode_fails_fast() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(failing("t1", &[], &calls)).unwrap();
  builder.add(recording("t2", &["t1"], &calls)).unwrap();
  builder.add(recording("root", &["t1", "t2"], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .with_config(concurrent(4))
    .run(&["root"], context_on(Os::Linux))
    .await
    .unwrap();

  assert_eq!(calls.names(), vec!["t1"]);
  assert_eq!(report.first_failure.as_deref(), Some("t1"));
  assert_eq!(report.not_run(), vec!["t2", "root"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failure_lets_running_targets_finish_and_starts_nothing_new() {
  let calls = Calls::default();
  let mut builder = TargetRegistry::builder();
  builder.add(failing("f", &[], &calls)).unwrap();
  let slow_calls = calls.clone();
  builder
    .add(Target::new("slow", move |ctx: TargetContext| {
      let calls = slow_calls.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        calls.push(ctx.name());
        Ok::<(), TargetError>(())
      }
    }))
    .unwrap();
  builder.add(recording("x", &[], &calls)).unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .with_config(concurrent(2))
    .run(&["f", "slow", "x"], context_on(Os::Linux))
    .await
    .unwrap();

  assert_eq!(report.first_failure.as_deref(), Some("f"));
  assert_eq!(report.failed(), vec!["f"]);
  assert_eq!(report.status("slow"), Some(TargetStatus::Succeeded));
  assert!(report.record("slow").unwrap().elapsed.is_some());
  assert_eq!(report.status("x"), Some(TargetStatus::NotScheduled));
  assert_eq!(calls.count("x"), 0);
  assert_eq!(calls.count("slow"), 1);
}
