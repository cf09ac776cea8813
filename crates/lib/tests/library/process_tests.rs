use targetry_lib::context::TargetContext;
use targetry_lib::execute::Executor;
use targetry_lib::platform::Os;
use targetry_lib::process::CommandSpec;
use targetry_lib::target::{ErrorKind, PlatformGate, TargetError, TargetRegistry};

use super::common::context_on;

async fn failing_tool(ctx: TargetContext) -> Result<(), TargetError> {
  ctx.exec(CommandSpec::shell("echo 'pack: no nuspec found' >&2; exit 4")).await?;
  Ok(())
}

async fn version_probe(ctx: TargetContext) -> Result<(), TargetError> {
  let output = ctx.exec(CommandSpec::shell("echo 1.0.1")).await?;
  ctx.set("ProbedVersion", output.stdout);
  Ok(())
}

#[tokio::test]
#[cfg(unix)]
async fn nonzero_exit_fails_target_as_external_tool_failure() {
  let mut builder = TargetRegistry::builder();
  builder
    .register("package-pkg-projects", &[], PlatformGate::all(), failing_tool)
    .unwrap();
  let registry = builder.build().unwrap();

  let report = Executor::new(&registry)
    .run(&["package-pkg-projects"], context_on(Os::Linux))
    .await
    .unwrap();

  let (name, detail) = report.failure().unwrap();
  assert_eq!(name, "package-pkg-projects");
  assert_eq!(detail.kind, ErrorKind::ExternalToolFailure);
  assert!(detail.message.contains("exit code Some(4)"));
  assert!(detail.message.contains("pack: no nuspec found"));
}

#[tokio::test]
#[cfg(unix)]
async fn captured_output_reaches_the_context() {
  let mut builder = TargetRegistry::builder();
  builder
    .register("probe", &[], PlatformGate::all(), version_probe)
    .unwrap();
  let registry = builder.build().unwrap();

  let build = context_on(Os::Linux);
  let report = Executor::new(&registry)
    .run(&["probe"], std::sync::Arc::clone(&build))
    .await
    .unwrap();

  assert!(report.is_success());
  assert_eq!(build.get_str("ProbedVersion").unwrap(), "1.0.1");
}
