//! `init`: defaults and artifact layout for the rest of the pipeline.

use std::path::Path;
use std::str::FromStr;

use targetry_lib::context::{
  BuildVersion, ComponentVersion, ContextError, ContextValue, HostVersion, MSI_COMMIT_COUNT_LIMIT, MSI_FIELD_LIMIT,
  TargetContext,
};
use targetry_lib::platform::Os;
use targetry_lib::process::CommandSpec;
use targetry_lib::target::TargetError;
use tracing::{debug, info, warn};

use super::keys;

const UNKNOWN_COMMIT: &str = "unknown";

pub async fn init(ctx: TargetContext) -> Result<(), TargetError> {
  let configuration = ctx.get_str_or(keys::CONFIGURATION, ctx.configuration())?;
  ctx.set(keys::CONFIGURATION, configuration.as_str());

  let commit_hash = match ctx.get_str(keys::COMMIT_HASH) {
    Ok(hash) => hash,
    Err(ContextError::MissingKey { .. }) => detect_commit_hash(&ctx).await,
    Err(e) => return Err(e.into()),
  };
  ctx.set(keys::COMMIT_HASH, commit_hash.as_str());

  let build_version = BuildVersion::new(
    msi_field_seed(&ctx, "VersionMajor", 1, MSI_FIELD_LIMIT)?,
    msi_field_seed(&ctx, "VersionMinor", 0, MSI_FIELD_LIMIT)?,
    msi_field_seed(&ctx, "VersionPatch", 0, MSI_FIELD_LIMIT)?,
    ctx.get_str_or("ReleaseSuffix", "rc2")?,
    msi_field_seed(&ctx, "CommitCount", 0, MSI_COMMIT_COUNT_LIMIT)?,
  );
  let host_version = HostVersion {
    host: component_seed(&ctx, "HostVersionNumber", ComponentVersion::new(1, 0, 1))?,
    fxr: component_seed(&ctx, "HostFxrVersionNumber", ComponentVersion::new(1, 0, 1))?,
    policy: component_seed(&ctx, "HostPolicyVersionNumber", ComponentVersion::new(1, 0, 1))?,
    prerelease: Some(ctx.get_str_or("HostPrerelease", "rc2")?).filter(|tag| !tag.is_empty()),
    build_major: build_version.commit_count,
    locked_host_version: ctx.get_str_or("LockedHostVersion", "1.0.1")?,
  };
  let shared_framework_version =
    ctx.get_str_or(keys::SHARED_FRAMEWORK_NUGET_VERSION, &build_version.nuget_version())?;

  info!(
    configuration = %configuration,
    commit = %commit_hash,
    version = %build_version,
    host = %host_version.latest_host_version(),
    "build parameters"
  );

  let platform = ctx.platform();
  let rid = ctx.get_str_or(keys::RID, &platform.host_rid())?;
  ctx.set(keys::RID, rid.as_str());
  ctx.set(keys::DOTNET, ctx.get_str_or(keys::DOTNET, "dotnet")?);

  let output = ctx.repo_root().join("artifacts").join(&rid);
  let intermediate = output.join("intermediate");
  let packages = output.join("packages");
  let stage2 = output.join("stage2");

  let layout = [
    (keys::OUTPUT_DIR, output.clone()),
    (keys::INTERMEDIATE_DIR, intermediate.clone()),
    (keys::PACKAGES_DIR, packages.clone()),
    (keys::STAGE2_DIR, stage2.clone()),
    (keys::COREHOST_LATEST, output.join("corehost")),
    (keys::COREHOST_LOCKED, output.join("corehost-locked")),
    (keys::COREHOST_LOCAL_PACKAGES, output.join("corehost-packages")),
    (keys::COREHOST_DUMMY_PACKAGES, output.join("corehost-dummy-packages")),
    (keys::SHARED_FRAMEWORK_PUBLISH_ROOT, intermediate.join("sharedFrameworkPublish")),
    (keys::SHARED_HOST_PUBLISH_ROOT, intermediate.join("sharedHostPublish")),
    (keys::CLI_SDK_ROOT, stage2),
  ];
  for (key, default) in layout {
    let dir = ctx.get_path(key).or_else(|e| match e {
      ContextError::MissingKey { .. } => Ok(default),
      other => Err(other),
    })?;
    create_dir(&dir)?;
    ctx.set(key, dir);
  }

  let extension = installer_extension(platform.os);
  let installers = [
    (
      keys::SHARED_HOST_INSTALLER_FILE,
      format!("dotnet-host-{}.{}{}", rid, host_version.latest_host_version(), extension),
    ),
    (
      keys::SHARED_FRAMEWORK_INSTALLER_FILE,
      format!("dotnet-sharedframework-{}.{}{}", rid, shared_framework_version, extension),
    ),
    (
      keys::COMBINED_FRAMEWORK_HOST_INSTALLER_FILE,
      format!("dotnet-{}.{}{}", rid, shared_framework_version, extension),
    ),
    (
      keys::COMBINED_FRAMEWORK_SDK_HOST_INSTALLER_FILE,
      format!("dotnet-dev-{}.{}{}", rid, build_version.nuget_version(), extension),
    ),
  ];
  for (key, file_name) in installers {
    if !ctx.contains(key) {
      ctx.set(key, packages.join(file_name));
    }
  }

  ctx.set(keys::SHARED_FRAMEWORK_NUGET_VERSION, shared_framework_version);
  ctx.set(keys::BUILD_VERSION, build_version);
  ctx.set(keys::HOST_VERSION, host_version);

  debug!(output = %output.display(), "artifact layout ready");
  Ok(())
}

/// `git rev-parse HEAD` in the repository, or a placeholder outside a checkout.
async fn detect_commit_hash(ctx: &TargetContext) -> String {
  let spec = CommandSpec::new("git")
    .args(["rev-parse", "HEAD"])
    .current_dir(ctx.repo_root());

  match ctx.build().runner().run(&spec).await {
    Ok(output) if output.success() && !output.stdout.is_empty() => output.stdout,
    Ok(output) => {
      warn!(code = ?output.code, "could not read commit hash, using '{}'", UNKNOWN_COMMIT);
      UNKNOWN_COMMIT.to_string()
    }
    Err(e) => {
      warn!(error = %e, "git is not available, using '{}'", UNKNOWN_COMMIT);
      UNKNOWN_COMMIT.to_string()
    }
  }
}

fn installer_extension(os: Os) -> &'static str {
  match os {
    Os::Windows => ".exe",
    Os::MacOs => ".pkg",
    Os::Linux => ".tar.gz",
  }
}

fn create_dir(dir: &Path) -> Result<(), TargetError> {
  std::fs::create_dir_all(dir)?;
  Ok(())
}

/// Parse a seeded string value, falling back to `default` when unset.
fn parse_seed<T>(ctx: &TargetContext, key: &str, default: T) -> Result<T, TargetError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match ctx.get(key) {
    Ok(ContextValue::String(raw)) => raw
      .trim()
      .parse()
      .map_err(|e| ContextError::InvalidSeed(format!("{}='{}': {}", key, raw, e)).into()),
    Ok(other) => Err(ContextError::InvalidSeed(format!("{} must be a string, got a {}", key, other.type_name())).into()),
    Err(ContextError::MissingKey { .. }) => Ok(default),
    Err(e) => Err(e.into()),
  }
}

/// Parse a seeded number that has to fit its field of the packed MSI version.
fn msi_field_seed(ctx: &TargetContext, key: &str, default: u32, limit: u32) -> Result<u32, TargetError> {
  let value = parse_seed(ctx, key, default)?;
  if value >= limit {
    return Err(out_of_msi_range(key, &value.to_string(), limit));
  }
  Ok(value)
}

fn out_of_msi_range(key: &str, raw: &str, limit: u32) -> TargetError {
  ContextError::InvalidSeed(format!("{}='{}': must be below {} to fit an MSI version", key, raw, limit)).into()
}

/// Parse a seeded `major.minor.patch` triple.
fn component_seed(ctx: &TargetContext, key: &str, default: ComponentVersion) -> Result<ComponentVersion, TargetError> {
  let Some(raw) = ctx.contains(key).then(|| ctx.get_str(key)).transpose()? else {
    return Ok(default);
  };
  let version = parse_component(&raw)
    .ok_or_else(|| ContextError::InvalidSeed(format!("{}='{}': expected major.minor.patch", key, raw)))?;
  if [version.major, version.minor, version.patch].iter().any(|&n| n >= MSI_FIELD_LIMIT) {
    return Err(out_of_msi_range(key, &raw, MSI_FIELD_LIMIT));
  }
  Ok(version)
}

fn parse_component(raw: &str) -> Option<ComponentVersion> {
  let mut parts = raw.trim().split('.').map(|p| p.parse::<u32>().ok());
  let version = ComponentVersion::new(parts.next()??, parts.next()??, parts.next()??);
  parts.next().is_none().then_some(version)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use targetry_lib::context::BuildContext;
  use targetry_lib::platform::{Arch, Platform};
  use tempfile::TempDir;

  fn windows_build(repo: &Path) -> Arc<BuildContext> {
    Arc::new(
      BuildContext::new(Platform::new(Arch::X86_64, Os::Windows))
        .with_configuration("Release")
        .with_repo_root(repo),
    )
  }

  #[tokio::test]
  async fn init_lays_out_artifacts_under_rid() {
    let repo = TempDir::new().unwrap();
    let build = windows_build(repo.path());
    build.seed([("CommitHash", "abc123"), ("CommitCount", "42")]);

    init(TargetContext::new("init", build.clone())).await.unwrap();

    let output = repo.path().join("artifacts").join("win7-x64");
    assert_eq!(build.get_path(keys::OUTPUT_DIR).unwrap(), output);
    assert!(output.join("corehost").is_dir());
    assert!(output.join("intermediate").join("sharedHostPublish").is_dir());
    assert_eq!(build.get_str(keys::CONFIGURATION).unwrap(), "Release");
    assert_eq!(build.get_str(keys::COMMIT_HASH).unwrap(), "abc123");

    let version = build.get_version(keys::BUILD_VERSION).unwrap();
    assert_eq!(version.nuget_version(), "1.0.0-rc2-000042");
    assert_eq!(
      build.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION).unwrap(),
      "1.0.0-rc2-000042"
    );
    assert_eq!(
      build.get_path(keys::SHARED_HOST_INSTALLER_FILE).unwrap(),
      output.join("packages").join("dotnet-host-win7-x64.1.0.1-rc2-000042.exe")
    );
  }

  #[tokio::test]
  async fn seeded_directories_win_over_defaults() {
    let repo = TempDir::new().unwrap();
    let custom = repo.path().join("elsewhere");
    let build = windows_build(repo.path());
    build.seed([("CommitHash", "abc123")]);
    build.set(keys::STAGE2_DIR, custom.clone());

    init(TargetContext::new("init", build.clone())).await.unwrap();

    assert_eq!(build.get_path(keys::STAGE2_DIR).unwrap(), custom);
    assert!(custom.is_dir());
  }

  #[tokio::test]
  async fn bad_version_seed_is_rejected() {
    let repo = TempDir::new().unwrap();
    let build = windows_build(repo.path());
    build.seed([("CommitHash", "abc123"), ("VersionMajor", "one")]);

    let err = init(TargetContext::new("init", build)).await.unwrap_err();
    assert!(err.to_string().contains("VersionMajor='one'"));
  }

  #[tokio::test]
  async fn versions_outside_msi_range_are_rejected() {
    let repo = TempDir::new().unwrap();
    let build = windows_build(repo.path());
    build.seed([("CommitHash", "abc123"), ("CommitCount", "16384")]);

    let err = init(TargetContext::new("init", build)).await.unwrap_err();
    assert!(err.to_string().contains("CommitCount='16384'"));
    assert!(err.to_string().contains("must be below 16384"));

    let build = windows_build(repo.path());
    build.seed([("CommitHash", "abc123"), ("HostVersionNumber", "1.64.0")]);
    let err = init(TargetContext::new("init", build)).await.unwrap_err();
    assert!(err.to_string().contains("HostVersionNumber='1.64.0'"));

    let build = windows_build(repo.path());
    build.seed([("CommitHash", "abc123"), ("CommitCount", "16383"), ("VersionPatch", "63")]);
    init(TargetContext::new("init", build)).await.unwrap();
  }

  #[tokio::test]
  async fn commit_hash_falls_back_outside_a_checkout() {
    let repo = TempDir::new().unwrap();
    let build = windows_build(repo.path());

    init(TargetContext::new("init", build.clone())).await.unwrap();

    assert!(!build.get_str(keys::COMMIT_HASH).unwrap().is_empty());
  }

  #[test]
  fn parse_component_requires_three_parts() {
    assert_eq!(parse_component("1.2.3"), Some(ComponentVersion::new(1, 2, 3)));
    assert_eq!(parse_component("1.2"), None);
    assert_eq!(parse_component("1.2.3.4"), None);
    assert_eq!(parse_component("1.x.3"), None);
  }
}
