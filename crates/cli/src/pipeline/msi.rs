//! Windows installers: MSIs and the shared framework bundle, built by the
//! WiX driven PowerShell scripts under `packaging/windows`.

use std::path::{Path, PathBuf};

use targetry_lib::context::TargetContext;
use targetry_lib::files;
use targetry_lib::process::CommandSpec;
use targetry_lib::target::TargetError;
use tracing::info;

use super::{SHARED_FRAMEWORK_NAME, SHARED_FX_BRAND_NAME, SHARED_HOST_BRAND_NAME, dir, keys};

const ENGINE: &str = "engine.exe";

pub async fn init_msi(ctx: TargetContext) -> Result<(), TargetError> {
  let bundle = ctx.get_path(keys::COMBINED_FRAMEWORK_HOST_INSTALLER_FILE)?;
  let host_msi = ctx.get_path(keys::SHARED_HOST_INSTALLER_FILE)?.with_extension("msi");
  let framework_msi = ctx.get_path(keys::SHARED_FRAMEWORK_INSTALLER_FILE)?.with_extension("msi");
  let engine = engine_name(&bundle)?;

  let build_version = ctx.get_version(keys::BUILD_VERSION)?;

  let wix_root = ctx.get_path(keys::WIX_ROOT)?;
  if !wix_root.join("candle.exe").is_file() {
    return Err(TargetError::failed(format!(
      "WiX toolset not found: {} has no candle.exe",
      wix_root.display()
    )));
  }

  ctx.set(keys::SHARED_FRAMEWORK_BUNDLE, bundle);
  ctx.set(keys::SHARED_HOST_MSI, host_msi);
  ctx.set(keys::SHARED_FRAMEWORK_MSI, framework_msi);
  ctx.set(keys::SHARED_FRAMEWORK_ENGINE, engine);
  ctx.set(keys::MSI_VERSION, build_version.msi_version());
  ctx.set(keys::CLI_DISPLAY_VERSION, build_version.simple_version());
  ctx.set(keys::CLI_NUGET_VERSION, build_version.nuget_version());
  Ok(())
}

/// `<dir>/<bundle stem>-engine.exe`
fn engine_name(bundle: &Path) -> Result<PathBuf, TargetError> {
  let stem = bundle
    .file_stem()
    .ok_or_else(|| TargetError::failed(format!("installer path {} has no file name", bundle.display())))?;
  let engine = format!("{}-{}", stem.to_string_lossy(), ENGINE);
  Ok(bundle.with_file_name(engine))
}

fn powershell(script: PathBuf) -> CommandSpec {
  CommandSpec::new("powershell")
    .args(["-NoProfile", "-NoLogo"])
    .arg(script.display().to_string())
}

fn display(path: &Path) -> String {
  path.display().to_string()
}

/// PowerShell receives brand names as single-quoted literals.
fn quoted(name: &str) -> String {
  format!("'{}'", name)
}

fn wix_obj_root(ctx: &TargetContext, component: &str) -> Result<PathBuf, TargetError> {
  let root = dir(ctx, keys::OUTPUT_DIR)?.join("obj").join("wix").join(component);
  files::reset_dir(&root)?;
  Ok(root)
}

pub async fn generate_shared_host_msi(ctx: TargetContext) -> Result<(), TargetError> {
  let host_version = ctx.get_host_version(keys::HOST_VERSION)?;
  let input_dir = dir(&ctx, keys::SHARED_HOST_PUBLISH_ROOT)?;
  let msi = ctx.get_path(keys::SHARED_HOST_MSI)?;
  let wix_root = ctx.get_path(keys::WIX_ROOT)?;
  let obj_root = wix_obj_root(&ctx, "sharedhost")?;
  let script = ctx
    .repo_root()
    .join("packaging")
    .join("windows")
    .join("host")
    .join("generatemsi.ps1");

  ctx
    .exec(
      powershell(script)
        .arg(display(&input_dir))
        .arg(display(&msi))
        .arg(display(&wix_root))
        .arg(quoted(SHARED_HOST_BRAND_NAME))
        .arg(host_version.msi_version())
        .arg(host_version.locked_host_version.clone())
        .arg(ctx.platform().arch.rid_suffix())
        .arg(display(&obj_root)),
    )
    .await?;

  info!(msi = %msi.display(), "shared host msi generated");
  Ok(())
}

pub async fn generate_shared_framework_msi(ctx: TargetContext) -> Result<(), TargetError> {
  let input_dir = dir(&ctx, keys::SHARED_FRAMEWORK_PUBLISH_ROOT)?;
  let version = ctx.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION)?;
  let msi = ctx.get_path(keys::SHARED_FRAMEWORK_MSI)?;
  let wix_root = ctx.get_path(keys::WIX_ROOT)?;
  let obj_root = wix_obj_root(&ctx, "sharedframework")?;
  let upgrade_code = files::guid_from_name(&display(&msi));
  let script = ctx
    .repo_root()
    .join("packaging")
    .join("windows")
    .join("sharedframework")
    .join("generatemsi.ps1");

  ctx
    .exec(
      powershell(script)
        .arg(display(&input_dir))
        .arg(display(&msi))
        .arg(display(&wix_root))
        .arg(quoted(SHARED_FX_BRAND_NAME))
        .arg(msi_file_version(&version))
        .arg(SHARED_FRAMEWORK_NAME)
        .arg(version.as_str())
        .arg(upgrade_code)
        .arg(ctx.platform().arch.rid_suffix())
        .arg(display(&obj_root)),
    )
    .await?;

  info!(msi = %msi.display(), "shared framework msi generated");
  Ok(())
}

/// Numeric part of a NuGet version (`1.0.0` of `1.0.0-rc2-000042`).
fn msi_file_version(nuget_version: &str) -> &str {
  nuget_version.split('-').next().unwrap_or(nuget_version)
}

pub async fn generate_shared_fx_bundle(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION)?;
  let framework_msi = ctx.get_path(keys::SHARED_FRAMEWORK_MSI)?;
  let host_msi = ctx.get_path(keys::SHARED_HOST_MSI)?;
  let bundle = ctx.get_path(keys::SHARED_FRAMEWORK_BUNDLE)?;
  let wix_root = ctx.get_path(keys::WIX_ROOT)?;
  let msi_version = ctx.get_str(keys::MSI_VERSION)?;
  let display_version = ctx.get_str(keys::CLI_DISPLAY_VERSION)?;
  let upgrade_code = files::guid_from_name(&display(&bundle));
  let script = ctx
    .repo_root()
    .join("packaging")
    .join("windows")
    .join("sharedframework")
    .join("generatebundle.ps1");

  ctx
    .exec(
      powershell(script)
        .arg(display(&framework_msi))
        .arg(display(&host_msi))
        .arg(display(&bundle))
        .arg(display(&wix_root))
        .arg(quoted(SHARED_FX_BRAND_NAME))
        .arg(msi_version)
        .arg(display_version)
        .arg(SHARED_FRAMEWORK_NAME)
        .arg(version)
        .arg(upgrade_code)
        .arg(ctx.platform().arch.rid_suffix()),
    )
    .await?;

  info!(bundle = %bundle.display(), "shared framework bundle generated");
  Ok(())
}
