//! macOS installers: component packages via `pkgbuild`, product archives via
//! `productbuild`.

use std::path::{Path, PathBuf};

use targetry_lib::context::TargetContext;
use targetry_lib::files;
use targetry_lib::process::CommandSpec;
use targetry_lib::target::TargetError;
use tracing::info;

use super::{
  CLI_SDK_BRAND_NAME, OSX_INSTALL_LOCATION, SHARED_FRAMEWORK_NAME, SHARED_FX_BRAND_NAME, SHARED_HOST_BRAND_NAME, dir,
  keys,
};

/// Package identifiers for one build.
#[derive(Debug, PartialEq, Eq)]
struct PkgIds {
  shared_host_component: String,
  shared_fx_component: String,
  shared_fx_pkg: String,
  cli_sdk_component: String,
  cli_sdk_pkg: String,
}

impl PkgIds {
  fn new(shared_framework_version: &str, cli_sdk_version: &str, arch: &str) -> Self {
    Self {
      shared_host_component: format!("com.microsoft.dotnet.sharedhost.component.osx.{}", arch),
      shared_fx_component: format!(
        "com.microsoft.dotnet.sharedframework.{}.{}.component.osx.{}",
        SHARED_FRAMEWORK_NAME, shared_framework_version, arch
      ),
      shared_fx_pkg: format!(
        "com.microsoft.dotnet.{}.{}.osx.{}",
        SHARED_FRAMEWORK_NAME, shared_framework_version, arch
      ),
      cli_sdk_component: format!("com.microsoft.dotnet.dev.{}.component.osx.{}", cli_sdk_version, arch),
      cli_sdk_pkg: format!("com.microsoft.dotnet.dev.{}.osx.{}", cli_sdk_version, arch),
    }
  }
}

pub async fn init_pkg(ctx: TargetContext) -> Result<(), TargetError> {
  let intermediate = dir(&ctx, keys::PACKAGES_DIR)?.join("intermediate");
  std::fs::create_dir_all(&intermediate)?;

  let shared_framework_version = ctx.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION)?;
  let cli_sdk_version = ctx.get_version(keys::BUILD_VERSION)?.nuget_version();
  let ids = PkgIds::new(
    &shared_framework_version,
    &cli_sdk_version,
    ctx.platform().arch.rid_suffix(),
  );

  ctx.set(keys::PKGS_INTERMEDIATE_DIR, intermediate);
  ctx.set(keys::SHARED_HOST_COMPONENT_ID, ids.shared_host_component);
  ctx.set(keys::SHARED_FX_COMPONENT_ID, ids.shared_fx_component);
  ctx.set(keys::SHARED_FX_PKG_ID, ids.shared_fx_pkg);
  ctx.set(keys::CLI_SDK_NUGET_VERSION, cli_sdk_version);
  ctx.set(keys::CLI_SDK_COMPONENT_ID, ids.cli_sdk_component);
  ctx.set(keys::CLI_SDK_PKG_ID, ids.cli_sdk_pkg);
  Ok(())
}

fn osx_packaging(ctx: &TargetContext, component: &str) -> PathBuf {
  ctx.repo_root().join("packaging").join("osx").join(component)
}

/// `pkgbuild` one component rooted at `root` into the intermediate directory.
async fn pkgbuild(ctx: &TargetContext, root: &Path, identifier: &str, version: &str, scripts: &Path) -> Result<(), TargetError> {
  let out = dir(ctx, keys::PKGS_INTERMEDIATE_DIR)?.join(format!("{}.pkg", identifier));

  ctx
    .exec(
      CommandSpec::new("pkgbuild")
        .arg("--root")
        .arg(root.display().to_string())
        .args(["--identifier", identifier])
        .args(["--version", version])
        .args(["--install-location", OSX_INSTALL_LOCATION])
        .arg("--scripts")
        .arg(scripts.display().to_string())
        .arg(out.display().to_string()),
    )
    .await?;

  info!(package = %out.display(), "component package built");
  Ok(())
}

pub async fn generate_shared_host_pkg(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_host_version(keys::HOST_VERSION)?.locked_host_version;
  let root = dir(&ctx, keys::SHARED_HOST_PUBLISH_ROOT)?;
  let id = ctx.get_str(keys::SHARED_HOST_COMPONENT_ID)?;
  let scripts = osx_packaging(&ctx, "sharedhost").join("scripts");
  pkgbuild(&ctx, &root, &id, &version, &scripts).await
}

pub async fn generate_shared_framework_pkg(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION)?;
  let root = dir(&ctx, keys::SHARED_FRAMEWORK_PUBLISH_ROOT)?;
  let id = ctx.get_str(keys::SHARED_FX_COMPONENT_ID)?;
  let scripts = osx_packaging(&ctx, "sharedframework").join("scripts");
  pkgbuild(&ctx, &root, &id, &version, &scripts).await
}

pub async fn generate_cli_sdk_pkg(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_str(keys::CLI_SDK_NUGET_VERSION)?;
  let root = dir(&ctx, keys::CLI_SDK_ROOT)?;
  let id = ctx.get_str(keys::CLI_SDK_COMPONENT_ID)?;
  let scripts = osx_packaging(&ctx, "clisdk").join("scripts");
  pkgbuild(&ctx, &root, &id, &version, &scripts).await
}

/// Where a product archive's distribution comes from and goes to.
struct Distribution<'a> {
  /// Directory under `packaging/osx`.
  component: &'a str,
  template: &'a str,
  formatted: &'a str,
}

/// Render a distribution template and `productbuild` it into `out`.
async fn product_archive(
  ctx: &TargetContext,
  distribution: Distribution<'_>,
  values: &[(&str, &str)],
  identifier: &str,
  version: &str,
  out: &Path,
) -> Result<(), TargetError> {
  let intermediate = dir(ctx, keys::PKGS_INTERMEDIATE_DIR)?;
  let packaging = osx_packaging(ctx, distribution.component);
  let formatted = intermediate.join(distribution.formatted);
  files::render_template(&packaging.join(distribution.template), &formatted, values)?;

  ctx
    .exec(
      CommandSpec::new("productbuild")
        .args(["--version", version])
        .args(["--identifier", identifier])
        .arg("--package-path")
        .arg(intermediate.display().to_string())
        .arg("--resources")
        .arg(packaging.join("resources").display().to_string())
        .arg("--distribution")
        .arg(formatted.display().to_string())
        .arg(out.display().to_string()),
    )
    .await?;

  info!(archive = %out.display(), "product archive built");
  Ok(())
}

pub async fn generate_shared_framework_product_archive(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION)?;
  let fx_component = ctx.get_str(keys::SHARED_FX_COMPONENT_ID)?;
  let host_component = ctx.get_str(keys::SHARED_HOST_COMPONENT_ID)?;
  let pkg_id = ctx.get_str(keys::SHARED_FX_PKG_ID)?;
  let out = ctx.get_path(keys::COMBINED_FRAMEWORK_HOST_INSTALLER_FILE)?;

  product_archive(
    &ctx,
    Distribution {
      component: "sharedframework",
      template: "shared-framework-distribution-template.xml",
      formatted: "shared-framework-formatted-distribution.xml",
    },
    &[
      ("SharedFxComponentId", fx_component.as_str()),
      ("SharedHostComponentId", host_component.as_str()),
      ("SharedFrameworkNugetName", SHARED_FRAMEWORK_NAME),
      ("SharedFrameworkNugetVersion", version.as_str()),
      ("SharedFxBrandName", SHARED_FX_BRAND_NAME),
      ("SharedHostBrandName", SHARED_HOST_BRAND_NAME),
    ],
    &pkg_id,
    &version,
    &out,
  )
  .await
}

pub async fn generate_cli_sdk_product_archive(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_str(keys::CLI_SDK_NUGET_VERSION)?;
  let fx_component = ctx.get_str(keys::SHARED_FX_COMPONENT_ID)?;
  let host_component = ctx.get_str(keys::SHARED_HOST_COMPONENT_ID)?;
  let sdk_component = ctx.get_str(keys::CLI_SDK_COMPONENT_ID)?;
  let pkg_id = ctx.get_str(keys::CLI_SDK_PKG_ID)?;
  let out = ctx.get_path(keys::COMBINED_FRAMEWORK_SDK_HOST_INSTALLER_FILE)?;

  product_archive(
    &ctx,
    Distribution {
      component: "clisdk",
      template: "Distribution-Template",
      formatted: "CLI-SDK-Formatted-Distribution-Template.xml",
    },
    &[
      ("SharedFxComponentId", fx_component.as_str()),
      ("SharedHostComponentId", host_component.as_str()),
      ("CLISdkComponentId", sdk_component.as_str()),
      ("CLISdkNugetVersion", version.as_str()),
      ("CLISdkBrandName", CLI_SDK_BRAND_NAME),
      ("SharedFxBrandName", SHARED_FX_BRAND_NAME),
      ("SharedHostBrandName", SHARED_HOST_BRAND_NAME),
    ],
    &pkg_id,
    &version,
    &out,
  )
  .await
}
