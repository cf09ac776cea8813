//! The host build pipeline.
//!
//! Every target the `targetry` binary knows about is registered here. Targets
//! talk to each other only through context keys (see [`keys`]): `init` lays
//! down defaults for everything that was not seeded, and later targets read
//! what they need, failing with a missing key when a prerequisite did not run.

mod compile;
mod msi;
mod pkg;
mod prepare;

use std::collections::BTreeSet;
use std::path::PathBuf;

use targetry_lib::context::TargetContext;
use targetry_lib::target::{PlatformGate, RegistryError, Target, TargetError, TargetRegistry};

/// Context keys shared between pipeline targets.
pub mod keys {
  pub const CONFIGURATION: &str = "Configuration";
  pub const COMMIT_HASH: &str = "CommitHash";
  pub const BUILD_VERSION: &str = "BuildVersion";
  pub const HOST_VERSION: &str = "HostVersion";
  pub const SHARED_FRAMEWORK_NUGET_VERSION: &str = "SharedFrameworkNugetVersion";
  pub const RID: &str = "Rid";
  pub const DOTNET: &str = "DotnetPath";

  pub const OUTPUT_DIR: &str = "OutputDirectory";
  pub const INTERMEDIATE_DIR: &str = "IntermediateDirectory";
  pub const PACKAGES_DIR: &str = "PackagesDirectory";
  pub const STAGE2_DIR: &str = "Stage2Directory";
  pub const COREHOST_LATEST: &str = "CorehostLatest";
  pub const COREHOST_LOCKED: &str = "CorehostLocked";
  pub const COREHOST_LOCAL_PACKAGES: &str = "CorehostLocalPackages";
  pub const COREHOST_DUMMY_PACKAGES: &str = "CorehostDummyPackages";
  pub const SHARED_FRAMEWORK_PUBLISH_ROOT: &str = "SharedFrameworkPublishRoot";
  pub const SHARED_HOST_PUBLISH_ROOT: &str = "SharedHostPublishRoot";
  pub const CLI_SDK_ROOT: &str = "CLISDKRoot";
  pub const SHARED_FRAMEWORK_PATH: &str = "SharedFrameworkPath";

  pub const SHARED_HOST_INSTALLER_FILE: &str = "SharedHostInstallerFile";
  pub const SHARED_FRAMEWORK_INSTALLER_FILE: &str = "SharedFrameworkInstallerFile";
  pub const COMBINED_FRAMEWORK_HOST_INSTALLER_FILE: &str = "CombinedFrameworkHostInstallerFile";
  pub const COMBINED_FRAMEWORK_SDK_HOST_INSTALLER_FILE: &str = "CombinedFrameworkSDKHostInstallerFile";

  pub const WIX_ROOT: &str = "WixRoot";
  pub const SHARED_HOST_MSI: &str = "SharedHostMsi";
  pub const SHARED_FRAMEWORK_MSI: &str = "SharedFrameworkMsi";
  pub const SHARED_FRAMEWORK_BUNDLE: &str = "SharedFrameworkBundle";
  pub const SHARED_FRAMEWORK_ENGINE: &str = "SharedFrameworkEngine";
  pub const MSI_VERSION: &str = "MsiVersion";
  pub const CLI_DISPLAY_VERSION: &str = "CliDisplayVersion";
  pub const CLI_NUGET_VERSION: &str = "CliNugetVersion";

  pub const PKGS_INTERMEDIATE_DIR: &str = "PkgsIntermediateDir";
  pub const SHARED_HOST_COMPONENT_ID: &str = "SharedHostComponentId";
  pub const SHARED_FX_COMPONENT_ID: &str = "SharedFxComponentId";
  pub const SHARED_FX_PKG_ID: &str = "SharedFxPkgId";
  pub const CLI_SDK_NUGET_VERSION: &str = "CLISdkNugetVersion";
  pub const CLI_SDK_COMPONENT_ID: &str = "CLISdkComponentId";
  pub const CLI_SDK_PKG_ID: &str = "CLISdkPkgId";
}

pub const SHARED_FRAMEWORK_NAME: &str = "Microsoft.NETCore.App";
pub const SHARED_HOST_BRAND_NAME: &str = "Microsoft .NET Core Host";
pub const SHARED_FX_BRAND_NAME: &str = "Microsoft .NET Core Shared Framework";
pub const CLI_SDK_BRAND_NAME: &str = "Microsoft .NET Core SDK";

/// Where installers put the product on macOS.
pub const OSX_INSTALL_LOCATION: &str = "/usr/local/share/dotnet";

/// Host RID -> RID of the real (non-stub) host packages built on it.
const HOST_PACKAGE_SUPPORTED_RIDS: &[(&str, &str)] = &[
  ("win7-x64", "win7-x64"),
  ("win7-x86", "win7-x86"),
  ("osx.10.10-x64", "osx.10.10-x64"),
  ("osx.10.11-x64", "osx.10.10-x64"),
  ("ubuntu.14.04-x64", "ubuntu.14.04-x64"),
  ("centos.7-x64", "rhel.7-x64"),
  ("rhel.7-x64", "rhel.7-x64"),
  ("rhel.7.2-x64", "rhel.7-x64"),
  ("debian.8-x64", "debian.8-x64"),
];

/// Package RID produced on a host with runtime identifier `rid`.
pub fn host_package_rid(rid: &str) -> Result<&'static str, TargetError> {
  HOST_PACKAGE_SUPPORTED_RIDS
    .iter()
    .find(|(host, _)| *host == rid)
    .map(|(_, package)| *package)
    .ok_or_else(|| TargetError::failed(format!("no host packages are produced for runtime '{}'", rid)))
}

/// Every package RID the host packages ship for, sorted.
pub fn host_package_rids() -> BTreeSet<&'static str> {
  HOST_PACKAGE_SUPPORTED_RIDS.iter().map(|(_, package)| *package).collect()
}

/// Read a directory from the context.
fn dir(ctx: &TargetContext, key: &str) -> Result<PathBuf, TargetError> {
  Ok(ctx.get_path(key)?)
}

/// Register the whole pipeline.
pub fn registry() -> Result<TargetRegistry, RegistryError> {
  let mut builder = TargetRegistry::builder();

  builder
    .add(Target::new("init", prepare::init).describe("Seed defaults and create the artifact layout"))?
    .add(
      Target::aggregate(
        "compile",
        &[
          "init",
          "compile-core-host",
          "package-pkg-projects",
          "publish-shared-framework",
        ],
      )
      .describe("Build the host and publish the shared framework"),
    )?
    .add(
      Target::new("generate-stub-host-packages", compile::generate_stub_host_packages)
        .depends_on(&["init"])
        .describe("Write stub host packages for other runtimes"),
    )?
    .add(
      Target::new("compile-core-host", compile::compile_core_host)
        .depends_on(&["init"])
        .describe("Build the native host"),
    )?
    .add(
      Target::new("package-pkg-projects", compile::package_pkg_projects)
        .depends_on(&["generate-stub-host-packages"])
        .describe("Pack the host packages"),
    )?
    .add(
      Target::new("publish-shared-framework", compile::publish_shared_framework)
        .depends_on(&["init"])
        .describe("Publish the shared framework layout"),
    )?;

  builder
    .add(
      Target::new("init-msi", msi::init_msi)
        .depends_on(&["init"])
        .gated(PlatformGate::windows())
        .describe("Derive installer paths and versions"),
    )?
    .add(
      Target::new("generate-shared-host-msi", msi::generate_shared_host_msi)
        .depends_on(&["init-msi"])
        .gated(PlatformGate::windows()),
    )?
    .add(
      Target::new("generate-shared-framework-msi", msi::generate_shared_framework_msi)
        .depends_on(&["init-msi"])
        .gated(PlatformGate::windows()),
    )?
    .add(
      Target::new("generate-shared-fx-bundle", msi::generate_shared_fx_bundle)
        .depends_on(&[
          "init-msi",
          "generate-shared-host-msi",
          "generate-shared-framework-msi",
        ])
        .gated(PlatformGate::windows()),
    )?
    .add(
      Target::aggregate(
        "generate-msis",
        &["init-msi", "generate-shared-host-msi", "generate-shared-framework-msi"],
      )
      .gated(PlatformGate::windows())
      .describe("Build all MSIs"),
    )?
    .add(
      Target::aggregate("generate-bundles", &["init-msi", "generate-shared-fx-bundle"])
        .gated(PlatformGate::windows())
        .describe("Build all installer bundles"),
    )?;

  builder
    .add(
      Target::new("init-pkg", pkg::init_pkg)
        .depends_on(&["init"])
        .gated(PlatformGate::macos())
        .describe("Derive package identifiers"),
    )?
    .add(
      Target::new("generate-shared-host-pkg", pkg::generate_shared_host_pkg)
        .depends_on(&["init-pkg"])
        .gated(PlatformGate::macos()),
    )?
    .add(
      Target::new("generate-shared-framework-pkg", pkg::generate_shared_framework_pkg)
        .depends_on(&["init-pkg"])
        .gated(PlatformGate::macos()),
    )?
    .add(
      Target::new("generate-cli-sdk-pkg", pkg::generate_cli_sdk_pkg)
        .depends_on(&["init-pkg"])
        .gated(PlatformGate::macos()),
    )?
    .add(
      Target::new(
        "generate-shared-framework-product-archive",
        pkg::generate_shared_framework_product_archive,
      )
      .depends_on(&[
        "init-pkg",
        "generate-shared-framework-pkg",
        "generate-shared-host-pkg",
      ])
      .gated(PlatformGate::macos()),
    )?
    .add(
      Target::new("generate-cli-sdk-product-archive", pkg::generate_cli_sdk_product_archive)
        .depends_on(&["init-pkg", "generate-cli-sdk-pkg"])
        .gated(PlatformGate::macos()),
    )?
    .add(
      Target::aggregate(
        "generate-pkgs",
        &[
          "init-pkg",
          "generate-shared-framework-product-archive",
          "generate-cli-sdk-product-archive",
        ],
      )
      .gated(PlatformGate::macos())
      .describe("Build all macOS packages"),
    )?;

  builder.add(
    Target::aggregate("package", &["compile", "generate-msis", "generate-bundles", "generate-pkgs"])
      .describe("Build and package everything for this platform"),
  )?;

  builder.build()
}

#[cfg(test)]
mod tests {
  use super::*;
  use targetry_lib::execute::Executor;
  use targetry_lib::platform::{Arch, Os, Platform};

  #[test]
  fn pipeline_registers_and_validates() {
    let registry = registry().unwrap();
    assert!(registry.contains("package"));
    assert_eq!(
      registry.lookup("compile").unwrap().dependencies(),
      [
        "init",
        "compile-core-host",
        "package-pkg-projects",
        "publish-shared-framework"
      ]
    );
  }

  #[test]
  fn package_plan_on_linux_skips_installers() {
    let registry = registry().unwrap();
    let plan = Executor::new(&registry)
      .plan(&["package"], &Platform::new(Arch::X86_64, Os::Linux))
      .unwrap();

    let skipped: Vec<_> = plan.iter().filter(|p| !p.runs).map(|p| p.target.as_str()).collect();
    assert!(skipped.contains(&"init-msi"));
    assert!(skipped.contains(&"generate-pkgs"));
    assert!(!skipped.contains(&"compile"));
    assert_eq!(plan.first().unwrap().target, "init");
    assert_eq!(plan.last().unwrap().target, "package");
  }

  #[test]
  fn host_package_rid_maps_distributions() {
    assert_eq!(host_package_rid("centos.7-x64").unwrap(), "rhel.7-x64");
    assert_eq!(host_package_rid("osx.10.11-x64").unwrap(), "osx.10.10-x64");
    assert!(host_package_rid("plan9-x64").is_err());
    assert_eq!(host_package_rids().len(), 6);
  }
}
