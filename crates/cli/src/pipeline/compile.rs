//! Native host build, host packages and the shared framework layout.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use targetry_lib::context::TargetContext;
use targetry_lib::files;
use targetry_lib::platform::{Arch, Os, Platform};
use targetry_lib::process::CommandSpec;
use targetry_lib::target::TargetError;
use tracing::{debug, info, warn};

use super::{SHARED_FRAMEWORK_NAME, dir, host_package_rid, host_package_rids, keys};

/// Host binary file names for one platform.
struct HostBinaries {
  dotnet: String,
  fxr: String,
  policy: String,
}

impl HostBinaries {
  fn for_os(os: Os) -> Self {
    let (prefix, suffix) = os.dynamic_lib_affixes();
    Self {
      dotnet: format!("dotnet{}", os.exe_suffix()),
      fxr: format!("{}hostfxr{}", prefix, suffix),
      policy: format!("{}hostpolicy{}", prefix, suffix),
    }
  }
}

/// RID the current build's packages and shared framework are produced for.
fn package_platform_rid(ctx: &TargetContext) -> Result<&'static str, TargetError> {
  let rid = ctx.get_str(keys::RID)?;
  host_package_rid(&rid)
}

pub async fn generate_stub_host_packages(ctx: TargetContext) -> Result<(), TargetError> {
  let host_version = ctx.get_host_version(keys::HOST_VERSION)?;
  let current = package_platform_rid(&ctx)?;
  let dummy_packages = dir(&ctx, keys::COREHOST_DUMMY_PACKAGES)?;

  let mut written = 0;
  for (base_id, version) in host_version.latest_host_packages() {
    for rid in host_package_rids().into_iter().filter(|rid| *rid != current) {
      write_stub_package(&dummy_packages, &format!("runtime.{}.{}", rid, base_id), &version)?;
      written += 1;
    }
  }

  info!(count = written, skipped_rid = current, "generated stub host packages");
  Ok(())
}

/// Write the manifest of an empty placeholder package.
fn write_stub_package(dir: &Path, id: &str, version: &str) -> Result<PathBuf, TargetError> {
  let path = dir.join(format!("{}.{}.nuspec", id, version));
  let manifest = format!(
    r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Microsoft</authors>
    <description>Stub package for {id}</description>
  </metadata>
</package>
"#
  );
  files::write_file(&path, &manifest)?;
  debug!(package = id, version, "wrote stub package");
  Ok(path)
}

pub async fn compile_core_host(ctx: TargetContext) -> Result<(), TargetError> {
  let host_version = ctx.get_host_version(keys::HOST_VERSION)?;
  let configuration = ctx.get_str(keys::CONFIGURATION)?;
  let commit_hash = ctx.get_str(keys::COMMIT_HASH)?;
  let rid = ctx.get_str(keys::RID)?;
  let corehost_latest = dir(&ctx, keys::COREHOST_LATEST)?;
  let platform = ctx.platform();

  let cmake_out = corehost_latest.join("cmake");
  files::reset_dir(&cmake_out)?;
  let corehost_src = ctx.repo_root().join("src").join("corehost");

  if platform.is_windows() {
    let is_x86 = platform.arch == Arch::X86;
    let arch = if is_x86 { "x86" } else { "x64" };
    let generator = if is_x86 {
      "Visual Studio 14 2015"
    } else {
      "Visual Studio 14 2015 Win64"
    };
    let arch_macro = if is_x86 {
      "-DCLI_CMAKE_PLATFORM_ARCH_I386=1"
    } else {
      "-DCLI_CMAKE_PLATFORM_ARCH_AMD64=1"
    };

    ctx
      .exec(
        CommandSpec::new("cmake")
          .arg(corehost_src.display().to_string())
          .arg(arch_macro)
          .arg(format!("-DCLI_CMAKE_RUNTIME_ID:STRING={}", rid))
          .arg(format!("-DCLI_CMAKE_HOST_FXR_VER:STRING={}", host_version.latest_host_fxr_version()))
          .arg(format!(
            "-DCLI_CMAKE_HOST_POLICY_VER:STRING={}",
            host_version.latest_host_policy_version()
          ))
          .arg(format!("-DCLI_CMAKE_PKG_RID:STRING=win7-{}", arch))
          .arg(format!("-DCLI_CMAKE_COMMIT_HASH:STRING={}", commit_hash))
          .args(["-G", generator])
          .current_dir(&cmake_out),
      )
      .await?;

    let configuration = msbuild_configuration(&configuration);
    ctx
      .exec(
        CommandSpec::new(msbuild_path()?.display().to_string())
          .arg(cmake_out.join("ALL_BUILD.vcxproj").display().to_string())
          .arg(format!("/p:Configuration={}", configuration)),
      )
      .await?;

    let cli = cmake_out.join("cli");
    for (from, file) in [
      (cli.join(configuration), "dotnet.exe"),
      (cli.join(configuration), "dotnet.pdb"),
      (cli.join("dll").join(configuration), "hostpolicy.dll"),
      (cli.join("dll").join(configuration), "hostpolicy.pdb"),
      (cli.join("fxr").join(configuration), "hostfxr.dll"),
      (cli.join("fxr").join(configuration), "hostfxr.pdb"),
    ] {
      files::copy_file(&from.join(file), &corehost_latest.join(file))?;
    }
  } else {
    let binaries = HostBinaries::for_os(platform.os);
    ctx
      .exec(
        CommandSpec::new(corehost_src.join("build.sh").display().to_string())
          .args(["--arch", "x64"])
          .arg("--fxrver")
          .arg(host_version.latest_host_fxr_version())
          .arg("--policyver")
          .arg(host_version.latest_host_policy_version())
          .arg("--rid")
          .arg(rid)
          .arg("--commithash")
          .arg(commit_hash)
          .current_dir(&cmake_out),
      )
      .await?;

    let cli = cmake_out.join("cli");
    files::copy_file(&cli.join(&binaries.dotnet), &corehost_latest.join(&binaries.dotnet))?;
    files::copy_file(
      &cli.join("dll").join(&binaries.policy),
      &corehost_latest.join(&binaries.policy),
    )?;
    files::copy_file(&cli.join("fxr").join(&binaries.fxr), &corehost_latest.join(&binaries.fxr))?;
  }

  info!(dir = %corehost_latest.display(), "core host built");
  Ok(())
}

/// CMake names the Release configuration `RelWithDebInfo` in generated projects.
fn msbuild_configuration(configuration: &str) -> &str {
  if configuration == "Release" {
    "RelWithDebInfo"
  } else {
    configuration
  }
}

fn msbuild_path() -> Result<PathBuf, TargetError> {
  let program_files = ["ProgramFiles(x86)", "ProgramFiles"]
    .iter()
    .find_map(|var| std::env::var_os(var))
    .ok_or_else(|| TargetError::failed("neither ProgramFiles(x86) nor ProgramFiles is set"))?;
  Ok(
    PathBuf::from(program_files)
      .join("MSBuild")
      .join("14.0")
      .join("Bin")
      .join("MSBuild.exe"),
  )
}

pub async fn package_pkg_projects(ctx: TargetContext) -> Result<(), TargetError> {
  let host_version = ctx.get_host_version(keys::HOST_VERSION)?;
  let commit_hash = ctx.get_str(keys::COMMIT_HASH)?;
  let corehost_latest = dir(&ctx, keys::COREHOST_LATEST)?;
  let local_packages = dir(&ctx, keys::COREHOST_LOCAL_PACKAGES)?;
  let package_rid = package_platform_rid(&ctx)?;
  let platform = ctx.platform();

  let pkg_dir = ctx.repo_root().join("pkg");
  files::write_file(
    &pkg_dir.join("version.txt"),
    &format!("{}\n{}\n", commit_hash, host_version.latest_host_version()),
  )?;

  if platform.is_windows() {
    let arch = if platform.arch == Arch::X86 { "x86" } else { "x64" };
    // .cmd argument escaping mangles paths, so pack.cmd takes its inputs from the environment.
    ctx
      .exec(
        CommandSpec::new(pkg_dir.join("pack.cmd").display().to_string())
          .env("__WorkaroundCliCoreHostBuildArch", arch)
          .env("__WorkaroundCliCoreHostBinDir", corehost_latest.display().to_string())
          .env(
            "__WorkaroundCliCoreHostPolicyVer",
            host_version.latest_host_policy_version_no_suffix(),
          )
          .env("__WorkaroundCliCoreHostFxrVer", host_version.latest_host_fxr_version_no_suffix())
          .env("__WorkaroundCliCoreHostVer", host_version.latest_host_version_no_suffix())
          .env("__WorkaroundCliCoreHostBuildMajor", host_version.latest_host_build_major())
          .env("__WorkaroundCliCoreHostVersionTag", host_version.latest_host_prerelease())
          .forward_output(),
      )
      .await?;
  } else {
    ctx
      .exec(
        CommandSpec::new(pkg_dir.join("pack.sh").display().to_string())
          .args(["--arch", "x64"])
          .arg("--hostbindir")
          .arg(corehost_latest.display().to_string())
          .arg("--policyver")
          .arg(host_version.latest_host_policy_version_no_suffix())
          .arg("--fxrver")
          .arg(host_version.latest_host_fxr_version_no_suffix())
          .arg("--hostver")
          .arg(host_version.latest_host_version_no_suffix())
          .arg("--build")
          .arg(host_version.latest_host_build_major())
          .args(["--vertag", host_version.latest_host_prerelease()]),
      )
      .await?;
  }

  for package in files::files_with_extension(&pkg_dir.join("bin").join("packages"), "nupkg")? {
    let Some(file_name) = package.file_name() else {
      continue;
    };
    files::copy_file(&package, &local_packages.join(file_name))?;
    info!(package = %file_name.to_string_lossy(), dest = %local_packages.display(), "copied package");
  }

  for (id, version) in host_version.latest_host_packages() {
    let expected = format!("runtime.{}.{}.{}.nupkg", package_rid, id, version);
    if !local_packages.join(&expected).is_file() {
      return Err(TargetError::failed(format!("Nupkg for {} was not created.", expected)));
    }
  }
  Ok(())
}

pub async fn publish_shared_framework(ctx: TargetContext) -> Result<(), TargetError> {
  let version = ctx.get_str(keys::SHARED_FRAMEWORK_NUGET_VERSION)?;
  let commit_hash = ctx.get_str(keys::COMMIT_HASH)?;
  let dotnet = ctx.get_str(keys::DOTNET)?;
  let intermediate = dir(&ctx, keys::INTERMEDIATE_DIR)?;
  let output = dir(&ctx, keys::OUTPUT_DIR)?;
  let stage2 = dir(&ctx, keys::STAGE2_DIR)?;
  let corehost_latest = dir(&ctx, keys::COREHOST_LATEST)?;
  let corehost_locked = dir(&ctx, keys::COREHOST_LOCKED)?;
  let local_packages = dir(&ctx, keys::COREHOST_LOCAL_PACKAGES)?;
  let platform = ctx.platform();
  let rid = shared_framework_rid(&ctx, &platform)?;

  let template_root = ctx.repo_root().join("src").join("sharedframework").join("framework");
  let project_root = intermediate.join("sharedFramework").join("framework");
  generate_shared_framework_project(&template_root, &project_root, &version, &rid)?;

  ctx
    .exec(
      CommandSpec::new(&dotnet)
        .args(["restore", "--verbosity", "verbose", "--disable-parallel", "--infer-runtimes"])
        .arg("--fallbacksource")
        .arg(local_packages.display().to_string())
        .current_dir(&project_root),
    )
    .await?;

  // Published into <stage2>/shared/<name>/<version> so installers can harvest the tree as is.
  let publish_root = stage2.join("shared").join(SHARED_FRAMEWORK_NAME).join(&version);
  ctx.set(keys::SHARED_FRAMEWORK_PATH, publish_root.clone());
  if publish_root.exists() {
    std::fs::remove_dir_all(&publish_root)?;
  }

  ctx
    .exec(
      CommandSpec::new(&dotnet)
        .args(["publish", "--output"])
        .arg(publish_root.display().to_string())
        .arg("-r")
        .arg(rid)
        .arg(project_root.display().to_string()),
    )
    .await?;

  for leftover in [
    format!("framework{}", platform.os.exe_suffix()),
    "framework.dll".to_string(),
    "framework.pdb".to_string(),
    "framework.runtimeconfig.json".to_string(),
  ] {
    files::remove_file_if_exists(&publish_root.join(leftover))?;
  }

  let deps_file = publish_root.join(format!("{}.deps.json", SHARED_FRAMEWORK_NAME));
  std::fs::rename(publish_root.join("framework.deps.json"), &deps_file)?;
  let mut deps = files::read_json(&deps_file)?;
  if strip_entry_point_library(&mut deps) {
    files::write_json(&deps_file, &deps)?;
  }

  generate_runtime_graph(&ctx, &dotnet, &output, &project_root, &deps_file, platform.os).await?;

  let binaries = HostBinaries::for_os(platform.os);
  files::copy_file(&corehost_locked.join(&binaries.dotnet), &publish_root.join(&binaries.dotnet))?;
  files::copy_file(
    &corehost_locked.join(&binaries.dotnet),
    &publish_root.join(format!("corehost{}", platform.os.exe_suffix())),
  )?;
  files::copy_file(&corehost_locked.join(&binaries.fxr), &publish_root.join(&binaries.fxr))?;
  // hostpolicy tracks the framework, so it comes from the fresh build rather than the locked host.
  files::copy_file(&corehost_latest.join(&binaries.policy), &publish_root.join(&binaries.policy))?;

  if publish_root.join("mscorlib.ni.dll").exists() {
    files::remove_file_if_exists(&publish_root.join("mscorlib.dll"))?;
  }

  files::write_file(&publish_root.join(".version"), &format!("{}\n{}\n", commit_hash, version))?;

  info!(path = %publish_root.display(), "shared framework published");
  Ok(())
}

/// Windows always publishes for the `win7` baseline, other hosts for their own RID.
fn shared_framework_rid(ctx: &TargetContext, platform: &Platform) -> Result<String, TargetError> {
  if platform.is_windows() {
    Ok(platform.rid())
  } else {
    Ok(ctx.get_str(keys::RID)?)
  }
}

/// Copy the project template and point it at `version` for a single `rid`.
fn generate_shared_framework_project(
  template_root: &Path,
  project_root: &Path,
  version: &str,
  rid: &str,
) -> Result<(), TargetError> {
  files::reset_dir(project_root)?;
  files::copy_recursive(template_root, project_root, true)?;

  let template = project_root.join("project.json.template");
  let mut project = files::read_json(&template)?;
  retarget_project(&mut project, version, rid)?;
  files::write_json(&project_root.join("project.json"), &project)?;
  files::remove_file_if_exists(&template)?;
  Ok(())
}

fn retarget_project(project: &mut Value, version: &str, rid: &str) -> Result<(), TargetError> {
  let object = project
    .as_object_mut()
    .ok_or_else(|| TargetError::failed("project.json.template is not a JSON object"))?;

  let dependencies = object
    .entry("dependencies")
    .or_insert_with(|| json!({}))
    .as_object_mut()
    .ok_or_else(|| TargetError::failed("'dependencies' in project.json.template is not an object"))?;
  dependencies.insert(SHARED_FRAMEWORK_NAME.to_string(), Value::String(version.to_string()));

  let mut runtimes = Map::new();
  runtimes.insert(rid.to_string(), json!({}));
  object.insert("runtimes".to_string(), Value::Object(runtimes));
  Ok(())
}

/// Remove the publishing project itself from a deps document.
///
/// Drops the first library of every entry under `targets`, and the first
/// entry under `libraries` when any target had one. Returns whether the
/// document changed.
fn strip_entry_point_library(deps: &mut Value) -> bool {
  let mut stripped = false;

  if let Some(targets) = deps.get_mut("targets").and_then(Value::as_object_mut) {
    for libraries in targets.values_mut().filter_map(Value::as_object_mut) {
      if !libraries.is_empty() {
        drop_first(libraries);
        stripped = true;
      }
    }
  }

  if stripped && let Some(libraries) = deps.get_mut("libraries").and_then(Value::as_object_mut) {
    drop_first(libraries);
  }
  stripped
}

fn drop_first(map: &mut Map<String, Value>) {
  *map = std::mem::take(map).into_iter().skip(1).collect();
}

async fn generate_runtime_graph(
  ctx: &TargetContext,
  dotnet: &str,
  output: &Path,
  project_root: &Path,
  deps_file: &Path,
  os: Os,
) -> Result<(), TargetError> {
  const GENERATOR: &str = "RuntimeGraphGenerator";

  let project = ctx.repo_root().join("tools").join(GENERATOR);
  if !project.exists() {
    warn!(project = %project.display(), "runtime graph generator not found, keeping deps file as published");
    return Ok(());
  }

  let generator_out = output.join("tools").join(GENERATOR);
  ctx
    .exec(
      CommandSpec::new(dotnet)
        .args(["publish", "--output"])
        .arg(generator_out.display().to_string())
        .arg(project.display().to_string()),
    )
    .await?;

  ctx
    .exec(
      CommandSpec::new(
        generator_out
          .join(format!("{}{}", GENERATOR, os.exe_suffix()))
          .display()
          .to_string(),
      )
      .arg("--project")
      .arg(project_root.display().to_string())
      .arg("--deps")
      .arg(deps_file.display().to_string())
      .arg(os.rid_family()),
    )
    .await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use targetry_lib::context::BuildContext;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  #[test]
  fn strip_entry_point_removes_first_target_and_library() {
    let mut deps = json!({
      "targets": {
        ".NETCoreApp,Version=v1.0": {
          "framework/1.0.0": { "dependencies": {} },
          "System.Runtime/4.1.0": {}
        },
        ".NETCoreApp,Version=v1.0/win7-x64": {
          "framework/1.0.0": {},
          "System.Runtime/4.1.0": {}
        }
      },
      "libraries": {
        "framework/1.0.0": { "type": "project" },
        "System.Runtime/4.1.0": { "type": "package" }
      }
    });

    assert!(strip_entry_point_library(&mut deps));
    for libraries in deps["targets"].as_object().unwrap().values() {
      let names: Vec<_> = libraries.as_object().unwrap().keys().collect();
      assert_eq!(names, vec!["System.Runtime/4.1.0"]);
    }
    let libraries: Vec<_> = deps["libraries"].as_object().unwrap().keys().collect();
    assert_eq!(libraries, vec!["System.Runtime/4.1.0"]);
  }

  #[test]
  fn strip_entry_point_leaves_libraries_without_targets() {
    let mut deps = json!({
      "targets": { ".NETCoreApp,Version=v1.0": {} },
      "libraries": { "framework/1.0.0": {} }
    });

    assert!(!strip_entry_point_library(&mut deps));
    assert_eq!(deps["libraries"].as_object().unwrap().len(), 1);
  }

  #[test]
  fn generated_project_targets_single_runtime() {
    let temp = TempDir::new().unwrap();
    let template_root = temp.path().join("template");
    std::fs::create_dir_all(&template_root).unwrap();
    std::fs::write(template_root.join("Program.cs"), "").unwrap();
    files::write_json(
      &template_root.join("project.json.template"),
      &json!({
        "dependencies": { "Microsoft.NETCore.App": "0.0.0", "NETStandard.Library": "1.5.0" },
        "runtimes": { "win7-x64": {}, "osx.10.10-x64": {} }
      }),
    )
    .unwrap();

    let project_root = temp.path().join("out");
    generate_shared_framework_project(&template_root, &project_root, "1.0.0-rc2-000042", "ubuntu.14.04-x64").unwrap();

    assert!(!project_root.join("project.json.template").exists());
    assert!(project_root.join("Program.cs").exists());
    let project = files::read_json(&project_root.join("project.json")).unwrap();
    assert_eq!(project["dependencies"]["Microsoft.NETCore.App"], "1.0.0-rc2-000042");
    assert_eq!(project["dependencies"]["NETStandard.Library"], "1.5.0");
    assert_eq!(project["runtimes"], json!({ "ubuntu.14.04-x64": {} }));
  }

  #[test]
  fn stub_packages_are_named_by_runtime() {
    let temp = TempDir::new().unwrap();
    let path = write_stub_package(temp.path(), "runtime.win7-x86.Microsoft.NETCore.DotNetHost", "1.0.1").unwrap();

    assert_eq!(
      path.file_name().unwrap(),
      "runtime.win7-x86.Microsoft.NETCore.DotNetHost.1.0.1.nuspec"
    );
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("<id>runtime.win7-x86.Microsoft.NETCore.DotNetHost</id>"));
  }

  #[test]
  fn release_builds_use_relwithdebinfo() {
    assert_eq!(msbuild_configuration("Release"), "RelWithDebInfo");
    assert_eq!(msbuild_configuration("Debug"), "Debug");
  }

  #[test]
  fn host_binary_names_follow_platform() {
    let linux = HostBinaries::for_os(Os::Linux);
    assert_eq!(linux.dotnet, "dotnet");
    assert_eq!(linux.fxr, "libhostfxr.so");

    let windows = HostBinaries::for_os(Os::Windows);
    assert_eq!(windows.dotnet, "dotnet.exe");
    assert_eq!(windows.policy, "hostpolicy.dll");
  }

  #[tokio::test]
  #[traced_test]
  async fn missing_runtime_graph_generator_is_skipped() {
    let repo = TempDir::new().unwrap();
    let build = Arc::new(BuildContext::new(Platform::new(Arch::X86_64, Os::Linux)).with_repo_root(repo.path()));
    let ctx = TargetContext::new("publish-shared-framework", build);
    let deps = repo.path().join("Microsoft.NETCore.App.deps.json");

    generate_runtime_graph(&ctx, "dotnet", repo.path(), repo.path(), &deps, Os::Linux)
      .await
      .unwrap();

    assert!(logs_contain("runtime graph generator not found"));
    assert!(!repo.path().join("tools").exists());
  }
}
