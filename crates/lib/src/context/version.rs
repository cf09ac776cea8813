//! Version descriptors stored in the build context.
//!
//! Installer tooling needs the product version in several spellings: a
//! NuGet-style semantic version, a four part "simple" version and the packed
//! three part MSI version. Both descriptors here derive all of them from the
//! same handful of numbers so every target agrees on what is being built.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Exclusive upper bound of major, minor and patch in a packed MSI version.
pub const MSI_FIELD_LIMIT: u32 = 1 << 6;

/// Exclusive upper bound of the commit count in a packed MSI version.
pub const MSI_COMMIT_COUNT_LIMIT: u32 = 1 << 14;

/// Version of the product being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVersion {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
  /// Prerelease label such as `rc2` or `preview1`.
  pub release_suffix: String,
  /// Number of commits since the version was last bumped.
  pub commit_count: u32,
}

impl BuildVersion {
  pub fn new(major: u32, minor: u32, patch: u32, release_suffix: impl Into<String>, commit_count: u32) -> Self {
    Self {
      major,
      minor,
      patch,
      release_suffix: release_suffix.into(),
      commit_count,
    }
  }

  /// Commit count rendered as six zero-padded digits.
  pub fn commit_count_string(&self) -> String {
    format!("{:06}", self.commit_count)
  }

  /// `major.minor.patch.commitcount`
  pub fn simple_version(&self) -> String {
    format!(
      "{}.{}.{}.{}",
      self.major,
      self.minor,
      self.patch,
      self.commit_count_string()
    )
  }

  /// `suffix-commitcount`
  pub fn version_suffix(&self) -> String {
    format!("{}-{}", self.release_suffix, self.commit_count_string())
  }

  /// `major.minor.patch-suffix-commitcount`
  pub fn nuget_version(&self) -> String {
    format!("{}.{}.{}-{}", self.major, self.minor, self.patch, self.version_suffix())
  }

  pub fn msi_version(&self) -> String {
    encode_msi_version(self.major, self.minor, self.patch, self.commit_count)
  }
}

impl fmt::Display for BuildVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.nuget_version())
  }
}

/// A `major.minor.patch` triple for one host component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentVersion {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
}

impl ComponentVersion {
  pub fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self { major, minor, patch }
  }
}

impl fmt::Display for ComponentVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

pub const HOST_PACKAGE_ID: &str = "Microsoft.NETCore.DotNetHost";
pub const HOST_FXR_PACKAGE_ID: &str = "Microsoft.NETCore.DotNetHostResolver";
pub const HOST_POLICY_PACKAGE_ID: &str = "Microsoft.NETCore.DotNetHostPolicy";

/// Versions of the native host components (host, resolver, policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVersion {
  pub host: ComponentVersion,
  pub fxr: ComponentVersion,
  pub policy: ComponentVersion,
  /// Prerelease tag shared by all components; `None` for stable builds.
  pub prerelease: Option<String>,
  pub build_major: u32,
  /// Version of the host that ships in the locked (already released) layout.
  pub locked_host_version: String,
}

impl HostVersion {
  fn with_suffix(&self, component: ComponentVersion) -> String {
    match &self.prerelease {
      Some(tag) => format!("{}-{}-{}", component, tag, self.latest_host_build_major()),
      None => component.to_string(),
    }
  }

  pub fn latest_host_version(&self) -> String {
    self.with_suffix(self.host)
  }

  pub fn latest_host_fxr_version(&self) -> String {
    self.with_suffix(self.fxr)
  }

  pub fn latest_host_policy_version(&self) -> String {
    self.with_suffix(self.policy)
  }

  pub fn latest_host_version_no_suffix(&self) -> String {
    self.host.to_string()
  }

  pub fn latest_host_fxr_version_no_suffix(&self) -> String {
    self.fxr.to_string()
  }

  pub fn latest_host_policy_version_no_suffix(&self) -> String {
    self.policy.to_string()
  }

  pub fn latest_host_build_major(&self) -> String {
    format!("{:06}", self.build_major)
  }

  pub fn latest_host_prerelease(&self) -> &str {
    self.prerelease.as_deref().unwrap_or("")
  }

  /// Package id -> version for every host package this build produces.
  pub fn latest_host_packages(&self) -> BTreeMap<String, String> {
    BTreeMap::from([
      (HOST_PACKAGE_ID.to_string(), self.latest_host_version()),
      (HOST_FXR_PACKAGE_ID.to_string(), self.latest_host_fxr_version()),
      (HOST_POLICY_PACKAGE_ID.to_string(), self.latest_host_policy_version()),
    ])
  }

  pub fn msi_version(&self) -> String {
    encode_msi_version(self.host.major, self.host.minor, self.host.patch, self.build_major)
  }
}

/// Pack a product version into the three part MSI version scheme.
///
/// MSI versions are `major.minor.build` with 8, 8 and 16 bits. The product
/// version is laid out most significant first as major (6 bits), minor
/// (6 bits), patch (6 bits) and commit count (14 bits), then split back into
/// those three MSI fields. Values at or above [`MSI_FIELD_LIMIT`] and
/// [`MSI_COMMIT_COUNT_LIMIT`] overflow into the neighbouring field, so callers
/// validate them first.
pub fn encode_msi_version(major: u32, minor: u32, patch: u32, commit_count: u32) -> String {
  let packed = (major << 26) | (minor << 20) | (patch << 14) | commit_count;
  let msi_major = (packed >> 24) & 0xFF;
  let msi_minor = (packed >> 16) & 0xFF;
  let msi_build = packed & 0xFFFF;
  format!("{}.{}.{}", msi_major, msi_minor, msi_build)
}
