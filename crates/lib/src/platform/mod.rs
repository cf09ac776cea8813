//! Host platform description.
//!
//! The executor evaluates each target's platform gate against a [`Platform`].
//! Normally that is the detected host, but the CLI may override it to plan or
//! run a build for another platform.

pub mod arch;
pub mod os;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arch::Arch;
pub use os::Os;

const OS_RELEASE_PATH: &str = "/etc/os-release";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
  #[error("unknown operating system: {0}")]
  UnknownOs(String),

  #[error("unknown architecture: {0}")]
  UnknownArch(String),

  #[error("invalid platform triple '{0}' (expected <arch>-<os>, e.g. x86_64-linux)")]
  InvalidTriple(String),

  #[error("unsupported host platform: {os}/{arch}")]
  Unsupported { os: String, arch: String },
}

/// Platform identifier combining architecture and OS (e.g., "aarch64-darwin")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Like [`Platform::current`], but reports what was not recognised.
  pub fn detect() -> Result<Self, PlatformError> {
    Self::current().ok_or_else(|| PlatformError::Unsupported {
      os: std::env::consts::OS.to_string(),
      arch: std::env::consts::ARCH.to_string(),
    })
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }

  pub fn is_windows(&self) -> bool {
    self.os == Os::Windows
  }

  /// Generic runtime identifier for this platform.
  ///
  /// Windows always reports the `win7` baseline; other systems use their RID
  /// family (`osx-x64`, `linux-arm64`). See [`Platform::host_rid`] for the
  /// distribution-specific form used on Linux hosts.
  pub fn rid(&self) -> String {
    match self.os {
      Os::Windows => format!("win7-{}", self.arch.rid_suffix()),
      Os::MacOs | Os::Linux => format!("{}-{}", self.os.rid_family(), self.arch.rid_suffix()),
    }
  }

  /// Runtime identifier of the machine we are running on.
  ///
  /// On Linux this reads `/etc/os-release` to produce distribution RIDs such as
  /// `ubuntu.14.04-x64`, falling back to [`Platform::rid`].
  pub fn host_rid(&self) -> String {
    if self.os == Os::Linux
      && let Some(rid) = read_os_release(Path::new(OS_RELEASE_PATH)).and_then(|c| rid_from_os_release(&c, self.arch))
    {
      return rid;
    }
    self.rid()
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

impl FromStr for Platform {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (arch, os) = s
      .split_once('-')
      .ok_or_else(|| PlatformError::InvalidTriple(s.to_string()))?;
    Ok(Self::new(arch.parse()?, os.parse()?))
  }
}

/// Returns the platform triple for the current system (e.g., "aarch64-darwin")
///
/// Returns `None` if the current platform is not supported
pub fn platform_triple() -> Option<String> {
  Platform::current().map(|p| p.triple())
}

fn read_os_release(path: &Path) -> Option<String> {
  std::fs::read_to_string(path).ok()
}

/// Build a distribution RID (`<id>.<version_id>-<arch>`) from os-release content.
pub fn rid_from_os_release(content: &str, arch: Arch) -> Option<String> {
  let mut id = None;
  let mut version = None;

  for line in content.lines() {
    let Some((key, value)) = line.split_once('=') else {
      continue;
    };
    let value = value.trim().trim_matches('"');
    match key.trim() {
      "ID" => id = Some(value.to_string()),
      "VERSION_ID" => version = Some(value.to_string()),
      _ => {}
    }
  }

  let id = id.filter(|s| !s.is_empty())?;
  Some(match version.filter(|s| !s.is_empty()) {
    Some(version) => format!("{}.{}-{}", id, version, arch.rid_suffix()),
    None => format!("{}-{}", id, arch.rid_suffix()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_triple_format() {
    // Verifies the triple format is "arch-os"
    let platform = Platform::new(Arch::Aarch64, Os::MacOs);
    assert_eq!(platform.triple(), "aarch64-darwin");

    let platform = Platform::new(Arch::X86_64, Os::Linux);
    assert_eq!(platform.triple(), "x86_64-linux");
  }

  #[test]
  fn triple_round_trips_through_from_str() {
    let platform: Platform = "x86-windows".parse().unwrap();
    assert_eq!(platform, Platform::new(Arch::X86, Os::Windows));
    assert_eq!(platform.to_string().parse::<Platform>().unwrap(), platform);
  }

  #[test]
  fn invalid_triple_is_rejected() {
    assert_eq!(
      "windows".parse::<Platform>(),
      Err(PlatformError::InvalidTriple("windows".to_string()))
    );
    assert!(matches!(
      "sparc-linux".parse::<Platform>(),
      Err(PlatformError::UnknownArch(_))
    ));
  }

  #[test]
  fn windows_rid_uses_win7_baseline() {
    assert_eq!(Platform::new(Arch::X86_64, Os::Windows).rid(), "win7-x64");
    assert_eq!(Platform::new(Arch::X86, Os::Windows).rid(), "win7-x86");
    assert_eq!(Platform::new(Arch::X86_64, Os::MacOs).rid(), "osx-x64");
  }

  #[test]
  fn os_release_rid() {
    let ubuntu = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"14.04\"\n";
    assert_eq!(
      rid_from_os_release(ubuntu, Arch::X86_64).as_deref(),
      Some("ubuntu.14.04-x64")
    );

    let arch_linux = "NAME=\"Arch Linux\"\nID=arch\n";
    assert_eq!(rid_from_os_release(arch_linux, Arch::X86_64).as_deref(), Some("arch-x64"));

    assert_eq!(rid_from_os_release("NAME=nothing", Arch::X86_64), None);
  }
}
