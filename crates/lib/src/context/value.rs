use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::version::{BuildVersion, HostVersion};

/// A typed value stored under a key of the build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
  String(String),
  Path(PathBuf),
  Version(BuildVersion),
  HostVersion(HostVersion),
  List(Vec<String>),
}

impl ContextValue {
  /// Short name of the variant, used in type mismatch errors.
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::String(_) => "string",
      Self::Path(_) => "path",
      Self::Version(_) => "version",
      Self::HostVersion(_) => "host version",
      Self::List(_) => "list",
    }
  }
}

impl fmt::Display for ContextValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::String(s) => f.write_str(s),
      Self::Path(p) => write!(f, "{}", p.display()),
      Self::Version(v) => write!(f, "{}", v),
      Self::HostVersion(v) => f.write_str(&v.latest_host_version()),
      Self::List(items) => f.write_str(&items.join(", ")),
    }
  }
}

impl From<String> for ContextValue {
  fn from(value: String) -> Self {
    Self::String(value)
  }
}

impl From<&str> for ContextValue {
  fn from(value: &str) -> Self {
    Self::String(value.to_string())
  }
}

impl From<PathBuf> for ContextValue {
  fn from(value: PathBuf) -> Self {
    Self::Path(value)
  }
}

impl From<&Path> for ContextValue {
  fn from(value: &Path) -> Self {
    Self::Path(value.to_path_buf())
  }
}

impl From<BuildVersion> for ContextValue {
  fn from(value: BuildVersion) -> Self {
    Self::Version(value)
  }
}

impl From<HostVersion> for ContextValue {
  fn from(value: HostVersion) -> Self {
    Self::HostVersion(value)
  }
}

impl From<Vec<String>> for ContextValue {
  fn from(value: Vec<String>) -> Self {
    Self::List(value)
  }
}
