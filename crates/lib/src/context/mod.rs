//! Run-scoped build context.
//!
//! A [`BuildContext`] is created once per invocation, before the first target
//! runs, and shared by every target of that run. Targets communicate through
//! it: a prerequisite sets a key, a dependent reads it. Reading a key nobody
//! set is the way a target notices that what it needs was never produced,
//! which is distinct from the prerequisite itself failing.
//!
//! The whole map sits behind one lock so the same context works for the
//! sequential executor and for concurrently running targets.

pub mod value;
pub mod version;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, trace};

use crate::platform::Platform;
use crate::process::{CommandSpec, ProcessError, ProcessOutput, ProcessRunner};

pub use value::ContextValue;
pub use version::{BuildVersion, ComponentVersion, HostVersion, MSI_COMMIT_COUNT_LIMIT, MSI_FIELD_LIMIT};

/// Prefix of environment variables that seed the context.
pub const ENV_PREFIX: &str = "TARGETRY_";

/// Configuration used when none is given.
pub const DEFAULT_CONFIGURATION: &str = "Debug";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
  /// A key was read before anything set it.
  #[error("missing context key '{key}'{}", required_by(.target))]
  MissingKey { key: String, target: Option<String> },

  /// A key holds a value of a different type than requested.
  #[error("context key '{key}' holds a {found}, expected a {expected}{}", required_by(.target))]
  TypeMismatch {
    key: String,
    expected: &'static str,
    found: &'static str,
    target: Option<String>,
  },

  /// A seed (KEY=VALUE pair, params file entry) could not be used.
  #[error("invalid context seed: {0}")]
  InvalidSeed(String),
}

fn required_by(target: &Option<String>) -> String {
  target
    .as_ref()
    .map(|t| format!(" (required by target '{}')", t))
    .unwrap_or_default()
}

impl ContextError {
  /// Attach the name of the target that performed the failing read.
  pub fn for_target(self, name: &str) -> Self {
    match self {
      Self::MissingKey { key, .. } => Self::MissingKey {
        key,
        target: Some(name.to_string()),
      },
      Self::TypeMismatch {
        key, expected, found, ..
      } => Self::TypeMismatch {
        key,
        expected,
        found,
        target: Some(name.to_string()),
      },
      other => other,
    }
  }
}

/// Shared key/value store plus the fixed parameters of one build run.
#[derive(Debug)]
pub struct BuildContext {
  values: RwLock<BTreeMap<String, ContextValue>>,
  platform: Platform,
  configuration: String,
  repo_root: PathBuf,
  runner: ProcessRunner,
}

impl BuildContext {
  pub fn new(platform: Platform) -> Self {
    Self {
      values: RwLock::new(BTreeMap::new()),
      platform,
      configuration: DEFAULT_CONFIGURATION.to_string(),
      repo_root: PathBuf::from("."),
      runner: ProcessRunner::new(),
    }
  }

  pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
    self.configuration = configuration.into();
    self
  }

  pub fn with_repo_root(mut self, repo_root: impl Into<PathBuf>) -> Self {
    self.repo_root = repo_root.into();
    self
  }

  /// Platform the targets of this run are gated against.
  pub fn platform(&self) -> Platform {
    self.platform
  }

  /// Build configuration name, e.g. `Debug` or `Release`.
  pub fn configuration(&self) -> &str {
    &self.configuration
  }

  pub fn repo_root(&self) -> &Path {
    &self.repo_root
  }

  pub fn runner(&self) -> &ProcessRunner {
    &self.runner
  }

  fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ContextValue>> {
    self.values.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ContextValue>> {
    self.values.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store `value` under `key`, replacing any previous value.
  pub fn set(&self, key: impl Into<String>, value: impl Into<ContextValue>) {
    let key = key.into();
    let value = value.into();
    trace!(key = %key, value = %value, "context set");
    if let Some(previous) = self.write().insert(key.clone(), value) {
      debug!(key = %key, previous = %previous, "context key overwritten");
    }
  }

  pub fn get(&self, key: &str) -> Result<ContextValue, ContextError> {
    self.read().get(key).cloned().ok_or_else(|| ContextError::MissingKey {
      key: key.to_string(),
      target: None,
    })
  }

  pub fn contains(&self, key: &str) -> bool {
    self.read().contains_key(key)
  }

  pub fn remove(&self, key: &str) -> Option<ContextValue> {
    self.write().remove(key)
  }

  /// All keys currently set, sorted.
  pub fn keys(&self) -> Vec<String> {
    self.read().keys().cloned().collect()
  }

  /// A copy of every entry, for diagnostics and reports.
  pub fn snapshot(&self) -> BTreeMap<String, ContextValue> {
    self.read().clone()
  }

  pub fn get_str(&self, key: &str) -> Result<String, ContextError> {
    match self.get(key)? {
      ContextValue::String(s) => Ok(s),
      other => Err(mismatch(key, "string", &other)),
    }
  }

  /// Read a string, or `default` if the key is absent.
  pub fn get_str_or(&self, key: &str, default: &str) -> Result<String, ContextError> {
    match self.get_str(key) {
      Err(ContextError::MissingKey { .. }) => Ok(default.to_string()),
      other => other,
    }
  }

  /// Read a path. String values (e.g. seeded from the environment) are
  /// accepted and converted.
  pub fn get_path(&self, key: &str) -> Result<PathBuf, ContextError> {
    match self.get(key)? {
      ContextValue::Path(p) => Ok(p),
      ContextValue::String(s) => Ok(PathBuf::from(s)),
      other => Err(mismatch(key, "path", &other)),
    }
  }

  pub fn get_version(&self, key: &str) -> Result<BuildVersion, ContextError> {
    match self.get(key)? {
      ContextValue::Version(v) => Ok(v),
      other => Err(mismatch(key, "version", &other)),
    }
  }

  pub fn get_host_version(&self, key: &str) -> Result<HostVersion, ContextError> {
    match self.get(key)? {
      ContextValue::HostVersion(v) => Ok(v),
      other => Err(mismatch(key, "host version", &other)),
    }
  }

  pub fn get_list(&self, key: &str) -> Result<Vec<String>, ContextError> {
    match self.get(key)? {
      ContextValue::List(items) => Ok(items),
      other => Err(mismatch(key, "list", &other)),
    }
  }

  /// Seed string values. Later pairs overwrite earlier ones.
  pub fn seed<I, K, V>(&self, pairs: I)
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut values = self.write();
    for (key, value) in pairs {
      values.insert(key.into(), ContextValue::String(value.into()));
    }
  }

  /// Seed every environment variable starting with `prefix`, prefix stripped.
  ///
  /// Returns the number of keys seeded.
  pub fn seed_from_env(&self, prefix: &str) -> usize {
    let pairs: Vec<(String, String)> = std::env::vars()
      .filter_map(|(name, value)| {
        name
          .strip_prefix(prefix)
          .filter(|key| !key.is_empty())
          .map(|key| (key.to_string(), value))
      })
      .collect();
    let count = pairs.len();
    self.seed(pairs);
    debug!(count, prefix, "seeded context from environment");
    count
  }

  /// Seed from a JSON object. Strings become strings, arrays of strings
  /// become lists; anything else is rejected.
  pub fn seed_from_json(&self, json: &serde_json::Value) -> Result<usize, ContextError> {
    let object = json
      .as_object()
      .ok_or_else(|| ContextError::InvalidSeed("params must be a JSON object".to_string()))?;

    let mut parsed = Vec::with_capacity(object.len());
    for (key, value) in object {
      let value = match value {
        serde_json::Value::String(s) => ContextValue::String(s.clone()),
        serde_json::Value::Array(items) => ContextValue::List(
          items
            .iter()
            .map(|item| {
              item
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ContextError::InvalidSeed(format!("'{}' must only contain strings", key)))
            })
            .collect::<Result<_, _>>()?,
        ),
        other => {
          return Err(ContextError::InvalidSeed(format!(
            "'{}' must be a string or a list of strings, got {}",
            key, other
          )));
        }
      };
      parsed.push((key.clone(), value));
    }

    let count = parsed.len();
    self.write().extend(parsed);
    Ok(count)
  }
}

fn mismatch(key: &str, expected: &'static str, found: &ContextValue) -> ContextError {
  ContextError::TypeMismatch {
    key: key.to_string(),
    expected,
    found: found.type_name(),
    target: None,
  }
}

/// Parse a `KEY=VALUE` assignment as given on the command line.
pub fn parse_assignment(raw: &str) -> Result<(String, String), ContextError> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
    _ => Err(ContextError::InvalidSeed(format!("expected KEY=VALUE, got '{}'", raw))),
  }
}

/// The view of the build context handed to one target body.
///
/// Reads through this view name the target in [`ContextError`]s, so a missing
/// prerequisite is reported against the target that needed it.
#[derive(Debug, Clone)]
pub struct TargetContext {
  name: Arc<str>,
  build: Arc<BuildContext>,
}

impl TargetContext {
  pub fn new(name: &str, build: Arc<BuildContext>) -> Self {
    Self {
      name: Arc::from(name),
      build,
    }
  }

  /// Name of the target being executed.
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn build(&self) -> &Arc<BuildContext> {
    &self.build
  }

  pub fn platform(&self) -> Platform {
    self.build.platform()
  }

  pub fn configuration(&self) -> &str {
    self.build.configuration()
  }

  pub fn repo_root(&self) -> &Path {
    self.build.repo_root()
  }

  pub fn set(&self, key: impl Into<String>, value: impl Into<ContextValue>) {
    self.build.set(key, value);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.build.contains(key)
  }

  pub fn get(&self, key: &str) -> Result<ContextValue, ContextError> {
    self.build.get(key).map_err(|e| e.for_target(&self.name))
  }

  pub fn get_str(&self, key: &str) -> Result<String, ContextError> {
    self.build.get_str(key).map_err(|e| e.for_target(&self.name))
  }

  pub fn get_str_or(&self, key: &str, default: &str) -> Result<String, ContextError> {
    self.build.get_str_or(key, default).map_err(|e| e.for_target(&self.name))
  }

  pub fn get_path(&self, key: &str) -> Result<PathBuf, ContextError> {
    self.build.get_path(key).map_err(|e| e.for_target(&self.name))
  }

  pub fn get_version(&self, key: &str) -> Result<BuildVersion, ContextError> {
    self.build.get_version(key).map_err(|e| e.for_target(&self.name))
  }

  pub fn get_host_version(&self, key: &str) -> Result<HostVersion, ContextError> {
    self.build.get_host_version(key).map_err(|e| e.for_target(&self.name))
  }

  pub fn get_list(&self, key: &str) -> Result<Vec<String>, ContextError> {
    self.build.get_list(key).map_err(|e| e.for_target(&self.name))
  }

  /// Run an external command, failing on a nonzero exit.
  pub async fn exec(&self, spec: CommandSpec) -> Result<ProcessOutput, ProcessError> {
    self.build.runner().run_checked(&spec).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Os};
  use serial_test::serial;

  fn ctx() -> BuildContext {
    BuildContext::new(Platform::new(Arch::X86_64, Os::Linux))
  }

  #[test]
  fn set_then_get_returns_value() {
    let ctx = ctx();
    ctx.set("CommitHash", "abc123");
    assert_eq!(ctx.get_str("CommitHash").unwrap(), "abc123");
  }

  #[test]
  fn set_overwrites_unconditionally() {
    let ctx = ctx();
    ctx.set("Configuration", "Debug");
    ctx.set("Configuration", "Release");
    assert_eq!(ctx.get_str("Configuration").unwrap(), "Release");
  }

  #[test]
  fn missing_key_names_key() {
    let err = ctx().get("HostVersion").unwrap_err();
    assert_eq!(
      err,
      ContextError::MissingKey {
        key: "HostVersion".to_string(),
        target: None,
      }
    );
    assert_eq!(err.to_string(), "missing context key 'HostVersion'");
  }

  #[test]
  fn target_view_names_requiring_target() {
    let build = Arc::new(ctx());
    let view = TargetContext::new("init-msi", build);

    let err = view.get_str("WixRoot").unwrap_err();
    assert_eq!(
      err.to_string(),
      "missing context key 'WixRoot' (required by target 'init-msi')"
    );
  }

  #[test]
  fn type_mismatch_is_reported() {
    let ctx = ctx();
    ctx.set("BuildVersion", BuildVersion::new(1, 0, 0, "rc2", 1));

    let err = ctx.get_str("BuildVersion").unwrap_err();
    assert!(matches!(
      err,
      ContextError::TypeMismatch {
        expected: "string",
        found: "version",
        ..
      }
    ));
  }

  #[test]
  fn paths_accept_string_values() {
    let ctx = ctx();
    ctx.set("Output", "/tmp/out");
    assert_eq!(ctx.get_path("Output").unwrap(), PathBuf::from("/tmp/out"));
  }

  #[test]
  fn get_str_or_only_defaults_when_missing() {
    let ctx = ctx();
    assert_eq!(ctx.get_str_or("Channel", "preview").unwrap(), "preview");

    ctx.set("Channel", PathBuf::from("/not/a/string"));
    assert!(ctx.get_str_or("Channel", "preview").is_err());
  }

  #[test]
  fn keys_are_sorted() {
    let ctx = ctx();
    ctx.set("b", "2");
    ctx.set("a", "1");
    assert_eq!(ctx.keys(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(ctx.remove("a"), Some(ContextValue::from("1")));
    assert!(!ctx.contains("a"));
  }

  #[test]
  #[serial]
  fn seed_from_env_strips_prefix() {
    temp_env::with_vars(
      [
        ("TARGETRY_CommitHash", Some("deadbeef")),
        ("TARGETRY_", Some("ignored")),
        ("UNRELATED_VAR", Some("nope")),
      ],
      || {
        let ctx = ctx();
        ctx.seed_from_env(ENV_PREFIX);
        assert_eq!(ctx.get_str("CommitHash").unwrap(), "deadbeef");
        assert!(!ctx.contains(""));
        assert!(!ctx.contains("UNRELATED_VAR"));
      },
    );
  }

  #[test]
  fn seed_from_json_accepts_strings_and_lists() {
    let ctx = ctx();
    let json = serde_json::json!({
      "CommitHash": "abc",
      "Rids": ["win7-x64", "osx.10.10-x64"],
    });

    assert_eq!(ctx.seed_from_json(&json).unwrap(), 2);
    assert_eq!(ctx.get_list("Rids").unwrap().len(), 2);
  }

  #[test]
  fn seed_from_json_rejects_numbers() {
    let ctx = ctx();
    let err = ctx.seed_from_json(&serde_json::json!({ "CommitCount": 12 })).unwrap_err();
    assert!(matches!(err, ContextError::InvalidSeed(_)));
    assert!(!ctx.contains("CommitCount"));
  }

  #[test]
  fn parse_assignment_splits_on_first_equals() {
    assert_eq!(
      parse_assignment("Flags=a=b").unwrap(),
      ("Flags".to_string(), "a=b".to_string())
    );
    assert!(parse_assignment("=value").is_err());
    assert!(parse_assignment("novalue").is_err());
  }
}
