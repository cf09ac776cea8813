//! Filesystem and structured-file helpers for target bodies.
//!
//! These are the leaf operations targets use to lay out artifacts: JSON
//! documents edited in place, `{Token}` templates, recursive copies and
//! directories that must start out empty.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FileError {
  #[error("{action} {path}: {source}")]
  Io {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid JSON in {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("template {path} has unresolved tokens: {}", .tokens.join(", "))]
  UnresolvedTokens { path: PathBuf, tokens: Vec<String> },
}

fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> FileError + 'a {
  move |source| FileError::Io {
    action,
    path: path.to_path_buf(),
    source,
  }
}

pub fn read_json(path: &Path) -> Result<serde_json::Value, FileError> {
  let content = fs::read_to_string(path).map_err(io_err("failed to read", path))?;
  serde_json::from_str(&content).map_err(|source| FileError::Json {
    path: path.to_path_buf(),
    source,
  })
}

/// Write `value` as indented JSON, creating parent directories.
pub fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), FileError> {
  let content = serde_json::to_string_pretty(value).map_err(|source| FileError::Json {
    path: path.to_path_buf(),
    source,
  })?;
  write_file(path, &content)
}

pub fn write_file(path: &Path, content: &str) -> Result<(), FileError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(io_err("failed to create", parent))?;
  }
  fs::write(path, content).map_err(io_err("failed to write", path))
}

/// Replace every `{Key}` in `template` with its value.
pub fn substitute(template: &str, values: &[(&str, &str)]) -> String {
  values.iter().fold(template.to_string(), |acc, (key, value)| {
    acc.replace(&format!("{{{}}}", key), value)
  })
}

/// `{Identifier}` tokens still present in `text`.
pub fn unresolved_tokens(text: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut rest = text;
  while let Some(start) = rest.find('{') {
    rest = &rest[start + 1..];
    let Some(end) = rest.find(['{', '}']) else {
      break;
    };
    let candidate = &rest[..end];
    if rest[end..].starts_with('}')
      && !candidate.is_empty()
      && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
      tokens.push(candidate.to_string());
    }
  }
  tokens
}

/// Read `source`, substitute `values`, and write the result to `dest`.
///
/// Fails if any `{Token}` is left unresolved.
pub fn render_template(source: &Path, dest: &Path, values: &[(&str, &str)]) -> Result<(), FileError> {
  let template = fs::read_to_string(source).map_err(io_err("failed to read", source))?;
  let rendered = substitute(&template, values);

  let tokens = unresolved_tokens(&rendered);
  if !tokens.is_empty() {
    return Err(FileError::UnresolvedTokens {
      path: source.to_path_buf(),
      tokens,
    });
  }

  write_file(dest, &rendered)
}

/// Remove `dir` if present and recreate it empty.
pub fn reset_dir(dir: &Path) -> Result<(), FileError> {
  if dir.exists() {
    fs::remove_dir_all(dir).map_err(io_err("failed to remove", dir))?;
  }
  fs::create_dir_all(dir).map_err(io_err("failed to create", dir))
}

pub fn remove_file_if_exists(path: &Path) -> Result<(), FileError> {
  match fs::remove_file(path) {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_err("failed to remove", path)(e)),
    _ => Ok(()),
  }
}

/// Copy a file, overwriting `dest` and creating its parent directory.
pub fn copy_file(src: &Path, dest: &Path) -> Result<(), FileError> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(io_err("failed to create", parent))?;
  }
  fs::copy(src, dest).map_err(io_err("failed to copy", src))?;
  Ok(())
}

/// Copy the tree under `src` into `dest`.
///
/// Existing files are replaced only when `overwrite` is set. Returns the
/// number of files copied.
pub fn copy_recursive(src: &Path, dest: &Path, overwrite: bool) -> Result<usize, FileError> {
  let mut copied = 0;

  for entry in WalkDir::new(src).sort_by_file_name() {
    let entry = entry.map_err(|e| FileError::Walk {
      path: src.to_path_buf(),
      message: e.to_string(),
    })?;
    let relative = entry.path().strip_prefix(src).map_err(|e| FileError::Walk {
      path: entry.path().to_path_buf(),
      message: e.to_string(),
    })?;
    let target = dest.join(relative);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(io_err("failed to create", &target))?;
    } else if overwrite || !target.exists() {
      copy_file(entry.path(), &target)?;
      copied += 1;
    }
  }

  debug!(src = %src.display(), dest = %dest.display(), copied, "copied tree");
  Ok(copied)
}

/// Files directly inside `dir` whose extension is `extension`, sorted.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, FileError> {
  let mut found = Vec::new();
  for entry in fs::read_dir(dir).map_err(io_err("failed to read", dir))? {
    let path = entry.map_err(io_err("failed to read", dir))?.path();
    if path.is_file() && path.extension().is_some_and(|e| e == extension) {
      found.push(path);
    }
  }
  found.sort();
  Ok(found)
}

/// Deterministic GUID derived from a name.
///
/// Installers use it as an upgrade code: the same product name always maps to
/// the same GUID. Formatted upper-case, `8-4-4-4-12`.
pub fn guid_from_name(name: &str) -> String {
  let digest = Sha256::digest(name.as_bytes());
  let hex = hex::encode_upper(&digest[..16]);
  format!(
    "{}-{}-{}-{}-{}",
    &hex[0..8],
    &hex[8..12],
    &hex[12..16],
    &hex[16..20],
    &hex[20..32]
  )
}
