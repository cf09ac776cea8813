//! External process execution.
//!
//! Target bodies never spawn processes themselves; they describe the command
//! with a [`CommandSpec`] and hand it to the run's [`ProcessRunner`]. A nonzero
//! exit is turned into [`ProcessError::ExternalToolFailure`] by
//! [`ensure_successful`], which is what aborts the target.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ProcessError {
  /// The program could not be started at all.
  #[error("failed to start {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// The program ran and exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {command}{}", stderr_tail(.stderr))]
  ExternalToolFailure {
    command: String,
    code: Option<i32>,
    stderr: String,
  },
}

fn stderr_tail(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    return String::new();
  }
  let last = trimmed.lines().last().unwrap_or(trimmed);
  format!(" ({})", last)
}

/// Description of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  /// Stream stdout/stderr to the terminal instead of capturing them.
  pub forward_output: bool,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
      forward_output: false,
    }
  }

  /// Run `script` through the platform's default shell.
  pub fn shell(script: impl Into<String>) -> Self {
    let (shell, args) = get_shell();
    Self::new(shell).args(args).arg(script)
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.cwd = Some(dir.as_ref().to_path_buf());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn forward_output(mut self) -> Self {
    self.forward_output = true;
    self
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.program)?;
    for arg in &self.args {
      if arg.contains(' ') {
        write!(f, " \"{}\"", arg)?;
      } else {
        write!(f, " {}", arg)?;
      }
    }
    Ok(())
  }
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs external commands on behalf of target bodies.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
  pub fn new() -> Self {
    Self
  }

  /// Run a command to completion and return its exit code and output.
  ///
  /// A nonzero exit is *not* an error here; see [`ProcessRunner::run_checked`].
  pub async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
    info!(cmd = %spec, "executing command");

    let mut command = Command::new(&spec.program);
    command.args(&spec.args).kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
      command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
      command.env(key, value);
    }

    if spec.forward_output {
      command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
      command.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    debug!(program = %spec.program, working_dir = ?spec.cwd, "spawning process");

    let output = command.output().await.map_err(|source| ProcessError::Spawn {
      command: spec.to_string(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }

    Ok(ProcessOutput {
      code: output.status.code(),
      stdout,
      stderr,
    })
  }

  /// Run a command and fail unless it exits with status zero.
  pub async fn run_checked(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
    let output = self.run(spec).await?;
    ensure_successful(spec, output)
  }
}

/// Turn a nonzero exit into [`ProcessError::ExternalToolFailure`].
pub fn ensure_successful(spec: &CommandSpec, output: ProcessOutput) -> Result<ProcessOutput, ProcessError> {
  if output.success() {
    Ok(output)
  } else {
    Err(ProcessError::ExternalToolFailure {
      command: spec.to_string(),
      code: output.code,
      stderr: output.stderr,
    })
  }
}

/// Get the shell command and arguments for the current platform.
///
/// `/bin/sh` on Unix and PowerShell on Windows, never `$SHELL`, which may
/// source interactive profiles.
fn get_shell() -> (String, Vec<String>) {
  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
