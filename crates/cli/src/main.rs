mod cmd;
mod output;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use targetry_lib::context::ContextError;
use targetry_lib::execute::{ResolveError, exit_code};
use targetry_lib::files::FileError;
use targetry_lib::platform::PlatformError;
use targetry_lib::target::RegistryError;

use crate::output::{OutputFormat, print_error};

/// targetry - dependency-ordered build orchestrator
#[derive(Parser)]
#[command(name = "targetry")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Raise the log level (-v info, -vv debug). RUST_LOG takes precedence.
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve and run targets with their dependencies
  Run(RunArgs),

  /// Show the resolved order and which targets would be skipped
  Plan {
    /// Targets to plan
    #[arg(required = true)]
    targets: Vec<String>,

    /// Plan for another platform, e.g. x86_64-windows
    #[arg(long)]
    platform: Option<String>,

    #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// List registered targets
  List {
    #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show host platform information
  Info {
    #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

#[derive(Args)]
pub struct RunArgs {
  /// Targets to run
  #[arg(required = true)]
  pub targets: Vec<String>,

  /// Build configuration
  #[arg(short, long, default_value = "Debug")]
  pub configuration: String,

  /// Run as if on another platform, e.g. x86_64-windows
  #[arg(long)]
  pub platform: Option<String>,

  /// Maximum targets running at once; without a value, one per CPU
  #[arg(short, long, default_value_t = 1, num_args = 0..=1, default_missing_value = "0")]
  pub jobs: usize,

  /// Seed a context value (KEY=VALUE), may be repeated
  #[arg(long = "set", value_name = "KEY=VALUE")]
  pub set: Vec<String>,

  /// JSON object of context values
  #[arg(long, value_name = "FILE")]
  pub params: Option<PathBuf>,

  /// Repository root (default: current directory)
  #[arg(long)]
  pub repo_root: Option<PathBuf>,

  /// Resolve and gate targets without running them
  #[arg(long)]
  pub dry_run: bool,

  #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
  pub format: OutputFormat,
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

/// Map an error chain to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
  for cause in err.chain() {
    if let Some(e) = cause.downcast_ref::<ResolveError>() {
      return e.exit_code();
    }
    if let Some(e) = cause.downcast_ref::<RegistryError>() {
      return e.exit_code();
    }
    if cause.is::<ContextError>() || cause.is::<PlatformError>() || cause.is::<FileError>() {
      return exit_code::INVALID_INPUT;
    }
  }
  exit_code::TARGET_FAILED
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Run(args) => cmd::cmd_run(args),
    Commands::Plan {
      targets,
      platform,
      output,
    } => cmd::cmd_plan(&targets, platform.as_deref(), output).map(|_| exit_code::SUCCESS),
    Commands::List { output } => cmd::cmd_list(output).map(|_| exit_code::SUCCESS),
    Commands::Info { output } => cmd::cmd_info(output).map(|_| exit_code::SUCCESS),
  };

  match result {
    Ok(code) => ExitCode::from(code as u8),
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::from(exit_code_for(&err) as u8)
    }
  }
}
