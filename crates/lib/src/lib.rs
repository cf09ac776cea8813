//! targetry-lib: Core types and logic for targetry
//!
//! This crate provides the pieces of a dependency-ordered build orchestrator:
//! - `Target`: a named unit of work with dependencies and a platform gate
//! - `TargetRegistry`: the frozen set of targets declared at startup
//! - `BuildContext`: typed key/value state shared by every target in a run
//! - `Executor`: resolves requested targets and runs each at most once
//! - `RunReport`: per-target records, overall outcome and exit code

pub mod context;
pub mod execute;
pub mod files;
pub mod platform;
pub mod process;
pub mod target;

pub use context::{BuildContext, ContextValue, TargetContext};
pub use execute::{ExecuteConfig, Executor, RunReport};
pub use platform::Platform;
pub use target::{PlatformGate, Target, TargetError, TargetRegistry};
