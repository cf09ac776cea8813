mod common;
mod context_tests;
mod executor_tests;
mod process_tests;
