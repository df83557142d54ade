//! Webcompat CLI library
//!
//! Command-line interface for the webcompat intervention harness: loads a
//! probe fleet, drives the dual-run engine against Firefox, and renders
//! verdicts for terminals and CI.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
pub mod runner;

pub use commands::{Cli, ColorArg, Commands, ListArgs, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity, DEFAULT_FIREFOX_MAJOR};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
