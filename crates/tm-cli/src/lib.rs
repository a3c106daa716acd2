//! Work timer CLI library.
//!
//! This crate provides the CLI interface for the work timer.

mod cli;
pub mod commands;
mod config;

pub use cli::{AddArgs, Cli, Commands, EditArgs};
pub use config::Config;
