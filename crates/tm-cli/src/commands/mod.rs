//! CLI subcommand implementations.

pub mod entries;
pub mod purge;
pub mod tracker;
pub mod util;
