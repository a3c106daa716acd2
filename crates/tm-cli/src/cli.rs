//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Pause-and-resume work timer.
///
/// Tracks elapsed work time per user and books it into time entries.
#[derive(Debug, Parser)]
#[command(name = "tm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// User whose tracker and entries to act on (overrides config).
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the tracker status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the tracker.
    Start,

    /// Pause the tracker, banking the running segment.
    Pause,

    /// Resume a paused tracker.
    Resume,

    /// Reset the tracker to zero.
    Reset,

    /// Apply a tracker action by name (start, pause, resume, reset).
    Action {
        /// The action name.
        name: String,
    },

    /// Book the tracked time as a time entry and reset the tracker.
    Book {
        /// What the time was spent on.
        description: String,

        /// Metadata as KEY=VALUE (VALUE may be JSON). Repeatable.
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a manual time entry.
    Add(AddArgs),

    /// List time entries, most recent first.
    Entries {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Edit a time entry. Unspecified fields are kept.
    Edit(EditArgs),

    /// Delete a time entry.
    Delete {
        /// The entry ID.
        id: String,
    },

    /// Delete the user's tracker and all their time entries.
    Purge {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

/// Arguments for `tm add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// What the time was spent on.
    pub description: String,

    /// Duration as seconds, MM:SS or HH:MM:SS.
    #[arg(short, long)]
    pub duration: String,

    /// When the work started (ISO 8601 or relative, e.g. "2 hours ago").
    #[arg(long)]
    pub start: Option<String>,

    /// When the work ended (ISO 8601 or relative). Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Metadata as KEY=VALUE (VALUE may be JSON). Repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

/// Arguments for `tm edit`.
#[derive(Debug, Args)]
pub struct EditArgs {
    /// The entry ID.
    pub id: String,

    /// New description.
    #[arg(long)]
    pub description: Option<String>,

    /// New duration as seconds, MM:SS or HH:MM:SS.
    #[arg(short, long)]
    pub duration: Option<String>,

    /// New start time (ISO 8601 or relative).
    #[arg(long, conflicts_with = "clear_start")]
    pub start: Option<String>,

    /// Remove the start time.
    #[arg(long)]
    pub clear_start: bool,

    /// New end time (ISO 8601 or relative).
    #[arg(long)]
    pub end: Option<String>,

    /// Metadata to set as KEY=VALUE (VALUE may be JSON). Repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}
