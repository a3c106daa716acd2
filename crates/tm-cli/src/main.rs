use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tm_cli::commands::{entries, purge, tracker};
use tm_cli::{Cli, Commands, Config};
use tm_core::{Action, OwnerId, TrackerService};
use tm_db::Database;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (db, config) = open_database(cli.config.as_deref())?;
    let owner = OwnerId::new(cli.user.as_deref().unwrap_or(&config.owner))
        .context("invalid user")?;
    let service = TrackerService::new(db).max_attempts(config.max_attempts);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Status { json } => tracker::status(&mut out, &service, &owner, *json)?,
        Commands::Start => tracker::action(&mut out, &service, &owner, Action::Start)?,
        Commands::Pause => tracker::action(&mut out, &service, &owner, Action::Pause)?,
        Commands::Resume => tracker::action(&mut out, &service, &owner, Action::Resume)?,
        Commands::Reset => tracker::action(&mut out, &service, &owner, Action::Reset)?,
        Commands::Action { name } => tracker::named_action(&mut out, &service, &owner, name)?,
        Commands::Book {
            description,
            meta,
            json,
        } => tracker::book(&mut out, &service, &owner, description, meta, *json)?,
        Commands::Add(args) => entries::add(&mut out, &service, &owner, args)?,
        Commands::Entries { json } => entries::list(&mut out, &service, &owner, *json)?,
        Commands::Edit(args) => entries::edit(&mut out, &service, &owner, args)?,
        Commands::Delete { id } => entries::delete(&mut out, &service, &owner, id)?,
        Commands::Purge { yes } => purge::run(&mut out, &service, &owner, *yes)?,
    }

    out.flush()?;
    Ok(())
}
