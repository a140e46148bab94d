//! fieldsync CLI - Command-line interface for offline-first field records
//!
//! Capture fields in the field, sync them when the backend is reachable.

mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::{CommandFactory, Parser};
use fieldsync_core::SyncSettings;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{open_session, SessionOptions};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::crop::run_crop;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::errors::run_errors;
use crate::commands::history::run_history;
use crate::commands::list::run_list;
use crate::commands::share::run_share;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::{run_watch, watch_settings};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let command = match command {
        Commands::Config { command } => return run_config(command, cli.profile.as_deref()),
        Commands::Completions { shell, output } => {
            return run_completions(shell, output.as_deref());
        }
        command => command,
    };

    let settings = match &command {
        Commands::Watch { interval } => watch_settings(*interval)?,
        _ => SyncSettings::default().without_auto_sync(),
    };
    let session = open_session(SessionOptions {
        db_path: cli.db_path,
        profile: cli.profile,
        offline: cli.offline,
        settings,
    })
    .await?;

    match command {
        Commands::Add {
            name,
            farm,
            details,
        } => run_add(&session, &name, farm.as_deref(), &details).await?,
        Commands::List { json } => run_list(&session, json).await?,
        Commands::Show { id, json } => run_show(&session, &id, json).await?,
        Commands::Edit { id, name, details } => run_edit(&session, &id, name, &details).await?,
        Commands::Delete { id } => run_delete(&session, &id).await?,
        Commands::Share { id, user } => run_share(&session, &id, &user).await?,
        Commands::Crop { command } => run_crop(&session, command).await?,
        Commands::Sync => run_sync(&session).await?,
        Commands::Watch { .. } => run_watch(&session).await?,
        Commands::Status => run_status(&session).await?,
        Commands::History { limit, json } => run_history(&session, limit, json).await?,
        Commands::Errors => run_errors(&session).await?,
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn log_filter() -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match "fieldsync=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

#[cfg(test)]
mod tests;
