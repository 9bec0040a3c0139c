//! # SubWatch — subscription renewal reminder engine
//!
//! Usage:
//!   subwatch run                          # Start the recurring scheduler
//!   subwatch tick                         # Run one tick now, print report
//!   subwatch test-channel -u u1 -c email  # Verify a channel's configuration
//!   subwatch stats -u u1                  # Reminder stats for one user

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use subwatch_channels::ProviderAdapterFactory;
use subwatch_core::config::EngineConfig;
use subwatch_core::traits::PreferenceStore;
use subwatch_core::types::ChannelKind;
use subwatch_engine::{FileStore, ReminderScheduler, SqliteLedger, SystemClock};

#[derive(Parser)]
#[command(name = "subwatch", version, about = "🔔 SubWatch — renewal reminder engine")]
struct Cli {
    /// Path to config.toml (default: ~/.subwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the recurring scheduler and run until interrupted.
    Run,
    /// Run one out-of-band tick and print the report.
    Tick,
    /// Verify a channel's configuration without sending a reminder.
    TestChannel {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        channel: ChannelKind,
    },
    /// Print reminder statistics for a user.
    Stats {
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "subwatch=debug" } else { "subwatch=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::load().context("loading config")?,
    };

    if let Some(parent) = std::path::Path::new(&config.ledger_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(FileStore::load(std::path::Path::new(&config.data_dir))?);
    let ledger = Arc::new(SqliteLedger::open(std::path::Path::new(&config.ledger_path))?);
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        store.clone(),
        ledger,
        Arc::new(ProviderAdapterFactory),
        Arc::new(SystemClock),
        Duration::from_secs(config.tick_interval_secs),
        Duration::from_secs(config.startup_delay_secs),
    ));

    match cli.command {
        Command::Run => {
            scheduler.start();
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupt received; finishing the in-flight tick");
            scheduler.stop().await;
        }
        Command::Tick => {
            let report = scheduler.run_tick_now().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::TestChannel { user, channel } => {
            let Some(prefs) = store.get_preferences(&user).await? else {
                bail!("no preferences found for user '{user}'");
            };
            let check = scheduler.test_channel(channel, &prefs).await;
            println!("{}", serde_json::to_string_pretty(&check)?);
            if !check.success {
                std::process::exit(1);
            }
        }
        Command::Stats { user } => {
            let stats = scheduler.reminder_stats(&user).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
