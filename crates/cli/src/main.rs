use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};

use sbm_core::{
    backup::{BackupConfig, BackupManager, ManagerHandle, ManagerRegistry},
    settings::{self, AppConfig},
};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sbm", version, about = "Keeps safe copies of Stationeers autosaves")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the autosave folder until interrupted (default).
    Run,
    /// Print the backups found in the safe-backup folder.
    List {
        /// Number of most recent backups to show (0 for all).
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Write the default settings file and print its location.
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = settings::ensure_default_config()?;
    if let Some(Command::InitConfig) = cli.command {
        println!("{}", path.display());
        return Ok(());
    }

    let config = AppConfig::load()?;
    init_logging(&config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::List { limit, json } => list(&config, limit, json),
        Command::InitConfig => Ok(()),
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let registry = ManagerRegistry::new();
    let handle = ManagerHandle::new();
    registry.attach(&handle);

    registry.reload(BackupConfig::from_app(&config)).await;

    loop {
        match next_signal().await? {
            Signal::Reload => match AppConfig::load() {
                Ok(config) => {
                    info!("Reloading backup manager from settings");
                    registry.reload(BackupConfig::from_app(&config)).await;
                }
                Err(err) => error!(?err, "Failed to reload settings, keeping current manager"),
            },
            Signal::Terminate => break,
        }
    }

    info!("Shutting down");
    registry.shutdown().await;
    Ok(())
}

fn list(config: &AppConfig, limit: usize, json: bool) -> Result<()> {
    let manager = BackupManager::new(BackupConfig::from_app(config));
    let handle = ManagerHandle::with_manager(manager.into());

    if json {
        println!("{}", handle.list_backups_json(limit)?);
        return Ok(());
    }

    let groups = handle.list_backups(limit)?;
    if groups.is_empty() {
        println!("No valid backup files found.");
        return Ok(());
    }
    for group in groups {
        println!(
            "{:>6}  {:<16}  {}",
            group.index,
            group.kind().to_string(),
            group.mod_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

enum Signal {
    Reload,
    Terminate,
}

#[cfg(unix)]
async fn next_signal() -> Result<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
    let mut terminate = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => Ok(Signal::Terminate),
        _ = terminate.recv() => Ok(Signal::Terminate),
        _ = hangup.recv() => Ok(Signal::Reload),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> Result<Signal> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    Ok(Signal::Terminate)
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("sbm.log");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_directive()));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_ansi(false)
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
