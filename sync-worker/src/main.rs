//! casesync-worker binary entry point.
//!
//! Usage:
//! ```bash
//! casesync-worker --config casesync.toml run
//! casesync-worker enqueue sync
//! casesync-worker enqueue push case_records
//! casesync-worker tasks
//! casesync-worker quarantine list events
//! ```

use anyhow::{bail, Context, Result};
use casesync_types::{EntityType, RecordId};
use casesync_worker::{Config, Worker};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Offline-first sync worker.
#[derive(Parser, Debug)]
#[command(name = "casesync-worker")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "casesync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker until interrupted
    Run,

    /// Queue a sync for the running worker
    Enqueue {
        /// What to run
        action: Action,

        /// Collection name; every collection when omitted
        collection: Option<String>,
    },

    /// List queued tasks
    Tasks,

    /// Remove a queued task
    Cancel {
        /// Task name, e.g. `push:events`
        name: String,
    },

    /// Inspect or release quarantined records
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCommand,
    },
}

#[derive(Subcommand, Debug)]
enum QuarantineCommand {
    /// List quarantined records of a collection
    List {
        /// Collection name
        collection: String,
    },
    /// Return a record to the push queue
    Release {
        /// Collection name
        collection: String,
        /// Record id
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Action {
    Push,
    Pull,
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Enqueue { action, collection } => enqueue(config, action, collection).await,
        Commands::Tasks => tasks(config).await,
        Commands::Cancel { name } => cancel(config, &name).await,
        Commands::Quarantine { command } => quarantine(config, command).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        return Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()));
    }
    tracing::info!("{} not found, using defaults", path.display());
    let config = Config::default();
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    let worker = Arc::new(Worker::open(config).await.context("Failed to start worker")?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("casesync-worker v{} starting", env!("CARGO_PKG_VERSION"));
    worker.run(shutdown_rx).await?;
    Ok(())
}

fn parse_entity(collection: &str) -> Result<EntityType> {
    collection
        .parse()
        .with_context(|| format!("Unknown collection {collection}"))
}

async fn enqueue(config: Config, action: Action, collection: Option<String>) -> Result<()> {
    let worker = Worker::open(config).await?;
    let coordinator = worker.coordinator();

    let task = match (action, collection) {
        (Action::Push, Some(c)) => coordinator.enqueue_push_now(parse_entity(&c)?).await?,
        (Action::Pull, Some(c)) => coordinator.enqueue_pull_now(parse_entity(&c)?).await?,
        (Action::Push, None) => coordinator.enqueue_push_all_now().await?,
        (Action::Pull, None) => coordinator.enqueue_pull_all_now().await?,
        (Action::Sync, None) => coordinator.enqueue_sync_all_now().await?,
        (Action::Sync, Some(c)) => {
            bail!("sync runs every collection; use push or pull for {c}")
        }
    };
    println!("Queued {} (generation {})", task.name, task.generation);
    Ok(())
}

async fn tasks(config: Config) -> Result<()> {
    let worker = Worker::open(config).await?;
    let tasks = worker.queue().list().await?;
    if tasks.is_empty() {
        println!("No tasks queued");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{:<28} {:?} next={} attempt={}{}",
            task.name,
            task.state,
            task.next_run_at,
            task.attempt,
            task.last_error
                .map(|e| format!(" error={e}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn cancel(config: Config, name: &str) -> Result<()> {
    let worker = Worker::open(config).await?;
    if worker.queue().remove(name).await? {
        println!("Removed {name}");
    } else {
        println!("No task named {name}");
    }
    Ok(())
}

async fn quarantine(config: Config, command: QuarantineCommand) -> Result<()> {
    let worker = Worker::open(config).await?;
    let local = worker.engine().local();

    match command {
        QuarantineCommand::List { collection } => {
            let records = local.list_quarantined(parse_entity(&collection)?).await?;
            if records.is_empty() {
                println!("Nothing quarantined in {collection}");
            }
            for record in records {
                println!(
                    "{} failures={} since={} error={}",
                    record.id,
                    record.failures,
                    record.quarantined_at,
                    record.last_error.unwrap_or_default()
                );
            }
        }
        QuarantineCommand::Release { collection, id } => {
            let entity = parse_entity(&collection)?;
            let id = RecordId::new(id)?;
            if local.release_quarantine(entity, &id).await? {
                println!("Released {id}");
            } else {
                println!("{id} is not quarantined");
            }
        }
    }
    Ok(())
}
