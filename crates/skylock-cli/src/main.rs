use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use skylock_core::config::SkylockConfig;
use skylock_core::HolderId;
use skylock_scheduler::{LeaseCoordinator, OutcomeKind, ScheduledTask, SchedulerEngine, TickReport};
use skylock_store::{LeaseStore, SqliteLeaseStore, StoreOptions};
use tracing::{info, warn};

mod leases;
mod work;

#[derive(Debug, Parser)]
#[command(name = "skylock", version, about = "Run scheduled tasks on exactly one node of a fleet")]
struct Cli {
    /// Config file (default: $SKYLOCK_CONFIG, then ~/.skylock/skylock.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the lease table if it does not exist.
    Init,
    /// Show every lease row and whether it is currently held.
    Leases {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Join the fleet: fire the configured tasks until Ctrl-C.
    Run {
        /// Holder id written to `locked_by` (overrides [instance].holder_id).
        #[arg(long)]
        holder: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skylock=info,skylock_scheduler=info,skylock_store=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > SKYLOCK_CONFIG env > ~/.skylock/skylock.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("SKYLOCK_CONFIG").ok());
    let config = SkylockConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        SkylockConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, table = %config.database.table, "opening lease database");
    let store = SqliteLeaseStore::open(db_path, StoreOptions::from_config(&config.database))
        .with_context(|| format!("failed to open lease database at {db_path}"))?;

    match cli.command {
        Command::Init => {
            info!(table = %store.table(), "lease table ready");
        }
        Command::Leases { json } => {
            let now = store.now().await?;
            let rows = store.list().await?;
            let out = if json {
                leases::render_json(&rows, now)?
            } else {
                leases::render_table(&rows, now)
            };
            println!("{out}");
        }
        Command::Run { holder } => {
            let holder = holder.map(HolderId::new).unwrap_or_else(|| config.instance.holder());
            run_fleet_member(&config, Arc::new(store), holder).await?;
        }
    }
    Ok(())
}

async fn run_fleet_member(
    config: &SkylockConfig,
    store: Arc<dyn LeaseStore>,
    holder: HolderId,
) -> anyhow::Result<()> {
    let coordinator = Arc::new(LeaseCoordinator::new(store, holder));
    let (report_tx, mut report_rx) = tokio::sync::mpsc::channel::<TickReport>(64);
    let mut engine = SchedulerEngine::new(coordinator, Some(report_tx));

    for (lock, task) in config.lock_configurations()? {
        let work = Arc::new(work::DemoWork::new(&config.database.path, task.work_for));
        engine.register(ScheduledTask::new(lock, task.schedule.clone(), work))?;
    }
    if engine.task_names().is_empty() {
        warn!("no [[tasks]] configured; nothing to schedule");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(engine.run(shutdown_rx));

    tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            match report.outcome {
                OutcomeKind::Failed => warn!(
                    task = %report.task,
                    fired_at = %report.fired_at,
                    detail = report.detail.as_deref().unwrap_or(""),
                    "tick failed"
                ),
                kind => info!(
                    task = %report.task,
                    fired_at = %report.fired_at,
                    outcome = %kind,
                    "tick"
                ),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; waiting for running work to release its leases");

    // signal the engine to stop
    let _ = shutdown_tx.send(true);
    engine.await?;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_holder() {
        let cli = Cli::try_parse_from(["skylock", "run", "--holder", "node-7"]).unwrap();
        assert!(matches!(cli.command, Command::Run { holder: Some(ref h) } if h == "node-7"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["skylock", "leases", "--json", "--config", "/tmp/s.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/s.toml"));
        assert!(matches!(cli.command, Command::Leases { json: true }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["skylock"]).is_err());
    }
}
