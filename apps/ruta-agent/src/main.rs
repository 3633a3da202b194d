//! # Ruta Agent
//!
//! Headless composition root for the sync stack.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize tracing (RUST_LOG, default info,ruta=debug)              │
//! │  2. Load config (defaults → sync.toml → RUTA_* env)                     │
//! │  3. Open the replica (migrations run on connect)                        │
//! │  4. Build HttpRemote, AssetCache, ConnectivityMonitor (probed once)     │
//! │  5. Build SyncEngine                                                    │
//! │  6. Execute the command                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ruta_db::{Database, DbConfig};
use ruta_sync::{
    probe_once, spawn_http_probe, AssetCache, AutoSync, ConnectivityMonitor, HttpRemote,
    SyncConfig, SyncEngine, SyncReport,
};

const USAGE: &str = "usage: ruta-agent [--config PATH] [run|sync|full-sync|status|reset --yes]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Sync,
    FullSync,
    Status,
    Reset { confirmed: bool },
}

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut config = None;
    let mut command = None;
    let mut confirmed = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--yes" | "-y" => confirmed = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            "run" | "sync" | "full-sync" | "status" | "reset" if command.is_none() => {
                command = Some(arg);
            }
            other => return Err(format!("unexpected argument '{other}'\n{USAGE}")),
        }
    }

    let command = match command.as_deref() {
        None | Some("run") => Command::Run,
        Some("sync") => Command::Sync,
        Some("full-sync") => Command::FullSync,
        Some("status") => Command::Status,
        Some("reset") => Command::Reset { confirmed },
        Some(other) => return Err(format!("unknown command '{other}'")),
    };

    Ok(Args { config, command })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ruta=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    init_tracing();
    info!(command = ?args.command, "Starting Ruta agent");

    let config = SyncConfig::load(args.config)?;
    info!(
        device_id = %config.device_id(),
        remote = %config.base_url(),
        "Configuration loaded"
    );

    let db_path = config.store.resolve_database_path();
    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path.display(), "Local store ready");

    let remote = Arc::new(HttpRemote::new(&config.remote, config.device_id())?);
    let assets = Arc::new(AssetCache::new(config.assets.clone(), config.base_url())?);

    let health_url = config.remote.health_url();
    let connectivity = ConnectivityMonitor::new(probe_once(&health_url).await);
    info!(state = %connectivity.state(), "Connectivity probed");

    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        remote,
        assets,
        connectivity.clone(),
        config.sync.clone(),
    ));

    match args.command {
        Command::Run => {
            let probe = spawn_http_probe(
                connectivity.clone(),
                health_url,
                config.sync.probe_interval(),
            );
            let auto = AutoSync::spawn(
                Arc::clone(&engine),
                connectivity,
                config.sync.periodic_interval(),
            );

            if engine.is_auto_sync_enabled() {
                print_report(&engine.sync_now().await?);
            }

            shutdown_signal().await;
            probe.abort();
            auto.shutdown().await;
        }
        Command::Sync => print_report(&engine.sync_now().await?),
        Command::FullSync => print_report(&engine.full_sync().await?),
        Command::Status => {
            let status = engine.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Reset { confirmed } => {
            let preview = engine.reset_preview().await?;
            if preview.loses_orders() {
                eprintln!(
                    "warning: {} order(s) have not reached the server and will be lost",
                    preview.undelivered_orders
                );
            }
            if !confirmed {
                eprintln!("refusing to wipe local data without --yes");
                db.close().await;
                std::process::exit(1);
            }

            let reset = engine.reset_local().await?;
            if reset.busy {
                eprintln!("a sync is in progress; try again");
            }
            for error in &reset.errors {
                eprintln!("  {error}");
            }
            match &reset.resync {
                Some(report) => print_report(report),
                None => println!("local data cleared; run `ruta-agent full-sync` when online"),
            }
        }
    }

    db.close().await;
    info!("Agent stopped");
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.busy {
        println!("sync already in progress");
        return;
    }
    println!(
        "{} sync {}: {} ({} orders uploaded, {} rejected)",
        report.kind,
        if report.success { "ok" } else { "incomplete" },
        report.summary(),
        report.orders_uploaded,
        report.orders_rejected,
    );
    for error in &report.errors {
        println!("  {error}");
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
