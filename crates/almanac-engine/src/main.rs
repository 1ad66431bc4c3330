//! Engine binary for Almanac.
//!
//! Wires the file journal, the engine, the boundary server, the optional
//! autoplay runner and the optional Postgres archive together, then runs
//! until `Ctrl-C` or until a durability failure halts the engine.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `almanac-config.yaml` (plus `ALMANAC_*` overrides)
//! 2. Initialize structured logging (tracing)
//! 3. Open the file journal and rebuild the engine from it
//! 4. Write the world seed into a fresh journal
//! 5. Report turns left incomplete by a crash
//! 6. Start the archive mirror (when enabled)
//! 7. Start the boundary server
//! 8. Run autoplay (when enabled) or wait for shutdown

mod archiver;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Notify, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use almanac_core::config::{AlmanacConfig, LoggingConfig};
use almanac_core::operator::AutoplayOperator;
use almanac_core::{Engine, runner};
use almanac_db::JournalArchive;
use almanac_graph::GraphStore;
use almanac_journal::{FileSink, Journal};
use almanac_observer::{AppState, ServerConfig};
use almanac_types::{BranchId, EntityId, Value, keys};

use crate::archiver::ArchiveNotifier;
use crate::error::StartupError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "almanac-config.yaml";

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        journal = %config.journal.path.display(),
        fsync = config.journal.fsync,
        port = config.server.port,
        autoplay = config.autoplay.enabled,
        archive = config.archive.enabled,
        "almanac-engine starting"
    );

    // 3. Open the journal.
    let root = BranchId::new(config.world.root_branch.clone());
    let sink = FileSink::open(&config.journal.path, config.journal.fsync)?;
    let journal = Journal::open(root.clone(), Box::new(sink))?;
    let fresh = journal.entries().is_empty();
    info!(
        entries = journal.entries().len(),
        fresh,
        "Journal opened"
    );
    let store = GraphStore::new(journal).with_cache_capacity(config.journal.cache_capacity);
    let engine = Arc::new(Engine::new(store));

    // 4. Seed a fresh world.
    if fresh {
        engine.write(&root, &EntityId::Universal, keys::SEED, Value::Int(config.world.seed))?;
        info!(seed = config.world.seed, branch = %root, "World seed written");
    }

    // 5. Crash leftovers.
    for (branch, turn) in engine.incomplete_turns() {
        warn!(
            branch = %branch,
            turn,
            "turn started but never finished; POST /api/branches/{{branch}}/restart re-runs it on a fork"
        );
    }

    let mut state = AppState::new(Arc::clone(&engine));
    let operator = config
        .autoplay
        .enabled
        .then(|| Arc::new(AutoplayOperator::new(&config.autoplay)));
    if let Some(operator) = &operator {
        state = state.with_autoplay(Arc::clone(operator));
    }
    let state = Arc::new(state);

    // 6. Archive mirror.
    let archiver = if config.archive.enabled {
        start_archiver(&config, &engine, state.shutdown_signal()).await
    } else {
        None
    };

    // 7. Boundary server.
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let server = almanac_observer::spawn_observer(&server_config, Arc::clone(&state)).await?;

    // 8. Run.
    let mut shutdown = state.shutdown_signal();
    let autoplay_branch = config
        .autoplay
        .branch
        .clone()
        .map_or_else(|| root.clone(), BranchId::new);
    let crashed = engine
        .incomplete_turns()
        .into_iter()
        .any(|(branch, _)| branch == autoplay_branch);
    let operator = operator.filter(|_| {
        if crashed {
            error!(branch = %autoplay_branch, "autoplay branch holds an unfinished turn, autoplay not started");
        }
        !crashed
    });
    let outcome = match operator {
        Some(operator) => {
            let branch = autoplay_branch;
            tokio::select! {
                result = runner::run_autoplay(Arc::clone(&engine), branch, Arc::clone(&operator)) => {
                    match result {
                        Ok(result) => {
                            info!(
                                end_reason = ?result.end_reason,
                                total_turns = result.total_turns,
                                "Autoplay finished"
                            );
                            wait_for_shutdown(&mut shutdown).await;
                            Ok(())
                        }
                        Err(e) => {
                            error!(error = %e, "Autoplay failed");
                            Err(e.into())
                        }
                    }
                }
                () = wait_for_shutdown(&mut shutdown) => {
                    operator.request_stop();
                    Ok(())
                }
            }
        }
        None => {
            wait_for_shutdown(&mut shutdown).await;
            Ok(())
        }
    };

    // Stop the server and the archiver, letting each finish its work.
    state.request_shutdown();
    if let Err(e) = server.await {
        warn!(error = %e, "Boundary server task ended abnormally");
    }
    if let Some(archiver) = archiver {
        if let Err(e) = archiver.await {
            warn!(error = %e, "Archiver task ended abnormally");
        }
    }

    if engine.is_halted() {
        error!("almanac-engine stopped after a durability failure");
    } else {
        info!("almanac-engine shutdown complete");
    }
    outcome
}

/// Load configuration from [`CONFIG_FILE`], or `ALMANAC_CONFIG` when set.
///
/// A missing file means defaults; environment overrides apply either way.
fn load_config() -> Result<AlmanacConfig, StartupError> {
    let path = std::env::var("ALMANAC_CONFIG").map_or_else(|_| PathBuf::from(CONFIG_FILE), PathBuf::from);
    if path.exists() {
        Ok(AlmanacConfig::from_file(&path)?)
    } else {
        let mut config = AlmanacConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &LoggingConfig) -> Result<(), StartupError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };
    result.map_err(|e| StartupError::Logging {
        message: e.to_string(),
    })
}

/// Connect to the archive and spawn the mirror task. The archive is
/// optional: any failure here logs and leaves it off.
async fn start_archiver(
    config: &AlmanacConfig,
    engine: &Arc<Engine>,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let archive = match JournalArchive::open(
        &config.archive.database_url,
        config.archive.max_connections,
    )
    .await
    {
        Ok(archive) => archive,
        Err(e) => {
            warn!(error = %e, "archive unavailable, continuing without it");
            return None;
        }
    };

    let notify = Arc::new(Notify::new());
    engine.subscribe(Arc::new(ArchiveNotifier::new(Arc::clone(&notify))));
    let handle = tokio::spawn(archiver::run_archiver(
        Arc::clone(engine),
        archive,
        notify,
        shutdown,
    ));
    info!("Archive mirror started");
    Some(handle)
}

/// Resolve on `Ctrl-C` or when the shutdown signal flips.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "could not listen for Ctrl-C");
                // fall back to the shutdown signal alone
                let _ = shutdown.wait_for(|stop| *stop).await;
            } else {
                info!("Ctrl-C received, shutting down");
            }
        }
        _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => {
            info!("Shutdown requested");
        }
    }
}
