//! Cellgrid node binary.
//!
//! Wires together the event journal, the grid runtime (entity stores,
//! read model and propagation consumer), the optional NATS replication
//! bridge and the HTTP surface, then serves until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `cellgrid-config.yaml`
//! 3. Open the configured journal (in-memory or `PostgreSQL`)
//! 4. Start the grid runtime over the journal
//! 5. Connect the NATS replication bridge, when a URL is configured
//! 6. Serve HTTP until shutdown
//! 7. Stop the bridge and the runtime, close the database pool

mod error;
mod nats_bridge;

use std::path::Path;
use std::sync::Arc;

use cellgrid_core::{GridConfig, GridRuntime, JournalBackend};
use cellgrid_db::{PgEventJournal, PostgresConfig, PostgresPool};
use cellgrid_observer::{AppState, ServerConfig, start_server};
use cellgrid_store::{EventJournal, MemoryJournal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::nats_bridge::NatsBridge;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "cellgrid-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the HTTP server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("cellgrid-engine starting");

    // 2. Load configuration.
    let config = GridConfig::load_or_default(Path::new(CONFIG_PATH))?;
    info!(
        region = %config.region.region(),
        journal = ?config.infrastructure.journal,
        http_port = config.infrastructure.http_port,
        nats = config.infrastructure.nats_url.is_some(),
        "Configuration loaded"
    );

    // 3. Open the journal and run the node over it.
    match config.infrastructure.journal {
        JournalBackend::Memory => {
            warn!("Using the in-memory journal, events are lost on shutdown");
            run(&config, Arc::new(MemoryJournal::new())).await?;
        }
        JournalBackend::Postgres => {
            let pg_config = PostgresConfig::new(&config.infrastructure.postgres_url)
                .with_max_connections(config.infrastructure.max_connections)
                .with_connect_timeout(config.infrastructure.connect_timeout());
            let pool = PostgresPool::connect(&pg_config).await.map_err(EngineError::from)?;
            pool.run_migrations().await.map_err(EngineError::from)?;
            info!("PostgreSQL journal ready");

            let result = run(&config, Arc::new(PgEventJournal::new(&pool))).await;
            pool.close().await;
            result?;
        }
    }

    info!("cellgrid-engine shutdown complete");
    Ok(())
}

/// Run a node over `journal` until `Ctrl-C`.
async fn run<J: EventJournal>(config: &GridConfig, journal: Arc<J>) -> Result<(), EngineError> {
    // 4. Start the grid runtime.
    let runtime = GridRuntime::start(config, journal);

    // 5. Connect the replication bridge.
    let bridge = match &config.infrastructure.nats_url {
        Some(url) => Some(NatsBridge::start(url, &runtime).await?),
        None => {
            info!("No NATS URL configured, cross-region replication disabled");
            None
        }
    };

    // 6. Serve HTTP.
    let state = Arc::new(AppState::from_runtime(&runtime));
    let server = ServerConfig::on_port(config.infrastructure.http_port);
    let served = start_server(&server, state, shutdown_signal()).await;

    // 7. Stop background work.
    if let Some(bridge) = bridge {
        bridge.shutdown();
    }
    runtime.shutdown();

    served.map_err(EngineError::from)
}

/// Resolves on `Ctrl-C`, never if the signal cannot be listened for.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
