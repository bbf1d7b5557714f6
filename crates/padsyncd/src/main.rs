//! padsync daemon (padsyncd)
//!
//! The collaboration server process: WebSocket document sync on
//! `/collab/{document}`, a health/introspection endpoint, and durable
//! persistence of replica state.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (sync on 1234, health on 1235, in-memory store)
//! padsyncd
//!
//! # Custom ports
//! padsyncd --port 4000 --health-port 4001
//!
//! # With SQLite persistence
//! padsyncd --db /var/lib/padsync/padsync.db
//!
//! # With PostgreSQL persistence (postgres build)
//! padsyncd --pg postgres://padsync@localhost/padsync
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use padsync_server::{Engine, EngineConfig, HealthServer, WebSocketServer};
use padsync_storage::{MemoryStore, SqliteStore, Store};

/// padsync daemon - collaborative document synchronization server
#[derive(Parser, Debug)]
#[command(name = "padsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket port to listen on
    #[arg(long, env = "PADSYNC_PORT", default_value = "1234")]
    port: u16,

    /// Health/introspection HTTP port
    #[arg(long, env = "PADSYNC_HEALTH_PORT", default_value = "1235")]
    health_port: u16,

    /// Bind address
    #[arg(long, env = "PADSYNC_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// SQLite database path for persistence (default: in-memory only)
    #[arg(long, env = "PADSYNC_DB")]
    db: Option<PathBuf>,

    /// PostgreSQL connection URL for persistence
    #[cfg(feature = "postgres")]
    #[arg(long, env = "PADSYNC_PG_URL", conflicts_with = "db")]
    pg: Option<String>,

    /// Persistence debounce window in milliseconds
    #[arg(long, env = "PADSYNC_DEBOUNCE_MS", default_value = "2000")]
    debounce_ms: u64,

    /// Grace period before an empty room is flushed and removed, in seconds
    #[arg(long, env = "PADSYNC_IDLE_GRACE_SECS", default_value = "30")]
    idle_grace_secs: u64,

    /// TTL for stale awareness entries, in seconds
    #[arg(long, env = "PADSYNC_AWARENESS_TTL_SECS", default_value = "30")]
    awareness_ttl_secs: u64,

    /// Interval of the persistence retry sweep, in seconds
    #[arg(long, env = "PADSYNC_SWEEP_SECS", default_value = "30")]
    sweep_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PADSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner();

    let store = select_store(&args).await;
    info!(backend = store.backend(), "Persistence backend ready");

    let config = EngineConfig {
        debounce: Duration::from_millis(args.debounce_ms),
        idle_grace: Duration::from_secs(args.idle_grace_secs),
        awareness_ttl: Duration::from_secs(args.awareness_ttl_secs),
        sweep_interval: Duration::from_secs(args.sweep_secs),
    };
    let engine = Engine::new(store, config);

    info!(
        port = args.port,
        health_port = args.health_port,
        bind = %args.bind,
        debounce_ms = args.debounce_ms,
        idle_grace_secs = args.idle_grace_secs,
        "Starting padsync daemon"
    );

    let ws_addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let ws_engine = engine.clone();
    tokio::spawn(async move {
        let server = WebSocketServer::new(ws_engine, ws_addr);
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    let health_addr: SocketAddr = format!("{}:{}", args.bind, args.health_port).parse()?;
    let health_engine = engine.clone();
    tokio::spawn(async move {
        let server = HealthServer::new(health_engine, health_addr);
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Background retry/prune sweep
    tokio::spawn(engine.clone().run_sweeper());

    // Block until a termination signal, then flush everything before exit.
    wait_for_shutdown().await?;
    info!("Shutting down, flushing documents...");
    engine.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

/// Pick the persistence backend from the CLI arguments, falling back to
/// in-memory storage when a durable backend cannot be opened.
async fn select_store(args: &Args) -> Arc<dyn Store> {
    #[cfg(feature = "postgres")]
    if let Some(url) = &args.pg {
        info!("Connecting to PostgreSQL persistence");
        match padsync_storage::PostgresStore::new(url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => {
                warn!(error = %e, "Failed to connect to PostgreSQL, running in-memory only");
                return Arc::new(MemoryStore::new());
            }
        }
    }

    if let Some(db_path) = &args.db {
        info!(path = %db_path.display(), "Initializing SQLite persistence");
        match SqliteStore::new(db_path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(error = %e, "Failed to initialize SQLite, running in-memory only");
                Arc::new(MemoryStore::new())
            }
        }
    } else {
        info!("Running in-memory only (no --db specified)");
        Arc::new(MemoryStore::new())
    }
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

fn print_banner() {
    println!(
        r#"
  padsync - collaborative document synchronization
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
