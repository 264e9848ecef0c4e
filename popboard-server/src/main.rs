//! popboard-server - Score synchronization service
//!
//! Keeps one monotonic score per handle in durable storage and streams the
//! global ranking to every connected browser over WebSocket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use popboard_common::config::{read_config_file, ConfigOverrides, ServerConfig};
use popboard_common::store::{self, LookupPolicy};
use popboard_server::{build_router, AppState, EngineOptions, SyncEngine};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lookup policy as spelled on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LookupArg {
    ReadOnly,
    Upsert,
}

impl From<LookupArg> for LookupPolicy {
    fn from(arg: LookupArg) -> Self {
        match arg {
            LookupArg::ReadOnly => LookupPolicy::ReadOnly,
            LookupArg::Upsert => LookupPolicy::Upsert,
        }
    }
}

/// Command-line arguments for popboard-server
#[derive(Parser, Debug)]
#[command(name = "popboard-server")]
#[command(about = "Real-time score and leaderboard service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "POPBOARD_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// SQLite connection string; selects the database backend
    #[arg(long, env = "DATABASE_URL", conflicts_with = "data_file")]
    database_url: Option<String>,

    /// JSON score file; selects the file backend
    #[arg(long, env = "POPBOARD_DATA_FILE")]
    data_file: Option<PathBuf>,

    /// Keep scores in process memory only; they are lost on exit
    #[arg(long, env = "POPBOARD_IN_MEMORY", conflicts_with_all = ["database_url", "data_file"])]
    in_memory: bool,

    /// Directory of presentation assets served at /
    #[arg(long, env = "POPBOARD_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Whether plain score lookups create zero records
    #[arg(long, value_enum, env = "POPBOARD_LOOKUP_POLICY")]
    lookup_policy: Option<LookupArg>,

    /// Config file (default: platform config dir, popboard/config.toml)
    #[arg(short, long, env = "POPBOARD_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            bind_address: self.bind_address.clone(),
            database_url: self.database_url.clone(),
            data_file: self.data_file.clone(),
            in_memory: self.in_memory.then_some(true),
            static_dir: self.static_dir.clone(),
            lookup_policy: self.lookup_policy.map(LookupPolicy::from),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "popboard_server=debug,popboard_common=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting popboard-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let file_config =
        read_config_file(args.config.as_deref()).context("Failed to read config file")?;
    let config = ServerConfig::resolve(args.overrides(), file_config)
        .context("Invalid configuration")?;

    info!("Storage: {:?}", config.storage);
    info!("Static assets: {}", config.static_dir.display());

    let store = store::open(&config.storage)
        .await
        .context("Failed to open score store")?;

    let engine = Arc::new(SyncEngine::new(store, EngineOptions::from(&config)));
    let app = build_router(AppState::new(engine, config.static_dir.clone()));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("popboard-server listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popboard_common::config::StorageConfig;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "PORT",
        "POPBOARD_BIND_ADDRESS",
        "DATABASE_URL",
        "POPBOARD_DATA_FILE",
        "POPBOARD_IN_MEMORY",
        "POPBOARD_STATIC_DIR",
        "POPBOARD_LOOKUP_POLICY",
        "POPBOARD_CONFIG",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_cli_flags() {
        clear_env();
        let args = Args::try_parse_from([
            "popboard-server",
            "--port",
            "8081",
            "--database-url",
            "sqlite://scores.db",
            "--lookup-policy",
            "upsert",
        ])
        .unwrap();

        let config = ServerConfig::resolve(args.overrides(), None).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.lookup_policy, LookupPolicy::Upsert);
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite { url: "sqlite://scores.db".to_string() }
        );
    }

    #[test]
    #[serial]
    fn test_env_fallback() {
        clear_env();
        std::env::set_var("PORT", "9090");
        std::env::set_var("POPBOARD_DATA_FILE", "/tmp/scores.json");

        let args = Args::try_parse_from(["popboard-server"]).unwrap();
        clear_env();

        let config = ServerConfig::resolve(args.overrides(), None).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(
            config.storage,
            StorageConfig::File { path: PathBuf::from("/tmp/scores.json") }
        );
    }

    #[test]
    #[serial]
    fn test_backends_conflict_on_command_line() {
        clear_env();
        let result = Args::try_parse_from([
            "popboard-server",
            "--database-url",
            "sqlite://scores.db",
            "--data-file",
            "scores.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_in_memory_flag() {
        clear_env();
        let args = Args::try_parse_from(["popboard-server", "--in-memory"]).unwrap();

        let config = ServerConfig::resolve(args.overrides(), None).unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);

        let result = Args::try_parse_from([
            "popboard-server",
            "--in-memory",
            "--data-file",
            "scores.json",
        ]);
        assert!(result.is_err());
    }
}
