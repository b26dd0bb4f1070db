//! Relay Daemon - Conversation Token Broadcast Server
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:3000, OpenAI-compatible backend)
//! OPENAI_API_KEY=sk-... relay-daemon
//!
//! # Offline, echoing messages back
//! relay-daemon --backend echo
//!
//! # Custom address and config file
//! relay-daemon --bind 0.0.0.0:8080 --config /etc/relay/relay.toml
//!
//! # Verbose logging
//! RUST_LOG=debug relay-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use relay_core::backend::BackendKind;
use relay_core::config::{load_config_from_path, resolve_config_path, ConfigOverrides};
use relay_daemon::{build_router, AppState};

/// Relay Daemon - streams generated replies to every follower of a thread
#[derive(Parser, Debug)]
#[command(name = "relay-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'b', long, env = "RELAY_BIND_ADDR", value_name = "ADDR")]
    bind: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "RELAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generation backend (openai, echo)
    #[arg(long, value_name = "KIND")]
    backend: Option<BackendKind>,

    /// Model identifier passed to the backend
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Frames buffered per subscriber before old tokens are dropped
    #[arg(long, value_name = "FRAMES")]
    queue_capacity: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("relay_daemon={level},relay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config_from_path(resolve_config_path(args.config.clone()))
        .context("Failed to load relay configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(bind) = args.bind {
        overrides = overrides.with_bind_addr(bind);
    }
    if let Some(backend) = args.backend {
        overrides = overrides.with_backend(backend);
    }
    if let Some(model) = args.model {
        overrides = overrides.with_model(model);
    }
    if let Some(capacity) = args.queue_capacity {
        overrides = overrides.with_queue_capacity(capacity);
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid relay configuration")?;

    info!(
        source = %config.source(),
        config_path = ?config.config_file_path,
        backend = %config.generation.backend,
        queue_capacity = config.relay.subscriber_queue_capacity,
        "Configuration loaded"
    );

    let addr = config.bind_addr().context("Invalid bind address")?;
    let state = AppState::from_config(&config).context("Failed to create generation backend")?;
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Relay Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    match run(args).await {
        Ok(()) => {
            info!("Relay daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
