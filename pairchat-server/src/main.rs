//! pairchat server: durable direct-message sessions with live push.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:3000, memory-only
//! cargo run --bin pairchat-server
//!
//! # Persist to a journal directory
//! cargo run --bin pairchat-server -- --data-dir /var/lib/pairchat
//!
//! # Or via environment variables
//! PAIRCHAT_ADDR=127.0.0.1:8080 PAIRCHAT_DATA_DIR=./data cargo run --bin pairchat-server
//! ```

use std::sync::Arc;

use clap::Parser;
use pairchat_server::config::{ServeCliArgs, ServerConfig};
use pairchat_server::server::{self, AppState};

#[tokio::main]
async fn main() {
    let cli = ServeCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        data_dir = ?config.data_dir,
        tokens = config.tokens.len(),
        "starting pairchat server"
    );

    let state = match AppState::open(&config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to open storage");
            std::process::exit(1);
        }
    };

    match server::start_server_with_shutdown(&config.bind_addr, state, shutdown_signal()).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
            tracing::info!("server stopped");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
