use std::sync::Arc;

use anyhow::Context;
use market_chat_gateway::config::{ServerConfig, JWT_SECRET_VAR};
use market_chat_gateway::store::SqliteStore;
use market_chat_gateway::{accept_connection, ServerState};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!(
            "failed to open message store at {}",
            config.database_path.display()
        )
    })?;
    info!("Message store at {}", config.database_path.display());

    let state = Arc::new(ServerState::from_config(&config, Arc::new(store)));
    if state.auth().is_none() {
        warn!(
            "{} is not set; client-supplied user ids are trusted",
            JWT_SECRET_VAR
        );
    }

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.addr))?;

    info!("Chat gateway listening on {}", config.addr);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Accept connections
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!("New connection from {}", peer_addr);
                    tokio::spawn(accept_connection(stream, state.clone()));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    Ok(())
}
