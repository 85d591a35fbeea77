//! Cozy Casino Server
//!
//! Builds the store and play engine, then serves WebSocket clients until
//! Ctrl-C.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cozy_casino::{
    VERSION,
    DeterministicRng, MemoryStore, PlayEngine,
    network::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Cozy Casino Server v{}", VERSION);

    let config = ServerConfig::from_env().context("reading configuration")?;

    let rng = match config.rng_seed {
        Some(seed) => {
            info!("RNG seeded with {}", seed);
            DeterministicRng::new(seed)
        }
        None => DeterministicRng::from_entropy(),
    };

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(PlayEngine::new(store, rng));
    let server = Arc::new(GameServer::new(config, engine));

    let shutdown = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            shutdown.shutdown();
        }
    });

    server.run().await.context("running server")?;
    info!("Server stopped");
    Ok(())
}
