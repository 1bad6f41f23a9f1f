//! Entry point: builds a `ServerState` (the single central replica, id 0,
//! and the monotonic client-id counter — spec.md §9's "make them owned
//! fields of a `Server` structure") and serves the websocket surface in
//! front of it.

mod server;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use state::ServerState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:9001".to_string())
        .parse()
        .context("invalid BIND_ADDR")?;

    let state = ServerState::new();
    tracing::info!(%addr, "starting collaborative editor server");

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
