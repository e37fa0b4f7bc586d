use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use mock_provider::{AppState, World};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mock_provider", about = "Serves a mock traffic backend under /api")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "MOCK_PROVIDER_ADDR", default_value = "127.0.0.1:8000")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;

    info!("mock provider listening on http://{}", args.addr);
    tokio::select! {
        res = mock_provider::serve(listener, AppState::new(World::new())) => res.context("server failed")?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
