use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Lingocast relay starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = config::ServerConfig::from_env()?;
    server::start(config).await
}
