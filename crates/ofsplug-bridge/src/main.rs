//! Host bridge for field-service plugins.
//!
//! Accepts host connections over WebSocket and runs one plugin instance per
//! connection. The handshake's `Referer`/`Origin` headers decide where the
//! plugin's messages may go.
//!
//!   ofsplug-bridge --config bridge.toml
//!   ofsplug-bridge --listen 127.0.0.1:8765 --store /tmp/ofsplug.json

mod activity;
mod config;
mod server;

use clap::Parser;
use config::BridgeConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ofsplug-bridge", version, about)]
struct Args {
    /// TOML config file.
    #[arg(long, env = "OFSPLUG_CONFIG")]
    config: Option<PathBuf>,
    /// Address to listen on (overrides the config file).
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// Property store file (overrides the config file).
    #[arg(long)]
    store: Option<PathBuf>,
    /// Plugin tag (overrides the config file).
    #[arg(long)]
    tag: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ofsplug=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(store) = args.store {
        config.store = Some(store);
    }
    if let Some(tag) = args.tag {
        config.plugin.tag = tag;
    }

    tracing::info!("Starting plugin '{}' on {}", config.plugin.tag, config.listen);
    server::run(config).await
}
