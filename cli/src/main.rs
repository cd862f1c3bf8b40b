//! reSOURCERY development host.
//!
//! Serves the fetch proxy on a local port:
//!
//! ```text
//! resourcery [--listen 127.0.0.1:50910] [--config path/to/config.toml] [--static-dir app/]
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the default `info` filter.

use std::future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use resourcery_proxy::{
    HickoryResolver, PinnedTransport, ProxyConfig, ProxyState, ResolvedConfig, bind, serve,
};

#[derive(Parser)]
#[command(name = "resourcery")]
#[command(about = "SSRF-hardened fetch proxy for the reSOURCERY audio app")]
struct Cli {
    /// Address to bind (overrides the config file).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Config file (default: $RESOURCERY_CONFIG, then the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of app files served next to the proxy endpoint.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

async fn shutdown_signal() {
    shutdown_on(signal::ctrl_c()).await;
}

/// Resolve once `signal` fires. A signal that cannot be registered parks
/// forever so the server keeps running.
async fn shutdown_on(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut file_config = ProxyConfig::load(cli.config.as_deref())?;
    if cli.static_dir.is_some() {
        file_config.static_dir = cli.static_dir;
    }
    let mut config = ResolvedConfig::from_config(&file_config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let resolver = HickoryResolver::from_system_conf().context("Failed to set up DNS resolver")?;
    let transport = PinnedTransport::new(&config);

    let listener = bind(config.listen)
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        "reSOURCERY proxy listening on http://{addr}{}",
        config.path
    );
    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving {} at http://{addr}/", dir.display());
    }

    let state = ProxyState::new(config, Arc::new(resolver), Arc::new(transport));
    serve(listener, state, shutdown_signal()).await?;
    Ok(())
}
