//! Metadata Proxy Server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use metadata_proxy::{router, AppState, ProxyConfig};

/// Consolidated Zarr metadata proxy
#[derive(Parser, Debug)]
#[command(name = "metadata-proxy")]
#[command(about = "Proxies consolidated Zarr metadata for browser clients")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8084", env = "PROXY_LISTEN_ADDR")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Upstream request timeout in seconds
    #[arg(long, env = "PROXY_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let mut config = ProxyConfig::from_env();
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }

    let state = Arc::new(AppState::new(config, Some(prometheus_handle))?);
    let app = router(state);

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", args.listen))?;

    info!("Metadata proxy listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server failed")?;

    Ok(())
}
