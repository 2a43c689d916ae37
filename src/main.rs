//! Docgate server
//!
//! Payment-gated document release over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docgate::config::AppConfig;
use docgate::handlers::{router, AppState, Stores};
use docgate::processor::StripeClient;
use tracing_subscriber::EnvFilter;

/// Docgate server
#[derive(Parser, Debug)]
#[command(name = "docgate")]
#[command(version)]
#[command(about = "Payment-gated document release service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory (overrides DOCGATE_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep all state in memory (local development)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = AppConfig::from_env().context("loading configuration")?;
    if let Some(dir) = args.data_dir {
        config = config.with_data_dir(dir);
    }

    let processor = Arc::new(
        StripeClient::new(
            config.api_base.clone(),
            config.secret_key(),
            config.processor_timeout,
        )
        .context("building processor client")?,
    );

    let stores = if args.in_memory {
        tracing::warn!("Running with in-memory stores; state is lost on exit");
        Stores::in_memory(&config)
    } else {
        Stores::open(&config)
            .await
            .with_context(|| format!("opening stores in {}", config.data_dir.display()))?
    };

    let state = Arc::new(AppState::new(&config, processor, stores));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(%addr, public_url = %config.public_url, "Docgate listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
