//! Demo server running configured middleware mounts in front of two routes.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{routing::get, Extension, Json, Router};
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use middleware_bridge::config::{self, BridgeConfig};
use middleware_bridge::lifecycle::{self, Shutdown};
use middleware_bridge::observability;
use middleware_bridge::{middlewares, ChainStack, Decorations, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "middleware-bridge", version, about = "Serve routes behind classic middleware chains")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    observability::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "middleware-bridge starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        hook = ?config.middleware.hook,
        mounts = config.mounts.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => observability::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let stack = ChainStack::new();
    for mount in &config.mounts {
        middlewares::mount(&stack, mount)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config, stack, routes());
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn routes() -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({ "hello": "world" })) }))
        .route("/whoami", get(whoami))
}

async fn whoami(Extension(decorations): Extension<Decorations>) -> Json<Decorations> {
    Json(decorations)
}
