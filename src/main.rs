mod api;
mod error;
mod geo;
mod lifecycle;
mod loader;
mod models;
mod store;
mod tracking;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::store::MemoryStore;

#[derive(Parser, Debug)]
#[command(name = "busline-tracker")]
#[command(about = "Trip lifecycle and live position tracking for inter-provincial buses")]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to run the HTTP server on
    #[arg(short, long, env = "SERVER_PORT", default_value = "3030")]
    port: u16,

    /// Directory with buses.csv, routes.csv, waypoints.csv and trips.csv to seed the store
    #[arg(long, env = "SEED_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let store = Arc::new(MemoryStore::new());
    if let Some(dir) = &args.data_dir {
        loader::load_seed_data(&store, dir)
            .await
            .with_context(|| format!("loading seed data from {}", dir.display()))?;
    }

    let app = api::create_router(api::AppState::new(store));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("Server is running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
