//! `tminus-core` server binary: loads configuration, wires the registry
//! database and the trait-seam collaborators, and serves the dispatch
//! router over HTTP.

use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tminus_core::actor::ActorRegistry;
use tminus_core::blob_store::FsBlobStore;
use tminus_core::dispatch::{build_router, AppState};
use tminus_core::queue::InMemoryQueue;
use tminus_core::{registry, TminusConfig};

#[derive(Parser, Debug)]
#[command(name = "tminus-core", about = "Per-user calendar graph engine server")]
struct Args {
    /// Directory containing tminus.toml; defaults to the current directory.
    #[arg(long, default_value = ".")]
    config_root: PathBuf,

    /// Override the listen address from tminus.toml.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = TminusConfig::load(&args.config_root)?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let master_key = TminusConfig::master_key()?;

    let mut registry_conn = tminus_core::db::connect(&config.registry_db)?;
    registry::ensure_migrated(&mut registry_conn)?;

    let state = AppState {
        actors: ActorRegistry::new(config.clone()),
        registry_conn: Arc::new(Mutex::new(registry_conn)),
        blobs: Arc::new(FsBlobStore::new(config.blob_dir.clone())),
        queue: Arc::new(InMemoryQueue::new()),
        master_key: Arc::new(master_key),
    };

    let app = build_router(state);

    tracing::info!(addr = %config.listen_addr, "starting tminus-core");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
