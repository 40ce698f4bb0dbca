//! # Reclaim daemon (`reclaimd`)
//!
//! Binary entry point for the lost-and-found matching backend.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reclaimd init` | Create the Postgres schema and the vector collection |
//! | `reclaimd serve` | Start the HTTP server |
//!
//! ## Usage
//!
//! ```bash
//! reclaimd --config ./reclaim.toml init
//! reclaimd --config ./reclaim.toml serve
//! ```
//!
//! Secrets come from the environment: `OPENAI_API_KEY`,
//! `STORAGE_SERVICE_KEY`, and optionally `QDRANT_API_KEY`. Logging is
//! controlled with `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use reclaim::config::{load_config, Config};
use reclaim::embedding::OpenAiEmbedder;
use reclaim::index::QdrantIndex;
use reclaim::pipeline::Pipeline;
use reclaim::server::{run_server, AppState};
use reclaim::storage::SupabaseStorage;
use reclaim::store::PgStore;
use reclaim::{db, migrate};

#[derive(Parser)]
#[command(name = "reclaimd", version, about = "Lost-and-found matching backend")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "reclaim.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema and the vector collection.
    Init,
    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Init => init(&config).await,
        Command::Serve => serve(&config).await,
    }
}

async fn init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;

    let index = QdrantIndex::new(&config.index);
    index.ensure_collection(config.embedding.dims).await?;

    println!("initialized");
    Ok(())
}

async fn serve(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;

    let store = Arc::new(PgStore::new(pool));
    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let objects = Arc::new(SupabaseStorage::new(&config.storage)?);
    let index = Arc::new(QdrantIndex::new(&config.index));
    index.ensure_collection(config.embedding.dims).await?;

    let pipeline = Arc::new(Pipeline::new(
        embedder.clone(),
        embedder,
        objects,
        index,
        store.clone(),
        config.matching.top_k,
    ));

    let state = AppState {
        pipeline,
        store,
    };

    run_server(&config.server.bind, state).await
}
