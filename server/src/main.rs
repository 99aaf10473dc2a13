use anyhow::{Context, Result};
use clap::Parser;
use livesearch_core::{BackendKind, ChangeWatcher, SearchConfig, SearchService};
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Index directory path
    #[arg(long)]
    index: Option<PathBuf>,
    /// Directory to watch (repeatable)
    #[arg(long = "root")]
    roots: Vec<PathBuf>,
    /// Ranking backend: sparse or dense
    #[arg(long)]
    backend: Option<BackendKind>,
    /// Sparse relevance cutoff
    #[arg(long)]
    threshold: Option<f32>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = SearchConfig::load_or_default(args.config.as_deref())?;
    if let Some(index) = args.index {
        config.index_dir = index;
    }
    if !args.roots.is_empty() {
        config.roots = args.roots;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(threshold) = args.threshold {
        config.relevance_threshold = threshold;
    }
    let roots = config.roots.clone();

    let service = Arc::new(SearchService::new(config)?);
    // watch first so changes made during the initial walk are queued
    let mut watcher = ChangeWatcher::watch(&roots)?;
    let init = Arc::clone(&service);
    let init_roots = roots.clone();
    let indexed = tokio::task::spawn_blocking(move || init.initialize(&init_roots))
        .await?
        .context("initial sync failed")?;
    tracing::info!(indexed, "initial sync complete");

    watcher.attach(Arc::clone(&service))?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, build_app(Arc::clone(&service)))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for ctrl-c");
            }
        })
        .await?;

    let stats = watcher.stats();
    tokio::task::spawn_blocking(move || {
        watcher.stop();
        service.shutdown()
    })
    .await?
    .context("final snapshot failed")?;
    tracing::info!(events = stats.events, batches = stats.batches, errors = stats.errors, "stopped");
    Ok(())
}
