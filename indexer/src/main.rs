use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use livesearch_core::persist::{load_meta, IndexPaths};
use livesearch_core::{BackendKind, SearchConfig, SearchService};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a live document search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IndexArgs {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Index directory path
    #[arg(long)]
    index: Option<PathBuf>,
    /// Directory to index (repeatable)
    #[arg(long = "root")]
    roots: Vec<PathBuf>,
    /// Ranking backend: sparse or dense
    #[arg(long)]
    backend: Option<BackendKind>,
    /// Sparse relevance cutoff; results must score strictly above it
    #[arg(long)]
    threshold: Option<f32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the roots, reconcile with any existing snapshot, and save it
    Build {
        #[command(flatten)]
        args: IndexArgs,
    },
    /// Sync the index with the roots and print ranked results as JSON
    Search {
        #[command(flatten)]
        args: IndexArgs,
        /// Free-text query
        query: String,
        /// Maximum number of results
        #[arg(long, short)]
        k: Option<usize>,
    },
    /// Print snapshot metadata
    Stats {
        #[command(flatten)]
        args: IndexArgs,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { args } => {
            let config = resolve_config(args)?;
            let service = SearchService::new(config.clone())?;
            let indexed = service.initialize(&config.roots).context("initial sync failed")?;
            service.shutdown().context("failed to write snapshot")?;
            tracing::info!(indexed, documents = service.stats().documents, "index build complete");
            Ok(())
        }
        Commands::Search { args, query, k } => {
            let config = resolve_config(args)?;
            let service = SearchService::new(config.clone())?;
            service.initialize(&config.roots)?;
            let hits = service.search(&query, k)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
        Commands::Stats { args } => {
            let config = resolve_config(args)?;
            let meta = load_meta(&IndexPaths::new(&config.index_dir))
                .with_context(|| format!("no snapshot metadata in {}", config.index_dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }
    }
}

fn resolve_config(args: IndexArgs) -> Result<SearchConfig> {
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
    config.validate()?;
    Ok(config)
}
