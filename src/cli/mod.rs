//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ingestion, OCR, and search for scan-quality document corpora.
#[derive(Parser)]
#[command(name = "scandex", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "SCANDEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database, and a default config file.
    Init,

    /// Crawl a source and ingest everything it lists.
    Ingest {
        /// Base URL of a JSON listing endpoint, or the site root with --site.
        url: Option<String>,
        /// Use the site-specific HTML crawler instead of the JSON crawler.
        #[arg(long)]
        site: bool,
        /// Re-download documents whose content is already stored.
        #[arg(long)]
        no_skip_existing: bool,
    },

    /// Enqueue a local file as a document.
    Enqueue {
        /// Path to a PDF or image file.
        path: PathBuf,
        /// Source URL to record on the document.
        #[arg(long)]
        source_url: Option<String>,
    },

    /// Run the background worker loops.
    Worker {
        /// Process one batch and exit.
        #[arg(long)]
        once: bool,
        /// Also run the periodic site ingest loop.
        #[arg(long)]
        with_site_ingest: bool,
    },

    /// Search indexed pages.
    Search {
        /// One of: keyword, phrase, fuzzy, entity, semantic.
        mode: String,
        /// The query text (or entity value for entity mode).
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Entity kind for entity mode: name, email, phone, date, keyword.
        #[arg(long)]
        entity_type: Option<String>,
    },

    /// List extracted entities.
    Entities {
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        document: Option<String>,
        #[arg(long)]
        value: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Show store counts and external tool availability.
    Status,
}

/// Entry point used by main.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => crate::config::Config::load(path)?,
        None => crate::config::Config::load_default()?,
    };

    match cli.command {
        Commands::Init => commands::init(&config).await,
        Commands::Ingest {
            url,
            site,
            no_skip_existing,
        } => commands::ingest(&config, url, site, !no_skip_existing).await,
        Commands::Enqueue { path, source_url } => {
            commands::enqueue(&config, &path, source_url).await
        }
        Commands::Worker {
            once,
            with_site_ingest,
        } => commands::worker(&config, once, with_site_ingest).await,
        Commands::Search {
            mode,
            query,
            limit,
            entity_type,
        } => commands::search(&config, &mode, &query, limit, entity_type).await,
        Commands::Entities {
            entity_type,
            document,
            value,
            limit,
        } => commands::entities(&config, entity_type, document, value, limit).await,
        Commands::Status => commands::status(&config).await,
    }
}
