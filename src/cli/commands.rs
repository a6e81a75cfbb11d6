//! CLI command implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::crawlers::{
    build_client, default_exclusion_rules, Crawler, JsonEndpointCrawler, JusticeGovCrawler,
};
use crate::error::CoreError;
use crate::ingest::{Fetcher, PageSplitter};
use crate::models::{EntityType, OcrState};
use crate::ocr::{build_backend, check_binary, OcrCoordinator};
use crate::repository::{DocumentStore, EntityFilter};
use crate::search::{Embedder, HttpEmbedder, SearchEngine, SearchMode, SearchOptions};
use crate::services::IngestService;
use crate::storage::{BlobStore, FsBlobStore};
use crate::worker::{shutdown_channel, PendingPagesWorker, SiteIngestWorker};

/// Everything a command needs, wired from configuration.
struct Context {
    store: DocumentStore,
    blobs: Arc<dyn BlobStore>,
    service: Arc<IngestService>,
    client: reqwest::Client,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Context {
    fn build(config: &Config) -> anyhow::Result<Self> {
        let store = DocumentStore::new(config.storage.db_path())
            .context("open document store")?;
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.blobs_dir()));
        let client = build_client(Duration::from_secs(
            config.crawler.request_timeout_seconds,
        ))?;

        let fetcher = Fetcher::new(
            client.clone(),
            store.clone(),
            blobs.clone(),
            config.crawler.max_concurrent_downloads,
            Duration::from_millis(config.crawler.rate_limit_per_host_ms),
        );
        let splitter = PageSplitter::new(store.clone(), blobs.clone(), config.ocr.dpi);
        let service = Arc::new(IngestService::new(
            store.clone(),
            blobs.clone(),
            fetcher,
            splitter,
        ));

        let embedder: Option<Arc<dyn Embedder>> = match &config.search.embedder_endpoint {
            Some(endpoint) => Some(Arc::new(HttpEmbedder::new(
                endpoint.clone(),
                Duration::from_secs(config.crawler.request_timeout_seconds),
            )?)),
            None => None,
        };

        Ok(Self {
            store,
            blobs,
            service,
            client,
            embedder,
        })
    }

    fn site_crawler(&self, config: &Config) -> anyhow::Result<Arc<dyn Crawler>> {
        Ok(Arc::new(JusticeGovCrawler::new(
            self.client.clone(),
            &config.site_ingest.root_url,
            default_exclusion_rules(),
        )?))
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static progress template"),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

pub async fn init(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    std::fs::create_dir_all(config.storage.blobs_dir())?;
    DocumentStore::new(config.storage.db_path())?;

    let config_path = Path::new("scandex.toml");
    if !config_path.exists() {
        config.save(config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
    }
    println!("Initialized data directory at {}", config.storage.data_dir.display());
    Ok(())
}

pub async fn ingest(
    config: &Config,
    url: Option<String>,
    site: bool,
    skip_existing: bool,
) -> anyhow::Result<()> {
    let ctx = Context::build(config)?;

    let crawler: Arc<dyn Crawler> = if site {
        let root = url.unwrap_or_else(|| config.site_ingest.root_url.clone());
        Arc::new(JusticeGovCrawler::new(
            ctx.client.clone(),
            &root,
            default_exclusion_rules(),
        )?)
    } else {
        let base = url.ok_or_else(|| {
            anyhow::anyhow!("a base URL is required unless --site is given")
        })?;
        Arc::new(JsonEndpointCrawler::new(ctx.client.clone(), &base)?)
    };

    let bar = spinner(&format!("Ingesting from {}", crawler.source_id()));
    let report = ctx
        .service
        .ingest_from_source(crawler.as_ref(), skip_existing)
        .await?;
    bar.finish_and_clear();

    println!(
        "Discovered {} ({} excluded), downloaded {}, skipped {}, {} pages created",
        report.discovered, report.excluded, report.downloaded, report.skipped, report.processed
    );
    for error in &report.errors {
        println!(
            "  error [{}] {}{}",
            error.kind,
            error.message,
            error
                .item
                .as_deref()
                .map(|i| format!(" ({})", i))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn enqueue(
    config: &Config,
    path: &Path,
    source_url: Option<String>,
) -> anyhow::Result<()> {
    let ctx = Context::build(config)?;
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let document_id = ctx
        .service
        .enqueue_document(&bytes, &filename, source_url, true)
        .await?;
    println!("{}", document_id);
    Ok(())
}

pub async fn worker(config: &Config, once: bool, with_site_ingest: bool) -> anyhow::Result<()> {
    let ctx = Context::build(config)?;
    let backend = build_backend(&config.ocr)?;
    if !backend.is_available() {
        tracing::warn!("OCR backend: {}", backend.availability_hint());
    }
    let coordinator = Arc::new(OcrCoordinator::new(
        ctx.store.clone(),
        ctx.blobs.clone(),
        backend,
        config.ocr.clone(),
        ctx.embedder.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let pages_worker = PendingPagesWorker::new(
        ctx.store.clone(),
        coordinator,
        config.worker.clone(),
        shutdown_rx.clone(),
    );

    if once {
        let outcome = pages_worker.tick().await?;
        println!(
            "Processed {} pages, {} failed, {} claims reaped",
            outcome.processed, outcome.failed, outcome.reaped
        );
        return Ok(());
    }

    let mut handles = vec![tokio::spawn(pages_worker.run())];
    if with_site_ingest {
        let site_worker = SiteIngestWorker::new(
            ctx.service.clone(),
            ctx.site_crawler(config)?,
            config.site_ingest.clone(),
            shutdown_rx,
        );
        handles.push(tokio::spawn(site_worker.run()));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

pub async fn search(
    config: &Config,
    mode: &str,
    query: &str,
    limit: Option<usize>,
    entity_type: Option<String>,
) -> anyhow::Result<()> {
    let ctx = Context::build(config)?;
    let mode = SearchMode::from_str(mode)
        .ok_or_else(|| CoreError::InvalidArgument(format!("unknown search mode: {}", mode)))?;
    let entity_type = match entity_type {
        Some(raw) => Some(EntityType::from_str(&raw).ok_or_else(|| {
            CoreError::InvalidArgument(format!("unknown entity type: {}", raw))
        })?),
        None => None,
    };

    let engine = SearchEngine::new(ctx.store, config.search.clone(), ctx.embedder);
    let hits = engine
        .search(
            mode,
            query,
            &SearchOptions {
                limit,
                entity_type,
                fuzzy_threshold: None,
            },
        )
        .await?;

    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }
    for hit in &hits {
        println!(
            "{:.3}  {} p{} (confidence {:.2})",
            hit.score, hit.document_id, hit.page_number, hit.page_confidence
        );
        println!("       {}", hit.snippet.replace('\n', " "));
    }
    Ok(())
}

pub async fn entities(
    config: &Config,
    entity_type: Option<String>,
    document: Option<String>,
    value: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let ctx = Context::build(config)?;
    let entity_type = match entity_type {
        Some(raw) => Some(EntityType::from_str(&raw).ok_or_else(|| {
            CoreError::InvalidArgument(format!("unknown entity type: {}", raw))
        })?),
        None => None,
    };

    let entities = ctx.store.list_entities(&EntityFilter {
        entity_type,
        document_id: document,
        normalized_value: value,
        limit,
    })?;

    for entity in &entities {
        println!(
            "{}\t{}\t{}",
            entity.entity_type.as_str(),
            entity
                .normalized_value
                .as_deref()
                .unwrap_or(&entity.entity_value),
            entity.document_id
        );
    }
    println!("{} entities", entities.len());
    Ok(())
}

pub async fn status(config: &Config) -> anyhow::Result<()> {
    let ctx = Context::build(config)?;

    println!("Documents: {}", ctx.store.count_documents()?);
    for state in [
        OcrState::Pending,
        OcrState::InProgress,
        OcrState::Done,
        OcrState::Failed,
    ] {
        println!(
            "Pages {}: {}",
            state.as_str(),
            ctx.store.count_pages_by_state(state)?
        );
    }
    println!("OCR texts: {}", ctx.store.count_ocr_texts()?);
    println!("Search rows: {}", ctx.store.count_search_rows()?);

    println!("\nExternal tools:");
    for tool in ["pdftoppm", "pdfinfo", "tesseract"] {
        println!(
            "  {}: {}",
            tool,
            if check_binary(tool) { "found" } else { "missing" }
        );
    }

    match build_backend(&config.ocr) {
        Ok(backend) => println!(
            "\nOCR backend {}: {}",
            backend.kind().as_str(),
            backend.availability_hint()
        ),
        Err(e) => println!("\nOCR backend unavailable: {}", e),
    }
    println!(
        "Semantic search: {}",
        if config.search.embedder_endpoint.is_some() {
            "configured"
        } else {
            "disabled"
        }
    );
    Ok(())
}
