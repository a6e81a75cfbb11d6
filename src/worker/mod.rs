//! Background worker loops.
//!
//! Both loops are single-threaded per process and safe to run in multiple
//! processes against the same store: page claims are CAS-guarded and stale
//! claims are reaped by TTL. Shutdown is signalled through a watch channel;
//! a page being processed when the signal arrives has its claim released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::{SiteIngestConfig, WorkerConfig};
use crate::crawlers::Crawler;
use crate::error::CoreError;
use crate::ocr::OcrCoordinator;
use crate::repository::DocumentStore;
use crate::services::IngestService;

/// Create a shutdown signal pair for the worker loops.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Processes pages stuck in `pending` through the OCR coordinator.
pub struct PendingPagesWorker {
    store: DocumentStore,
    coordinator: Arc<OcrCoordinator>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

/// Outcome counters for one poll tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub reaped: usize,
    pub processed: usize,
    pub failed: usize,
}

impl PendingPagesWorker {
    pub fn new(
        store: DocumentStore,
        coordinator: Arc<OcrCoordinator>,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            coordinator,
            config,
            shutdown,
        }
    }

    /// One poll: reap stale claims, claim a batch, process it.
    pub async fn tick(&self) -> Result<TickOutcome, CoreError> {
        let mut outcome = TickOutcome {
            reaped: self.store.reap_stale_claims(self.config.claim_ttl_seconds)?,
            ..Default::default()
        };
        if outcome.reaped > 0 {
            tracing::info!("Requeued {} stale page claims", outcome.reaped);
        }

        let pages = self.store.claim_pending_pages(self.config.batch_size)?;
        for page in pages {
            if *self.shutdown.borrow() {
                self.store.release_claim(&page.page_id)?;
                return Err(CoreError::Cancelled);
            }

            match self.coordinator.process_page(&page).await {
                Ok(()) => outcome.processed += 1,
                Err(CoreError::Cancelled) => {
                    self.store.release_claim(&page.page_id)?;
                    return Err(CoreError::Cancelled);
                }
                Err(e) => {
                    outcome.failed += 1;
                    let next_state = self.store.record_page_failure(
                        &page.page_id,
                        &e.to_string(),
                        e.is_transient(),
                        self.config.max_attempts,
                    )?;
                    tracing::warn!(
                        "Page {} failed ({}), now {}: {}",
                        page.page_id,
                        e.kind(),
                        next_state.as_str(),
                        e
                    );
                }
            }
        }
        Ok(outcome)
    }

    /// Run until the shutdown signal fires.
    pub async fn run(mut self) {
        tracing::info!(
            "Pending-pages worker started (batch {}, poll {}s)",
            self.config.batch_size,
            self.config.poll_seconds
        );
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.tick().await {
                Ok(outcome) if outcome.processed > 0 || outcome.failed > 0 => {
                    tracing::info!(
                        "Tick: {} processed, {} failed",
                        outcome.processed,
                        outcome.failed
                    );
                    // Keep draining while there is work.
                    continue;
                }
                Ok(_) => {}
                Err(CoreError::Cancelled) => break,
                Err(e) => tracing::error!("Worker tick failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.poll_seconds)) => {}
                _ = self.shutdown.changed() => {}
            }
        }
        tracing::info!("Pending-pages worker stopped");
    }
}

/// Periodically crawls the tracked site and enqueues new documents.
pub struct SiteIngestWorker {
    service: Arc<IngestService>,
    crawler: Arc<dyn Crawler>,
    config: SiteIngestConfig,
    shutdown: watch::Receiver<bool>,
}

impl SiteIngestWorker {
    pub fn new(
        service: Arc<IngestService>,
        crawler: Arc<dyn Crawler>,
        config: SiteIngestConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            crawler,
            config,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            "Site ingest worker started (interval {}s)",
            self.config.run_interval_seconds
        );
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self
                .service
                .ingest_from_source(self.crawler.as_ref(), self.config.skip_existing)
                .await
            {
                Ok(report) => tracing::info!(
                    "Site ingest: {} discovered, {} downloaded, {} skipped, {} errors",
                    report.discovered,
                    report.downloaded,
                    report.skipped,
                    report.errors.len()
                ),
                Err(e) => tracing::error!("Site ingest failed: {}", e),
            }

            // Sleep the interval in short polls so shutdown is prompt.
            let mut remaining = self.config.run_interval_seconds;
            while remaining > 0 && !*self.shutdown.borrow() {
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
            }
        }
        tracing::info!("Site ingest worker stopped");
    }
}
