//! The ingest service: the operations the core exposes to callers.

use std::sync::Arc;

use serde::Serialize;

use crate::crawlers::Crawler;
use crate::error::{CoreError, ErrorDetail};
use crate::ingest::{FetchOutcome, Fetcher, PageSplitter};
use crate::repository::DocumentStore;
use crate::storage::BlobStore;

/// Summary of one ingest run.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub discovered: usize,
    pub excluded: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// Raster pages created by splitting.
    pub processed: usize,
    pub errors: Vec<ErrorDetail>,
}

/// Facade over discover → fetch → split.
pub struct IngestService {
    store: DocumentStore,
    blobs: Arc<dyn BlobStore>,
    fetcher: Fetcher,
    splitter: PageSplitter,
}

impl IngestService {
    pub fn new(
        store: DocumentStore,
        blobs: Arc<dyn BlobStore>,
        fetcher: Fetcher,
        splitter: PageSplitter,
    ) -> Self {
        Self {
            store,
            blobs,
            fetcher,
            splitter,
        }
    }

    /// Run a crawler, download everything it did not exclude, and split the
    /// new documents into pages.
    pub async fn ingest_from_source(
        &self,
        crawler: &dyn Crawler,
        skip_existing: bool,
    ) -> Result<IngestReport, CoreError> {
        let discovery = crawler.discover().await?;
        let fetchable: Vec<_> = discovery.fetchable().cloned().collect();
        let mut report = IngestReport {
            discovered: discovery.descriptors.len(),
            excluded: discovery.excluded_count(),
            errors: discovery.errors,
            ..Default::default()
        };

        let (created, skipped, fetch_errors) =
            self.fetcher.fetch_all(&fetchable, skip_existing).await;
        report.downloaded = created.len();
        report.skipped = skipped.len();
        report.errors.extend(fetch_errors);

        for doc in created {
            match self.split_stored_document(&doc.document_id).await {
                Ok(pages) => report.processed += pages as usize,
                Err(e) => {
                    tracing::warn!("Splitting {} failed: {}", doc.document_id, e);
                    report
                        .errors
                        .push(ErrorDetail::from_error(&e, Some(doc.document_id.clone())));
                }
            }
        }

        tracing::info!(
            "Ingest from {} complete: {} discovered, {} excluded, {} downloaded, {} pages",
            crawler.source_id(),
            report.discovered,
            report.excluded,
            report.downloaded,
            report.processed
        );
        Ok(report)
    }

    /// Enqueue raw bytes as a document (the direct-upload path). Returns the
    /// document id; `allow_existing = false` turns a content-hash collision
    /// into a conflict error.
    pub async fn enqueue_document(
        &self,
        bytes: &[u8],
        filename: &str,
        source_url: Option<String>,
        allow_existing: bool,
    ) -> Result<String, CoreError> {
        let outcome = self
            .fetcher
            .persist(bytes, filename, source_url, None, None, allow_existing)
            .await?;
        match outcome {
            FetchOutcome::Created(doc) => {
                self.split_stored_document(&doc.document_id).await?;
                Ok(doc.document_id)
            }
            FetchOutcome::Skipped { document_id } => Ok(document_id),
        }
    }

    /// Split a stored document into pages, reading the original bytes back
    /// from the blob store.
    pub async fn split_stored_document(&self, document_id: &str) -> Result<u32, CoreError> {
        let doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| CoreError::NotFound(format!("document {}", document_id)))?;
        let bytes = self.blobs.get(&doc.blob_key()).await?;
        self.splitter.split_document(&doc, &bytes).await
    }

    /// Resolve a page raster to a fetchable URL.
    pub async fn get_page(&self, page_id: &str) -> Result<String, CoreError> {
        let page = self
            .store
            .get_page(page_id)?
            .ok_or_else(|| CoreError::NotFound(format!("page {}", page_id)))?;
        self.blobs.url(&page.image_path).await
    }
}
