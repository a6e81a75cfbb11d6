//! Downloading discovered files into the blob store and document table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::crawlers::{get_with_backoff, FileDescriptor};
use crate::error::{CoreError, ErrorDetail};
use crate::models::{Document, FileType};
use crate::repository::DocumentStore;
use crate::storage::BlobStore;

/// Per-host politeness gate: consecutive requests to one host are spaced by
/// a minimum delay; distinct hosts proceed independently.
pub struct HostGate {
    delay: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl HostGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the host is ready, reserving the next slot.
    pub async fn wait(&self, url: &str) {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
        else {
            return;
        };

        let wait_until = {
            let mut last = self.last.lock().await;
            let now = Instant::now();
            let ready = match last.get(&host) {
                Some(prev) => (*prev + self.delay).max(now),
                None => now,
            };
            last.insert(host, ready);
            ready
        };
        tokio::time::sleep_until(wait_until).await;
    }
}

/// Result of fetching one descriptor.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A new document row was created.
    Created(Document),
    /// Identical bytes were already ingested.
    Skipped { document_id: String },
}

/// Downloads candidate files with bounded concurrency and politeness
/// delays, persisting bytes and document rows.
pub struct Fetcher {
    client: reqwest::Client,
    store: DocumentStore,
    blobs: Arc<dyn BlobStore>,
    semaphore: Arc<Semaphore>,
    host_gate: Arc<HostGate>,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        store: DocumentStore,
        blobs: Arc<dyn BlobStore>,
        max_concurrent: usize,
        per_host_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            blobs,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            host_gate: Arc::new(HostGate::new(per_host_delay)),
        }
    }

    /// Download one descriptor and persist it.
    pub async fn fetch_descriptor(
        &self,
        descriptor: &FileDescriptor,
        skip_existing: bool,
    ) -> Result<FetchOutcome, CoreError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CoreError::Cancelled)?;
        self.host_gate.wait(&descriptor.url).await;

        let response = get_with_backoff(&self.client, &descriptor.url, None).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::TransientUpstream(format!("read body: {}", e)))?;

        self.persist(
            &bytes,
            &descriptor.filename,
            Some(descriptor.url.clone()),
            descriptor.section_label.clone(),
            content_type.or_else(|| descriptor.content_type_hint.clone()),
            skip_existing,
        )
        .await
    }

    /// Persist already-downloaded bytes (also the path for direct uploads).
    pub async fn persist(
        &self,
        bytes: &[u8],
        filename: &str,
        source_url: Option<String>,
        section_label: Option<String>,
        content_type_hint: Option<String>,
        skip_existing: bool,
    ) -> Result<FetchOutcome, CoreError> {
        let document_id = Document::compute_id(bytes);
        if self.store.document_exists(&document_id)? {
            if skip_existing {
                return Ok(FetchOutcome::Skipped { document_id });
            }
            return Err(CoreError::Conflict(format!(
                "document {} already ingested",
                document_id
            )));
        }

        let file_type = FileType::detect(bytes, filename).ok_or_else(|| {
            CoreError::InvalidArgument(format!("unsupported file type for {}", filename))
        })?;

        let mut metadata = serde_json::Map::new();
        if let Some(section) = section_label {
            metadata.insert("section".into(), serde_json::Value::String(section));
        }
        if let Some(hint) = content_type_hint {
            metadata.insert("content_type".into(), serde_json::Value::String(hint));
        }

        let doc = Document::from_content(
            bytes,
            filename.to_string(),
            file_type,
            source_url,
            serde_json::Value::Object(metadata),
        );

        self.blobs.put(&doc.blob_key(), bytes).await?;
        self.store.insert_document(&doc)?;
        tracing::info!("Ingested {} as {}", doc.file_name, doc.document_id);
        Ok(FetchOutcome::Created(doc))
    }

    /// Fetch a batch of descriptors concurrently. Per-item failures are
    /// collected, not fatal.
    pub async fn fetch_all(
        &self,
        descriptors: &[FileDescriptor],
        skip_existing: bool,
    ) -> (Vec<Document>, Vec<String>, Vec<ErrorDetail>) {
        let results: Vec<(String, Result<FetchOutcome, CoreError>)> = stream::iter(
            descriptors.to_vec(),
        )
            .map(|descriptor| async move {
                let outcome = self.fetch_descriptor(&descriptor, skip_existing).await;
                (descriptor.url.clone(), outcome)
            })
            .buffer_unordered(self.semaphore.available_permits().max(1))
            .collect()
            .await;

        let mut created = Vec::new();
        let mut skipped = Vec::new();
        let mut errors = Vec::new();
        for (url, outcome) in results {
            match outcome {
                Ok(FetchOutcome::Created(doc)) => created.push(doc),
                Ok(FetchOutcome::Skipped { document_id }) => skipped.push(document_id),
                Err(e) => {
                    tracing::warn!("Fetch failed for {}: {}", url, e);
                    errors.push(ErrorDetail::from_error(&e, Some(url)));
                }
            }
        }
        (created, skipped, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_store;
    use crate::storage::FsBlobStore;

    fn fetcher(store: DocumentStore, dir: &std::path::Path) -> Fetcher {
        Fetcher::new(
            reqwest::Client::new(),
            store,
            Arc::new(FsBlobStore::new(dir.join("blobs"))),
            4,
            Duration::from_millis(1),
        )
    }

    /// 1x1 black pixel PNG for fixtures.
    fn tiny_png() -> Vec<u8> {
        let img = image::GrayImage::from_pixel(1, 1, image::Luma([0u8]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_persist_creates_document_and_blob() {
        let (dir, store) = test_store();
        let f = fetcher(store.clone(), dir.path());
        let png = tiny_png();
        let outcome = f
            .persist(&png, "pixel.png", None, Some("Records".into()), None, true)
            .await
            .unwrap();
        let FetchOutcome::Created(doc) = outcome else {
            panic!("expected created");
        };
        assert_eq!(doc.file_type, FileType::Png);
        assert_eq!(doc.metadata["section"], "Records");
        assert!(f.blobs.exists(&doc.blob_key()).await.unwrap());
        assert!(store.document_exists(&doc.document_id).unwrap());
    }

    #[tokio::test]
    async fn test_persist_identical_bytes_skipped() {
        let (dir, store) = test_store();
        let f = fetcher(store, dir.path());
        let png = tiny_png();
        let first = f
            .persist(&png, "pixel.png", None, None, None, true)
            .await
            .unwrap();
        let FetchOutcome::Created(doc) = first else {
            panic!("expected created");
        };
        let second = f
            .persist(&png, "renamed.png", None, None, None, true)
            .await
            .unwrap();
        let FetchOutcome::Skipped { document_id } = second else {
            panic!("expected skipped");
        };
        assert_eq!(document_id, doc.document_id);
    }

    #[tokio::test]
    async fn test_persist_conflict_when_reuse_forbidden() {
        let (dir, store) = test_store();
        let f = fetcher(store, dir.path());
        let png = tiny_png();
        f.persist(&png, "pixel.png", None, None, None, true)
            .await
            .unwrap();
        let err = f
            .persist(&png, "pixel.png", None, None, None, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_persist_rejects_unsupported_type() {
        let (dir, store) = test_store();
        let f = fetcher(store, dir.path());
        let err = f
            .persist(b"plain text", "notes.txt", None, None, None, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_host_gate_spaces_requests() {
        let gate = HostGate::new(Duration::from_millis(50));
        let started = Instant::now();
        gate.wait("https://example.com/a").await;
        gate.wait("https://example.com/b").await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_host_gate_distinct_hosts_not_delayed() {
        let gate = HostGate::new(Duration::from_millis(200));
        let started = Instant::now();
        gate.wait("https://one.example.com/a").await;
        gate.wait("https://two.example.com/b").await;
        assert!(started.elapsed() < Duration::from_millis(150));
    }
}
