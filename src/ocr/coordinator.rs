//! Per-page OCR pipeline.
//!
//! The coordinator owns the backend chosen at startup. For each page it
//! loads the raster, runs preprocessing, calls the backend under a deadline,
//! maps boxes back to page coordinates, and persists OCR text, entities, and
//! the search row in one transaction.

use std::sync::Arc;

use chrono::Utc;

use super::backend::{OcrBackend, OcrError};
use super::preprocess::{merge_scale_results, preprocess_image, unmap_words, PreparedImage, ScaledVariant};
use crate::config::OcrConfig;
use crate::error::CoreError;
use crate::index::{build_searchable_text, tokenize};
use crate::models::{ImagePage, OcrText, PageBox, WordBox};
use crate::repository::DocumentStore;
use crate::search::Embedder;
use crate::storage::BlobStore;
use crate::text::{extract_entities, normalize, to_page_entities};

/// Reassemble page text from word boxes in reading order: spaces within a
/// line, newlines when the vertical position jumps.
fn words_to_text(words: &[WordBox]) -> String {
    let mut out = String::new();
    let mut prev: Option<&WordBox> = None;
    for word in words {
        if let Some(p) = prev {
            if word.y > p.y + p.height * 0.8 {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(&word.text);
        prev = Some(word);
    }
    out
}

/// Drives OCR for claimed pages.
pub struct OcrCoordinator {
    store: DocumentStore,
    blobs: Arc<dyn BlobStore>,
    backend: Arc<dyn OcrBackend>,
    config: OcrConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl OcrCoordinator {
    pub fn new(
        store: DocumentStore,
        blobs: Arc<dyn BlobStore>,
        backend: Arc<dyn OcrBackend>,
        config: OcrConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            store,
            blobs,
            backend,
            config,
            embedder,
        }
    }

    /// Process one claimed page end to end.
    ///
    /// Errors are classified by [`CoreError::is_transient`]: transient ones
    /// leave the page eligible for retry, permanent ones fail it.
    pub async fn process_page(&self, page: &ImagePage) -> Result<(), CoreError> {
        let bytes = self.blobs.get(&page.image_path).await?;

        let prepared = if self.config.preprocess {
            let deskew = self.config.deskew;
            let scales = self.config.scales.clone();
            tokio::task::spawn_blocking(move || preprocess_image(&bytes, true, deskew, &scales))
                .await
                .map_err(|e| CoreError::Internal(format!("preprocess task: {}", e)))?
                .map_err(map_ocr_error)?
        } else {
            PreparedImage {
                variants: vec![ScaledVariant {
                    png: bytes,
                    scale: 1.0,
                }],
                rotation_deg: 0.0,
                width: page.width,
                height: page.height,
            }
        };

        let deadline = std::time::Duration::from_secs(self.config.call_timeout_seconds);
        let mut merged: Vec<WordBox> = Vec::new();
        for variant in &prepared.variants {
            let output = tokio::time::timeout(
                deadline,
                self.backend.extract(&variant.png, &self.config.languages),
            )
            .await
            .map_err(|_| map_ocr_error(OcrError::Timeout))?
            .map_err(map_ocr_error)?;

            let words = unmap_words(
                output.words,
                variant.scale,
                prepared.rotation_deg,
                page.width,
                page.height,
            );
            merged = merge_scale_results(merged, words);
        }
        merged.retain(|w| w.confidence >= self.config.drop_confidence);

        let raw_text = words_to_text(&merged);
        let normalized_text = normalize(&raw_text);

        let ocr = OcrText {
            ocr_id: uuid::Uuid::new_v4().to_string(),
            page_id: page.page_id.clone(),
            document_id: page.document_id.clone(),
            raw_text,
            normalized_text: normalized_text.clone(),
            bbox: PageBox::enclosing(&merged),
            page_confidence: OcrText::weighted_confidence(&merged),
            word_boxes: merged,
            engine: self.backend.kind().as_str().to_string(),
            created_at: Utc::now(),
        };

        let entities = to_page_entities(&ocr, extract_entities(&normalized_text));
        let searchable_text = build_searchable_text(&normalized_text);
        let tokens = tokenize(&searchable_text);

        let embedding = match (&self.embedder, normalized_text.is_empty()) {
            (Some(embedder), false) => match embedder.embed(&normalized_text).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::warn!("Embedding failed for {}: {}", page.page_id, e);
                    None
                }
            },
            _ => None,
        };

        self.store.write_page_result(
            &ocr,
            &entities,
            &searchable_text,
            &tokens,
            embedding.as_deref(),
        )?;

        tracing::debug!(
            "OCR complete for {} ({} words, confidence {:.2})",
            page.page_id,
            ocr.word_boxes.len(),
            ocr.page_confidence
        );
        Ok(())
    }
}

fn map_ocr_error(e: OcrError) -> CoreError {
    if e.is_transient() {
        CoreError::TransientUpstream(e.to_string())
    } else {
        CoreError::PermanentUpstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_to_text_lines() {
        let words = vec![
            WordBox::new("flight", 10.0, 10.0, 60.0, 12.0, 0.9),
            WordBox::new("log", 80.0, 10.0, 30.0, 12.0, 0.9),
            WordBox::new("arrivals", 10.0, 40.0, 80.0, 12.0, 0.9),
        ];
        assert_eq!(words_to_text(&words), "flight log\narrivals");
        assert_eq!(words_to_text(&[]), "");
    }

    #[test]
    fn test_ocr_error_mapping() {
        assert_eq!(map_ocr_error(OcrError::Timeout).kind(), "transient_upstream");
        assert_eq!(
            map_ocr_error(OcrError::InvalidImage("bad".into())).kind(),
            "permanent_upstream"
        );
    }
}
