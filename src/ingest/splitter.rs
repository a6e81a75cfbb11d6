//! Page splitting: PDFs are rasterized per page, images become one page.

use std::path::Path;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{Document, ImagePage};
use crate::repository::DocumentStore;
use crate::storage::BlobStore;

/// Splits documents into raster pages and records ImagePage rows.
pub struct PageSplitter {
    store: DocumentStore,
    blobs: Arc<dyn BlobStore>,
    dpi: u32,
}

impl PageSplitter {
    pub fn new(store: DocumentStore, blobs: Arc<dyn BlobStore>, dpi: u32) -> Self {
        Self { store, blobs, dpi }
    }

    /// Split a document into pages. Returns the page count. Safe to re-run:
    /// existing page rows and blobs are left in place.
    pub async fn split_document(
        &self,
        doc: &Document,
        original: &[u8],
    ) -> Result<u32, CoreError> {
        let page_count = if doc.file_type.is_pdf() {
            self.split_pdf(doc, original).await?
        } else {
            self.store_single_image(doc, original).await?
        };
        self.store.set_page_count(&doc.document_id, page_count)?;
        Ok(page_count)
    }

    /// Rasterize every PDF page at the configured DPI.
    async fn split_pdf(&self, doc: &Document, original: &[u8]) -> Result<u32, CoreError> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| CoreError::Internal(format!("create temp dir: {}", e)))?;
        let pdf_path = temp_dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, original)
            .await
            .map_err(|e| CoreError::Internal(format!("write temp pdf: {}", e)))?;

        let expected_pages = self.pdf_page_count(&pdf_path).await;

        let status = tokio::process::Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string()])
            .arg(&pdf_path)
            .arg(temp_dir.path().join("page"))
            .status()
            .await;

        match status {
            Ok(s) if s.success() => {}
            Ok(_) => {
                return Err(CoreError::PermanentUpstream(format!(
                    "pdftoppm could not rasterize document {}",
                    doc.document_id
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::Internal(
                    "pdftoppm not found (install poppler-utils)".into(),
                ))
            }
            Err(e) => return Err(CoreError::Internal(format!("run pdftoppm: {}", e))),
        }

        // pdftoppm names outputs page-01.png, page-001.png, ... depending on
        // the page count; sorting the names recovers page order.
        let mut images: Vec<_> = std::fs::read_dir(temp_dir.path())
            .map_err(|e| CoreError::Internal(format!("list raster dir: {}", e)))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "png").unwrap_or(false))
            .collect();
        images.sort();

        if images.is_empty() {
            return Err(CoreError::PermanentUpstream(format!(
                "no pages rasterized from document {}",
                doc.document_id
            )));
        }
        if let Some(expected) = expected_pages {
            if images.len() as u32 != expected {
                tracing::warn!(
                    "pdfinfo reported {} pages but {} were rasterized for {}",
                    expected,
                    images.len(),
                    doc.document_id
                );
            }
        }

        for (index, image_path) in images.iter().enumerate() {
            let page_number = index as u32 + 1;
            let bytes = tokio::fs::read(image_path)
                .await
                .map_err(|e| CoreError::Internal(format!("read raster page: {}", e)))?;
            self.store_page(doc, page_number, bytes).await?;
        }
        Ok(images.len() as u32)
    }

    /// Page count from pdfinfo, when available.
    async fn pdf_page_count(&self, pdf_path: &Path) -> Option<u32> {
        let output = tokio::process::Command::new("pdfinfo")
            .arg(pdf_path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if line.starts_with("Pages:") {
                return line.split_whitespace().nth(1).and_then(|s| s.parse().ok());
            }
        }
        None
    }

    /// A single-image file becomes page 1, re-encoded to PNG.
    async fn store_single_image(&self, doc: &Document, original: &[u8]) -> Result<u32, CoreError> {
        let decoded = image::load_from_memory(original).map_err(|e| {
            CoreError::PermanentUpstream(format!("corrupt image {}: {}", doc.document_id, e))
        })?;
        let mut buf = std::io::Cursor::new(Vec::new());
        decoded
            .write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| CoreError::Internal(format!("encode page: {}", e)))?;
        self.store_page(doc, 1, buf.into_inner()).await?;
        Ok(1)
    }

    async fn store_page(
        &self,
        doc: &Document,
        page_number: u32,
        png: Vec<u8>,
    ) -> Result<(), CoreError> {
        let (width, height) = image::load_from_memory(&png)
            .map(|img| (img.width(), img.height()))
            .map_err(|e| CoreError::Internal(format!("decode raster page: {}", e)))?;

        let page = ImagePage::new(&doc.document_id, page_number, width, height);
        self.blobs.put(&page.image_path, &png).await?;
        self.store.insert_page(&page)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileType, OcrState};
    use crate::repository::test_store;
    use crate::storage::FsBlobStore;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::GrayImage::from_pixel(width, height, image::Luma([200u8]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn splitter(store: DocumentStore, dir: &std::path::Path) -> PageSplitter {
        PageSplitter::new(store, Arc::new(FsBlobStore::new(dir.join("blobs"))), 200)
    }

    #[tokio::test]
    async fn test_single_image_becomes_one_page() {
        let (dir, store) = test_store();
        let s = splitter(store.clone(), dir.path());
        let png = png_bytes(320, 240);
        let doc = Document::from_content(
            &png,
            "scan.png".into(),
            FileType::Png,
            None,
            serde_json::json!({}),
        );
        store.insert_document(&doc).unwrap();

        let pages = s.split_document(&doc, &png).await.unwrap();
        assert_eq!(pages, 1);

        let stored = store.get_pages_for_document(&doc.document_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].page_number, 1);
        assert_eq!(stored[0].width, 320);
        assert_eq!(stored[0].height, 240);
        assert_eq!(stored[0].ocr_state, OcrState::Pending);
        assert!(s.blobs.exists(&stored[0].image_path).await.unwrap());

        let loaded = store.get_document(&doc.document_id).unwrap().unwrap();
        assert_eq!(loaded.page_count, 1);
    }

    #[tokio::test]
    async fn test_resplit_is_idempotent() {
        let (dir, store) = test_store();
        let s = splitter(store.clone(), dir.path());
        let png = png_bytes(100, 100);
        let doc = Document::from_content(
            &png,
            "scan.png".into(),
            FileType::Png,
            None,
            serde_json::json!({}),
        );
        store.insert_document(&doc).unwrap();

        s.split_document(&doc, &png).await.unwrap();
        s.split_document(&doc, &png).await.unwrap();
        assert_eq!(store.get_pages_for_document(&doc.document_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_permanent_failure() {
        let (dir, store) = test_store();
        let s = splitter(store.clone(), dir.path());
        let doc = Document::from_content(
            b"not an image",
            "scan.png".into(),
            FileType::Png,
            None,
            serde_json::json!({}),
        );
        store.insert_document(&doc).unwrap();
        let err = s.split_document(&doc, b"not an image").await.unwrap_err();
        assert_eq!(err.kind(), "permanent_upstream");
    }
}
