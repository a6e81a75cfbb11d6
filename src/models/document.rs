//! Document model.
//!
//! A document is an originally downloaded or uploaded file, identified by a
//! content hash so that re-ingesting identical bytes collides on the same row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// File types accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Png,
    Jpg,
    Jpeg,
    Tiff,
    Bmp,
    Gif,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            "tiff" | "tif" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Derive the file type from a filename extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?;
        Self::from_str(&ext.to_ascii_lowercase())
    }

    /// Derive the file type from sniffed content, falling back to extension.
    pub fn detect(content: &[u8], filename: &str) -> Option<Self> {
        if let Some(kind) = infer::get(content) {
            if let Some(ft) = Self::from_str(kind.extension()) {
                return Some(ft);
            }
        }
        Self::from_filename(filename)
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// An ingested file with stable content-derived identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Hex SHA-256 of the original file bytes.
    pub document_id: String,
    /// Canonical URL this document was fetched from, if any.
    pub source_url: Option<String>,
    /// Filename as discovered or uploaded.
    pub file_name: String,
    /// Inferred file type.
    pub file_type: FileType,
    /// Size of the original bytes.
    pub file_size: u64,
    /// Number of raster pages once splitting completes.
    pub page_count: u32,
    /// Opaque key/value metadata (section label from the crawler, etc.).
    pub metadata: serde_json::Value,
    /// When the document row was created.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Compute the hex content hash that identifies a document.
    pub fn compute_id(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// Create a new document from downloaded bytes.
    pub fn from_content(
        content: &[u8],
        file_name: String,
        file_type: FileType,
        source_url: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            document_id: Self::compute_id(content),
            source_url,
            file_name,
            file_type,
            file_size: content.len() as u64,
            page_count: 0,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Blob key under which the original bytes are stored.
    pub fn blob_key(&self) -> String {
        format!("files/{}.{}", self.document_id, self.file_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_id_is_hex_sha256() {
        let id = Document::compute_id(b"Hello, World!");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_compute_id_deterministic() {
        assert_eq!(Document::compute_id(b"abc"), Document::compute_id(b"abc"));
        assert_ne!(Document::compute_id(b"abc"), Document::compute_id(b"abd"));
    }

    #[test]
    fn test_file_type_from_filename() {
        assert_eq!(FileType::from_filename("scan.PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("page.tif"), Some(FileType::Tiff));
        assert_eq!(FileType::from_filename("notes.txt"), None);
        assert_eq!(FileType::from_filename("noext"), None);
    }

    #[test]
    fn test_blob_key_prefix() {
        let doc = Document::from_content(
            b"x",
            "a.pdf".into(),
            FileType::Pdf,
            None,
            serde_json::json!({}),
        );
        assert!(doc.blob_key().starts_with("files/"));
        assert!(doc.blob_key().ends_with(".pdf"));
    }
}
