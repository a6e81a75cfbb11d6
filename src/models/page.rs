//! Raster page model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCR lifecycle state of a raster page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrState {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl OcrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One raster image derived from a document.
///
/// A single-image file is a one-page document. Page ids are stable once
/// produced and never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePage {
    /// `{document_id}_page_{NNNN}` with zero-padded 4-digit page number.
    pub page_id: String,
    pub document_id: String,
    /// 1-based page number, contiguous within a document.
    pub page_number: u32,
    /// Blob key of the page raster (`images/{page_id}.png`).
    pub image_path: String,
    pub width: u32,
    pub height: u32,
    pub ocr_state: OcrState,
    /// Failure reason when `ocr_state` is failed.
    pub ocr_error: Option<String>,
    /// Processing attempts consumed so far.
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl ImagePage {
    /// Build the stable page identifier.
    pub fn make_id(document_id: &str, page_number: u32) -> String {
        format!("{}_page_{:04}", document_id, page_number)
    }

    /// Blob key for a page raster.
    pub fn image_key(document_id: &str, page_number: u32) -> String {
        format!("images/{}.png", Self::make_id(document_id, page_number))
    }

    pub fn new(document_id: &str, page_number: u32, width: u32, height: u32) -> Self {
        Self {
            page_id: Self::make_id(document_id, page_number),
            document_id: document_id.to_string(),
            page_number,
            image_path: Self::image_key(document_id, page_number),
            width,
            height,
            ocr_state: OcrState::Pending,
            ocr_error: None,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_zero_padding() {
        assert_eq!(ImagePage::make_id("abc", 1), "abc_page_0001");
        assert_eq!(ImagePage::make_id("abc", 123), "abc_page_0123");
        assert_eq!(ImagePage::make_id("abc", 9999), "abc_page_9999");
    }

    #[test]
    fn test_image_key_prefix() {
        let key = ImagePage::image_key("abc", 2);
        assert_eq!(key, "images/abc_page_0002.png");
    }

    #[test]
    fn test_state_round_trip() {
        for s in [
            OcrState::Pending,
            OcrState::InProgress,
            OcrState::Done,
            OcrState::Failed,
        ] {
            assert_eq!(OcrState::from_str(s.as_str()), Some(s));
        }
        assert_eq!(OcrState::from_str("bogus"), None);
    }
}
