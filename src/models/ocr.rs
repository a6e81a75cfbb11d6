//! OCR output models: word boxes and per-page text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recognized word with its position in original page pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
}

impl WordBox {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &WordBox) -> f32 {
        let ix = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let iy = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp the box to lie within page bounds.
    pub fn clamp_to(&mut self, page_width: u32, page_height: u32) {
        let pw = page_width as f32;
        let ph = page_height as f32;
        self.x = self.x.clamp(0.0, pw);
        self.y = self.y.clamp(0.0, ph);
        self.width = self.width.min(pw - self.x).max(0.0);
        self.height = self.height.min(ph - self.y).max(0.0);
    }
}

/// An axis-aligned region of a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageBox {
    /// Minimum enclosing box over a set of word boxes. None when empty.
    pub fn enclosing(words: &[WordBox]) -> Option<Self> {
        let first = words.first()?;
        let mut x0 = first.x;
        let mut y0 = first.y;
        let mut x1 = first.right();
        let mut y1 = first.bottom();
        for w in &words[1..] {
            x0 = x0.min(w.x);
            y0 = y0.min(w.y);
            x1 = x1.max(w.right());
            y1 = y1.max(w.bottom());
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Recovered text for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrText {
    pub ocr_id: String,
    pub page_id: String,
    pub document_id: String,
    /// Text exactly as produced by the backend.
    pub raw_text: String,
    /// Normalized text (NFKC, collapsed whitespace, joined hyphenation).
    pub normalized_text: String,
    /// Word boxes in reading order.
    pub word_boxes: Vec<WordBox>,
    /// Minimum box covering all words. None for empty pages.
    pub bbox: Option<PageBox>,
    /// Character-length-weighted mean of word confidences; 0 for empty pages.
    pub page_confidence: f32,
    /// Backend identifier that produced this text.
    pub engine: String,
    pub created_at: DateTime<Utc>,
}

impl OcrText {
    /// Character-length-weighted mean confidence over word boxes.
    pub fn weighted_confidence(words: &[WordBox]) -> f32 {
        let mut weight = 0.0f32;
        let mut sum = 0.0f32;
        for w in words {
            let chars = w.text.chars().count() as f32;
            if chars > 0.0 {
                weight += chars;
                sum += chars * w.confidence;
            }
        }
        if weight > 0.0 {
            sum / weight
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_disjoint() {
        let a = WordBox::new("a", 0.0, 0.0, 10.0, 10.0, 1.0);
        let b = WordBox::new("b", 20.0, 20.0, 10.0, 10.0, 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_identical() {
        let a = WordBox::new("a", 5.0, 5.0, 10.0, 10.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_clamped() {
        let w = WordBox::new("x", 0.0, 0.0, 1.0, 1.0, 1.7);
        assert_eq!(w.confidence, 1.0);
        let w = WordBox::new("x", 0.0, 0.0, 1.0, 1.0, -0.2);
        assert_eq!(w.confidence, 0.0);
    }

    #[test]
    fn test_weighted_confidence_by_char_length() {
        let words = vec![
            WordBox::new("aaaa", 0.0, 0.0, 1.0, 1.0, 1.0),
            WordBox::new("b", 0.0, 0.0, 1.0, 1.0, 0.0),
        ];
        // 4 chars at 1.0, 1 char at 0.0 -> 0.8
        let c = OcrText::weighted_confidence(&words);
        assert!((c - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_confidence_empty_page() {
        assert_eq!(OcrText::weighted_confidence(&[]), 0.0);
    }

    #[test]
    fn test_enclosing_box() {
        let words = vec![
            WordBox::new("a", 10.0, 10.0, 20.0, 10.0, 1.0),
            WordBox::new("b", 50.0, 5.0, 10.0, 10.0, 1.0),
        ];
        let bbox = PageBox::enclosing(&words).unwrap();
        assert_eq!(bbox.x, 10.0);
        assert_eq!(bbox.y, 5.0);
        assert_eq!(bbox.width, 50.0);
        assert_eq!(bbox.height, 15.0);
        assert!(PageBox::enclosing(&[]).is_none());
    }

    #[test]
    fn test_clamp_to_page() {
        let mut w = WordBox::new("x", -5.0, 90.0, 30.0, 30.0, 0.5);
        w.clamp_to(100, 100);
        assert!(w.x >= 0.0);
        assert!(w.bottom() <= 100.0);
    }
}
