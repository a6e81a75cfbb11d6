//! Textract-compatible HTTP OCR backend.
//!
//! Posts page bytes to a detect-document-text endpoint and maps the returned
//! relative geometry onto pixel coordinates. The service contract matches the
//! WORD blocks a Textract proxy emits.

use async_trait::async_trait;
use serde::Deserialize;

use super::backend::{OcrBackend, OcrEngineKind, OcrError, OcrPageOutput};
use crate::models::WordBox;

#[derive(Debug, Deserialize)]
struct TextractGeometry {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Deserialize)]
struct TextractBlock {
    #[serde(default)]
    block_type: String,
    #[serde(default)]
    text: String,
    /// Confidence in percent.
    #[serde(default)]
    confidence: f32,
    geometry: Option<TextractGeometry>,
}

#[derive(Debug, Deserialize)]
struct TextractResponse {
    #[serde(default)]
    blocks: Vec<TextractBlock>,
}

/// OCR backend delegating to a remote Textract-compatible service.
pub struct TextractBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl TextractBackend {
    pub fn new(endpoint: String) -> Result<Self, crate::error::CoreError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| {
                crate::error::CoreError::Internal(format!("build textract client: {}", e))
            })?;
        Ok(Self { client, endpoint })
    }

    fn blocks_to_words(blocks: Vec<TextractBlock>, width: u32, height: u32) -> Vec<WordBox> {
        let (pw, ph) = (width as f32, height as f32);
        blocks
            .into_iter()
            .filter(|b| b.block_type == "WORD" && !b.text.is_empty())
            .filter_map(|b| {
                let g = b.geometry?;
                Some(WordBox::new(
                    b.text,
                    g.left * pw,
                    g.top * ph,
                    g.width * pw,
                    g.height * ph,
                    b.confidence / 100.0,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl OcrBackend for TextractBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Textract
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }

    fn availability_hint(&self) -> String {
        format!("Textract service at {}", self.endpoint)
    }

    async fn extract(&self, image: &[u8], _languages: &[String]) -> Result<OcrPageOutput, OcrError> {
        // Geometry comes back relative; pixel mapping needs the real size.
        let (width, height) = image::load_from_memory(image)
            .map(|img| (img.width(), img.height()))
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| OcrError::Upstream(format!("textract request: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(OcrError::OcrFailed(format!("textract returned {}", status)));
        }
        if !status.is_success() {
            return Err(OcrError::Upstream(format!("textract returned {}", status)));
        }

        let body: TextractResponse = response
            .json()
            .await
            .map_err(|e| OcrError::OcrFailed(format!("textract response: {}", e)))?;

        Ok(OcrPageOutput::new(
            Self::blocks_to_words(body.blocks, width, height),
            "textract",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_scaled_to_pixels() {
        let blocks = vec![
            TextractBlock {
                block_type: "WORD".into(),
                text: "flight".into(),
                confidence: 97.0,
                geometry: Some(TextractGeometry {
                    left: 0.1,
                    top: 0.2,
                    width: 0.3,
                    height: 0.05,
                }),
            },
            TextractBlock {
                block_type: "LINE".into(),
                text: "flight log".into(),
                confidence: 97.0,
                geometry: None,
            },
        ];
        let words = TextractBackend::blocks_to_words(blocks, 1000, 2000);
        assert_eq!(words.len(), 1);
        let w = &words[0];
        assert!((w.x - 100.0).abs() < 1e-3);
        assert!((w.y - 400.0).abs() < 1e-3);
        assert!((w.width - 300.0).abs() < 1e-3);
        assert!((w.confidence - 0.97).abs() < 1e-6);
    }

    #[test]
    fn test_blocks_without_geometry_skipped() {
        let blocks = vec![TextractBlock {
            block_type: "WORD".into(),
            text: "orphan".into(),
            confidence: 90.0,
            geometry: None,
        }];
        assert!(TextractBackend::blocks_to_words(blocks, 100, 100).is_empty());
    }
}
