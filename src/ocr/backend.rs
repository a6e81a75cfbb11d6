//! OCR backend capability and construction.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{OcrConfig, OcrEngineChoice};
use crate::error::CoreError;
use crate::models::{OcrText, WordBox};

/// Backend discriminator, carried on results for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngineKind {
    Tesseract,
    Ocrs,
    Paddle,
    Textract,
    Ensemble,
}

impl OcrEngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::Ocrs => "ocrs",
            Self::Paddle => "paddle",
            Self::Textract => "textract",
            Self::Ensemble => "ensemble",
        }
    }
}

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("OCR call exceeded its deadline")]
    Timeout,

    #[error("Upstream OCR service error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    /// Whether a retry may succeed without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Upstream(_) | Self::Io(_))
    }
}

/// Word-level output of one backend call, in the coordinates of the image
/// that was passed in.
#[derive(Debug, Clone)]
pub struct OcrPageOutput {
    pub words: Vec<WordBox>,
    pub page_confidence: f32,
    pub engine: String,
}

impl OcrPageOutput {
    pub fn new(words: Vec<WordBox>, engine: impl Into<String>) -> Self {
        let page_confidence = OcrText::weighted_confidence(&words);
        Self {
            words,
            page_confidence,
            engine: engine.into(),
        }
    }
}

/// The OCR capability: image bytes in, word boxes out.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn kind(&self) -> OcrEngineKind;

    /// Whether the backend can run in this environment.
    fn is_available(&self) -> bool;

    /// Human-readable availability diagnostics for the status command.
    fn availability_hint(&self) -> String;

    /// Extract words from an encoded image.
    async fn extract(&self, image: &[u8], languages: &[String]) -> Result<OcrPageOutput, OcrError>;
}

/// Check if a binary exists in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Construct the backend selected by configuration.
///
/// `ensemble` is built from every concrete backend that reports itself
/// available; with fewer than two it degrades to the single survivor.
pub fn build_backend(cfg: &OcrConfig) -> Result<Arc<dyn OcrBackend>, CoreError> {
    let backend: Arc<dyn OcrBackend> = match cfg.engine {
        OcrEngineChoice::Tesseract => Arc::new(super::TesseractBackend::new()),
        OcrEngineChoice::Textract => {
            let endpoint = cfg.textract_endpoint.clone().ok_or_else(|| {
                CoreError::InvalidArgument(
                    "ocr.textract_endpoint is required for the textract engine".into(),
                )
            })?;
            Arc::new(super::TextractBackend::new(endpoint)?)
        }
        OcrEngineChoice::Easyocr => {
            #[cfg(feature = "ocr-ocrs")]
            {
                Arc::new(super::OcrsBackend::new())
            }
            #[cfg(not(feature = "ocr-ocrs"))]
            {
                return Err(CoreError::CapabilityDisabled(
                    "easyocr engine requires the ocr-ocrs feature".into(),
                ));
            }
        }
        OcrEngineChoice::Paddle => {
            #[cfg(feature = "ocr-paddle")]
            {
                Arc::new(super::PaddleBackend::new())
            }
            #[cfg(not(feature = "ocr-paddle"))]
            {
                return Err(CoreError::CapabilityDisabled(
                    "paddle engine requires the ocr-paddle feature".into(),
                ));
            }
        }
        OcrEngineChoice::Ensemble => {
            let mut members: Vec<Arc<dyn OcrBackend>> = Vec::new();
            let tesseract = super::TesseractBackend::new();
            if tesseract.is_available() {
                members.push(Arc::new(tesseract));
            }
            if let Some(endpoint) = cfg.textract_endpoint.clone() {
                members.push(Arc::new(super::TextractBackend::new(endpoint)?));
            }
            #[cfg(feature = "ocr-ocrs")]
            members.push(Arc::new(super::OcrsBackend::new()));
            #[cfg(feature = "ocr-paddle")]
            members.push(Arc::new(super::PaddleBackend::new()));

            match members.len() {
                0 => {
                    return Err(CoreError::CapabilityDisabled(
                        "ensemble engine found no available backends".into(),
                    ))
                }
                1 => {
                    tracing::warn!(
                        "Ensemble requested but only one backend is available; using it directly"
                    );
                    return Ok(members.remove(0));
                }
                _ => Arc::new(super::EnsembleBackend::new(members, cfg.drop_confidence)),
            }
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_strings() {
        assert_eq!(OcrEngineKind::Tesseract.as_str(), "tesseract");
        assert_eq!(OcrEngineKind::Ensemble.as_str(), "ensemble");
    }

    #[test]
    fn test_page_output_computes_confidence() {
        let words = vec![
            WordBox::new("ab", 0.0, 0.0, 1.0, 1.0, 1.0),
            WordBox::new("cd", 0.0, 0.0, 1.0, 1.0, 0.5),
        ];
        let out = OcrPageOutput::new(words, "tesseract");
        assert!((out.page_confidence - 0.75).abs() < 1e-6);
        let empty = OcrPageOutput::new(Vec::new(), "tesseract");
        assert_eq!(empty.page_confidence, 0.0);
    }

    #[test]
    fn test_transient_classification() {
        assert!(OcrError::Timeout.is_transient());
        assert!(OcrError::Upstream("503".into()).is_transient());
        assert!(!OcrError::InvalidImage("truncated".into()).is_transient());
        assert!(!OcrError::BackendNotAvailable("tesseract".into()).is_transient());
    }

    #[test]
    fn test_textract_engine_requires_endpoint() {
        let cfg = OcrConfig {
            engine: OcrEngineChoice::Textract,
            ..Default::default()
        };
        let err = match build_backend(&cfg) {
            Err(e) => e,
            Ok(_) => panic!("expected build_backend to fail"),
        };
        assert_eq!(err.kind(), "invalid_argument");
    }
}
