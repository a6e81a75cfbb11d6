//! OCRS backend (pure Rust, feature `ocr-ocrs`).
//!
//! Model files are looked up under `SCANDEX_OCRS_MODELS` or the default
//! data directory; the engine is initialized once per process and reused.

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;

use super::backend::{OcrBackend, OcrEngineKind, OcrError, OcrPageOutput};
use crate::models::WordBox;

/// Global cached engine. OcrEngine methods take &self, so no lock is needed.
static OCR_ENGINE: OnceLock<ocrs::OcrEngine> = OnceLock::new();

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Pure-Rust OCR backend backed by the ocrs crate.
pub struct OcrsBackend;

impl OcrsBackend {
    pub fn new() -> Self {
        Self
    }

    fn model_dir() -> PathBuf {
        std::env::var("SCANDEX_OCRS_MODELS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./scandex-data/models/ocrs"))
    }

    fn has_models() -> bool {
        let dir = Self::model_dir();
        dir.join(DETECTION_MODEL).exists() && dir.join(RECOGNITION_MODEL).exists()
    }

    fn get_or_init_engine() -> Result<&'static ocrs::OcrEngine, OcrError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let dir = Self::model_dir();
        let detection_model = rten::Model::load_file(dir.join(DETECTION_MODEL))
            .map_err(|e| OcrError::OcrFailed(format!("load detection model: {}", e)))?;
        let recognition_model = rten::Model::load_file(dir.join(RECOGNITION_MODEL))
            .map_err(|e| OcrError::OcrFailed(format!("load recognition model: {}", e)))?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| OcrError::OcrFailed(format!("create OCR engine: {}", e)))?;

        // If another thread won the race, use the winner.
        let _ = OCR_ENGINE.set(engine);
        OCR_ENGINE
            .get()
            .ok_or_else(|| OcrError::OcrFailed("cache OCR engine".to_string()))
    }

    fn run(image: &[u8]) -> Result<Vec<WordBox>, OcrError> {
        let engine = Self::get_or_init_engine()?;

        let decoded = image::load_from_memory(image)
            .map_err(|e| OcrError::InvalidImage(format!("load image: {}", e)))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), (width, height))
            .map_err(|e| OcrError::InvalidImage(format!("convert image: {}", e)))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| OcrError::OcrFailed(format!("prepare input: {}", e)))?;

        let word_rects = engine
            .detect_words(&input)
            .map_err(|e| OcrError::OcrFailed(format!("detect words: {}", e)))?;
        let lines = engine.find_text_lines(&input, &word_rects);
        let line_texts = engine
            .recognize_text(&input, &lines)
            .map_err(|e| OcrError::OcrFailed(format!("recognize text: {}", e)))?;

        let mut words = Vec::new();
        for line in line_texts.into_iter().flatten() {
            for word in line.words() {
                let rect = word.rotated_rect().bounding_rect();
                let text = word.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                words.push(WordBox::new(
                    text,
                    rect.left() as f32,
                    rect.top() as f32,
                    rect.width() as f32,
                    rect.height() as f32,
                    1.0,
                ));
            }
        }
        Ok(words)
    }
}

impl Default for OcrsBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrBackend for OcrsBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Ocrs
    }

    fn is_available(&self) -> bool {
        Self::has_models()
    }

    fn availability_hint(&self) -> String {
        if Self::has_models() {
            format!("OCRS models found at {:?}", Self::model_dir())
        } else {
            format!(
                "OCRS models missing; place {} and {} under {:?}",
                DETECTION_MODEL,
                RECOGNITION_MODEL,
                Self::model_dir()
            )
        }
    }

    async fn extract(&self, image: &[u8], _languages: &[String]) -> Result<OcrPageOutput, OcrError> {
        let bytes = image.to_vec();
        let words = tokio::task::spawn_blocking(move || Self::run(&bytes))
            .await
            .map_err(|e| OcrError::OcrFailed(format!("ocrs task: {}", e)))??;
        Ok(OcrPageOutput::new(words, "ocrs"))
    }
}
