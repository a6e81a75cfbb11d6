//! PaddleOCR backend via ONNX Runtime (feature `ocr-paddle`).
//!
//! Model files are looked up under `SCANDEX_PADDLE_MODELS` or the default
//! data directory. The engine is cached per process behind a mutex since
//! detection takes `&mut self`.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use paddle_ocr_rs::ocr_lite::OcrLite;

use super::backend::{OcrBackend, OcrEngineKind, OcrError, OcrPageOutput};
use crate::models::WordBox;

static OCR_ENGINE: OnceLock<Mutex<OcrLite>> = OnceLock::new();

const DET_MODEL: &str = "ch_PP-OCRv4_det_infer.onnx";
const REC_MODEL: &str = "ch_PP-OCRv4_rec_infer.onnx";
const CLS_MODEL: &str = "ch_ppocr_mobile_v2.0_cls_infer.onnx";

/// CNN-based OCR backend using paddle-ocr-rs.
pub struct PaddleBackend;

impl PaddleBackend {
    pub fn new() -> Self {
        Self
    }

    fn model_dir() -> PathBuf {
        std::env::var("SCANDEX_PADDLE_MODELS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./scandex-data/models/paddle-ocr"))
    }

    fn has_models() -> bool {
        let dir = Self::model_dir();
        dir.join(DET_MODEL).exists() && dir.join(REC_MODEL).exists()
    }

    fn get_or_init_engine() -> Result<&'static Mutex<OcrLite>, OcrError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let dir = Self::model_dir();
        let mut ocr = OcrLite::new();
        ocr.init_models(
            &dir.join(DET_MODEL).to_string_lossy(),
            &dir.join(CLS_MODEL).to_string_lossy(),
            &dir.join(REC_MODEL).to_string_lossy(),
            4,
        )
        .map_err(|e| OcrError::OcrFailed(format!("init PaddleOCR: {}", e)))?;

        let _ = OCR_ENGINE.set(Mutex::new(ocr));
        OCR_ENGINE
            .get()
            .ok_or_else(|| OcrError::OcrFailed("cache OCR engine".to_string()))
    }

    fn run(image: &[u8]) -> Result<Vec<WordBox>, OcrError> {
        let engine = Self::get_or_init_engine()?;
        let mut ocr = engine
            .lock()
            .map_err(|e| OcrError::OcrFailed(format!("lock OCR engine: {}", e)))?;

        let tmp = tempfile::Builder::new()
            .prefix("scandex-paddle-")
            .suffix(".png")
            .tempfile()?;
        std::fs::write(tmp.path(), image)?;

        let result = ocr
            .detect_from_path(
                tmp.path().to_str().unwrap_or(""),
                50,    // padding
                1024,  // max side length
                0.5,   // box score threshold
                0.3,   // unclip ratio
                1.6,   // box threshold
                false, // do angle
                false, // most angle
            )
            .map_err(|e| OcrError::OcrFailed(format!("PaddleOCR detection failed: {}", e)))?;

        // paddle-ocr-rs reports line-level blocks; split each line's box
        // evenly across its words, weighted by character count.
        let mut words = Vec::new();
        for block in result.text_blocks {
            let xs: Vec<f32> = block.box_points.iter().map(|p| p.x as f32).collect();
            let ys: Vec<f32> = block.box_points.iter().map(|p| p.y as f32).collect();
            let (Some(x0), Some(x1)) = (
                xs.iter().cloned().reduce(f32::min),
                xs.iter().cloned().reduce(f32::max),
            ) else {
                continue;
            };
            let (Some(y0), Some(y1)) = (
                ys.iter().cloned().reduce(f32::min),
                ys.iter().cloned().reduce(f32::max),
            ) else {
                continue;
            };

            let parts: Vec<&str> = block.text.split_whitespace().collect();
            let total_chars: usize = parts.iter().map(|w| w.chars().count()).sum();
            if parts.is_empty() || total_chars == 0 {
                continue;
            }
            let line_width = x1 - x0;
            let mut cursor = x0;
            for part in parts {
                let share = part.chars().count() as f32 / total_chars as f32;
                let width = line_width * share;
                words.push(WordBox::new(
                    part,
                    cursor,
                    y0,
                    width,
                    y1 - y0,
                    block.text_score,
                ));
                cursor += width;
            }
        }
        Ok(words)
    }
}

impl Default for PaddleBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrBackend for PaddleBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Paddle
    }

    fn is_available(&self) -> bool {
        Self::has_models()
    }

    fn availability_hint(&self) -> String {
        if Self::has_models() {
            format!("PaddleOCR models found at {:?}", Self::model_dir())
        } else {
            format!(
                "PaddleOCR models missing; place {} and {} under {:?}",
                DET_MODEL,
                REC_MODEL,
                Self::model_dir()
            )
        }
    }

    async fn extract(&self, image: &[u8], _languages: &[String]) -> Result<OcrPageOutput, OcrError> {
        let bytes = image.to_vec();
        let words = tokio::task::spawn_blocking(move || Self::run(&bytes))
            .await
            .map_err(|e| OcrError::OcrFailed(format!("paddle task: {}", e)))??;
        Ok(OcrPageOutput::new(words, "paddle"))
    }
}
