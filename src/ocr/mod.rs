//! OCR backends and the per-page coordinator.
//!
//! Text recovery is polymorphic over a backend capability:
//!
//! - **Tesseract**: word-level TSV output via the system binary (default)
//! - **Textract**: HTTP adapter for a Textract-compatible service
//! - **OCRS**: pure Rust OCR (feature: ocr-ocrs)
//! - **PaddleOCR**: CNN-based OCR via ONNX (feature: ocr-paddle)
//! - **Ensemble**: word-level merge across the available backends
//!
//! The coordinator owns one backend chosen at startup, applies the
//! preprocessing stage, maps boxes back to original page coordinates, and
//! persists each page transactionally.

mod backend;
mod coordinator;
mod ensemble;
mod preprocess;
mod tesseract;
mod textract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;
#[cfg(feature = "ocr-paddle")]
mod paddle_backend;

pub use backend::{build_backend, check_binary, OcrBackend, OcrEngineKind, OcrError, OcrPageOutput};
pub use coordinator::OcrCoordinator;
pub use ensemble::{merge_word_sets, EnsembleBackend};
pub use preprocess::{detect_skew_angle, preprocess_image, unmap_words, PreparedImage};
pub use tesseract::TesseractBackend;
pub use textract::TextractBackend;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
pub use paddle_backend::PaddleBackend;
