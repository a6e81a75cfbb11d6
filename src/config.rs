//! Configuration management.
//!
//! Configuration lives in an optional TOML file (`scandex.toml` in the data
//! directory by default) with serde defaults for every key, so a missing file
//! yields a fully usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// OCR engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineChoice {
    Tesseract,
    Easyocr,
    Paddle,
    Textract,
    Ensemble,
}

impl Default for OcrEngineChoice {
    fn default() -> Self {
        Self::Tesseract
    }
}

/// OCR settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub engine: OcrEngineChoice,
    /// ISO language codes passed to the backend.
    pub languages: Vec<String>,
    pub preprocess: bool,
    pub deskew: bool,
    /// Upsampling factors; results are merged by confidence.
    pub scales: Vec<f32>,
    /// Words below this confidence are dropped after merging.
    pub drop_confidence: f32,
    /// Rasterization DPI for PDF pages.
    pub dpi: u32,
    /// Endpoint for the Textract-compatible backend, when selected.
    pub textract_endpoint: Option<String>,
    /// Deadline for a single backend call, in seconds.
    pub call_timeout_seconds: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: OcrEngineChoice::default(),
            languages: vec!["en".to_string()],
            preprocess: true,
            deskew: true,
            scales: vec![1.0],
            drop_confidence: 0.3,
            dpi: 200,
            textract_endpoint: None,
            call_timeout_seconds: 300,
        }
    }
}

/// Crawler and fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Minimum delay between requests to the same host.
    pub rate_limit_per_host_ms: u64,
    pub max_concurrent_downloads: usize,
    /// Per-request HTTP deadline, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_host_ms: 250,
            max_concurrent_downloads: 4,
            request_timeout_seconds: 30,
        }
    }
}

/// Pending-pages worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub poll_seconds: u64,
    /// Claims older than this are returned to pending by the reaper.
    pub claim_ttl_seconds: u64,
    /// Transient failures allowed before a page is marked failed.
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            poll_seconds: 10,
            claim_ttl_seconds: 900,
            max_attempts: 5,
        }
    }
}

/// Periodic site ingest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteIngestConfig {
    pub skip_existing: bool,
    pub run_interval_seconds: u64,
    /// Root URL of the tracked site listing.
    pub root_url: String,
}

impl Default for SiteIngestConfig {
    fn default() -> Self {
        Self {
            skip_existing: true,
            run_interval_seconds: 600,
            root_url: "https://www.justice.gov/opa/media-resources".to_string(),
        }
    }
}

/// Search engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub fuzzy_threshold: f32,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Endpoint of the embedding service; unset disables semantic search.
    pub embedder_endpoint: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.6,
            default_limit: 50,
            max_limit: 1000,
            embedder_endpoint: None,
        }
    }
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory; database and blobs live underneath.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./scandex-data"),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("scandex.db")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrConfig,
    pub crawler: CrawlerConfig,
    pub worker: WorkerConfig,
    pub site_ingest: SiteIngestConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file, or defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Internal(format!("read config {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| CoreError::InvalidArgument(format!("parse config {}: {}", path.display(), e)))
    }

    /// Load from `SCANDEX_CONFIG` or the default location under the data dir.
    pub fn load_default() -> Result<Self, CoreError> {
        if let Ok(path) = std::env::var("SCANDEX_CONFIG") {
            return Self::load(Path::new(&path));
        }
        Self::load(Path::new("scandex.toml"))
    }

    /// Write the current configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Internal(format!("serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Internal(format!("create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, raw)
            .map_err(|e| CoreError::Internal(format!("write config {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.ocr.engine, OcrEngineChoice::Tesseract);
        assert_eq!(cfg.ocr.languages, vec!["en"]);
        assert!(cfg.ocr.preprocess);
        assert!(cfg.ocr.deskew);
        assert_eq!(cfg.ocr.scales, vec![1.0]);
        assert!((cfg.ocr.drop_confidence - 0.3).abs() < 1e-6);
        assert_eq!(cfg.crawler.rate_limit_per_host_ms, 250);
        assert_eq!(cfg.crawler.max_concurrent_downloads, 4);
        assert_eq!(cfg.worker.batch_size, 1);
        assert_eq!(cfg.worker.poll_seconds, 10);
        assert_eq!(cfg.worker.claim_ttl_seconds, 900);
        assert!(cfg.site_ingest.skip_existing);
        assert_eq!(cfg.site_ingest.run_interval_seconds, 600);
        assert!((cfg.search.fuzzy_threshold - 0.6).abs() < 1e-6);
        assert_eq!(cfg.search.default_limit, 50);
        assert_eq!(cfg.search.max_limit, 1000);
        assert!(cfg.search.embedder_endpoint.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [ocr]
            engine = "ensemble"
            [worker]
            batch_size = 8
        "#,
        )
        .unwrap();
        assert_eq!(cfg.ocr.engine, OcrEngineChoice::Ensemble);
        assert_eq!(cfg.ocr.dpi, 200);
        assert_eq!(cfg.worker.batch_size, 8);
        assert_eq!(cfg.worker.poll_seconds, 10);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scandex.toml");
        let mut cfg = Config::default();
        cfg.worker.batch_size = 3;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.worker.batch_size, 3);
    }
}
