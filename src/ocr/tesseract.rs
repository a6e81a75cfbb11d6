//! Tesseract OCR backend.
//!
//! Drives the system `tesseract` binary in TSV mode, which reports one row
//! per recognized word with pixel coordinates and a 0-100 confidence.

use async_trait::async_trait;

use super::backend::{check_binary, OcrBackend, OcrEngineKind, OcrError, OcrPageOutput};
use crate::models::WordBox;

/// Tesseract language pack names for common ISO 639-1 codes.
fn tesseract_lang(iso: &str) -> &str {
    match iso {
        "en" => "eng",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "nl" => "nld",
        "ru" => "rus",
        other => other,
    }
}

/// Tesseract OCR backend using the system binary.
pub struct TesseractBackend;

impl TesseractBackend {
    pub fn new() -> Self {
        Self
    }

    /// Parse tesseract TSV output into word boxes.
    ///
    /// Columns: level, page_num, block_num, par_num, line_num, word_num,
    /// left, top, width, height, conf, text. Word rows have level 5; rows
    /// with confidence -1 are layout artifacts.
    fn parse_tsv(tsv: &str) -> Vec<WordBox> {
        let mut words = Vec::new();
        for line in tsv.lines().skip(1) {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                continue;
            }
            let level: u32 = match cols[0].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if level != 5 {
                continue;
            }
            let conf: f32 = cols[10].parse().unwrap_or(-1.0);
            let text = cols[11].trim();
            if conf < 0.0 || text.is_empty() {
                continue;
            }
            let (Ok(left), Ok(top), Ok(width), Ok(height)) = (
                cols[6].parse::<f32>(),
                cols[7].parse::<f32>(),
                cols[8].parse::<f32>(),
                cols[9].parse::<f32>(),
            ) else {
                continue;
            };
            words.push(WordBox::new(text, left, top, width, height, conf / 100.0));
        }
        words
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if check_binary("tesseract") {
            "Tesseract is available".to_string()
        } else {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        }
    }

    async fn extract(&self, image: &[u8], languages: &[String]) -> Result<OcrPageOutput, OcrError> {
        let lang = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages
                .iter()
                .map(|l| tesseract_lang(l))
                .collect::<Vec<_>>()
                .join("+")
        };

        let tmp = tempfile::Builder::new()
            .prefix("scandex-ocr-")
            .suffix(".png")
            .tempfile()?;
        tokio::fs::write(tmp.path(), image).await?;

        let output = tokio::process::Command::new("tesseract")
            .arg(tmp.path())
            .arg("stdout")
            .args(["-l", &lang])
            .arg("tsv")
            .output()
            .await;

        match output {
            Ok(output) => {
                if output.status.success() {
                    let tsv = String::from_utf8_lossy(&output.stdout);
                    Ok(OcrPageOutput::new(Self::parse_tsv(&tsv), "tesseract"))
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::BackendNotAvailable(
                "tesseract not found (install tesseract-ocr)".to_string(),
            )),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_word_rows() {
        let tsv = format!(
            "{}\n1\t1\t0\t0\t0\t0\t0\t0\t800\t1000\t-1\t\n5\t1\t1\t1\t1\t1\t10\t20\t60\t14\t96.5\tflight\n5\t1\t1\t1\t1\t2\t80\t20\t30\t14\t88.0\tlog",
            HEADER
        );
        let words = TesseractBackend::parse_tsv(&tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "flight");
        assert!((words[0].confidence - 0.965).abs() < 1e-4);
        assert_eq!(words[1].x, 80.0);
    }

    #[test]
    fn test_parse_tsv_skips_negative_conf_and_blank() {
        let tsv = format!(
            "{}\n5\t1\t1\t1\t1\t1\t10\t20\t60\t14\t-1\tghost\n5\t1\t1\t1\t1\t2\t10\t20\t60\t14\t50\t \n4\t1\t1\t1\t1\t0\t10\t20\t600\t14\t95\tline",
            HEADER
        );
        assert!(TesseractBackend::parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn test_parse_tsv_malformed_lines_ignored() {
        let tsv = format!("{}\nnot\ta\tvalid\trow", HEADER);
        assert!(TesseractBackend::parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn test_language_mapping() {
        assert_eq!(tesseract_lang("en"), "eng");
        assert_eq!(tesseract_lang("xx"), "xx");
    }
}
