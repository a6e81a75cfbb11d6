//! Ensemble backend: word-level merge across multiple backends.

use async_trait::async_trait;

use super::backend::{OcrBackend, OcrEngineKind, OcrError, OcrPageOutput};
use crate::models::WordBox;

/// Minimum overlap for two words to be considered the same detection.
const MERGE_IOU: f32 = 0.5;

/// Case-insensitive edit distance allowed between matching words.
const MERGE_EDIT_DISTANCE: usize = 1;

/// Whether two detections describe the same word.
fn words_match(a: &WordBox, b: &WordBox) -> bool {
    if a.iou(b) < MERGE_IOU {
        return false;
    }
    strsim::levenshtein(&a.text.to_lowercase(), &b.text.to_lowercase()) <= MERGE_EDIT_DISTANCE
}

/// Merge two detections: higher confidence wins, longer text is kept.
fn merge_pair(a: WordBox, b: WordBox) -> WordBox {
    let text = if b.text.chars().count() > a.text.chars().count() {
        b.text.clone()
    } else {
        a.text.clone()
    };
    let base = if b.confidence > a.confidence { b } else { a };
    WordBox::new(text, base.x, base.y, base.width, base.height, base.confidence)
}

/// Fold a second backend's words into an accumulated set. Matching pairs
/// collapse to one box; unmatched boxes pass through.
pub fn merge_word_sets(mut base: Vec<WordBox>, other: Vec<WordBox>) -> Vec<WordBox> {
    for word in other {
        match base.iter().position(|existing| words_match(existing, &word)) {
            Some(idx) => {
                let existing = base.remove(idx);
                base.push(merge_pair(existing, word));
            }
            None => base.push(word),
        }
    }
    base
}

/// Runs every member backend on the same image and merges at the word level.
pub struct EnsembleBackend {
    members: Vec<std::sync::Arc<dyn OcrBackend>>,
    drop_confidence: f32,
}

impl EnsembleBackend {
    pub fn new(members: Vec<std::sync::Arc<dyn OcrBackend>>, drop_confidence: f32) -> Self {
        Self {
            members,
            drop_confidence,
        }
    }
}

#[async_trait]
impl OcrBackend for EnsembleBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Ensemble
    }

    fn is_available(&self) -> bool {
        self.members.iter().any(|m| m.is_available())
    }

    fn availability_hint(&self) -> String {
        let hints: Vec<String> = self
            .members
            .iter()
            .map(|m| format!("{}: {}", m.kind().as_str(), m.availability_hint()))
            .collect();
        hints.join("; ")
    }

    async fn extract(&self, image: &[u8], languages: &[String]) -> Result<OcrPageOutput, OcrError> {
        let mut merged: Vec<WordBox> = Vec::new();
        let mut succeeded = 0usize;
        let mut last_error: Option<OcrError> = None;

        for member in &self.members {
            match member.extract(image, languages).await {
                Ok(output) => {
                    succeeded += 1;
                    merged = merge_word_sets(merged, output.words);
                }
                Err(e) => {
                    tracing::warn!("Ensemble member {} failed: {}", member.kind().as_str(), e);
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            return Err(last_error
                .unwrap_or_else(|| OcrError::BackendNotAvailable("no ensemble members".into())));
        }

        merged.retain(|w| w.confidence >= self.drop_confidence);
        Ok(OcrPageOutput::new(merged, "ensemble"))
    }
}
