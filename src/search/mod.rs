//! Multi-modal search over indexed pages.
//!
//! Five modes share one result shape: keyword (AND over tokens with
//! proximity-weighted counts), phrase (contiguous token runs), fuzzy
//! (trigram similarity), entity (exact normalized lookup), and semantic
//! (cosine over configured embeddings).

mod fuzzy;
mod semantic;
mod snippet;

pub use fuzzy::{best_similarity, trigram_similarity};
pub use semantic::{cosine_similarity, Embedder, HttpEmbedder};
pub use snippet::make_snippet;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::error::CoreError;
use crate::index::{tokenize_query, tokenize_with_offsets};
use crate::models::{EntityType, PageBox, WordBox};
use crate::repository::{DocumentStore, SearchRow};

/// Supported search modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Keyword,
    Phrase,
    Fuzzy,
    Entity,
    Semantic,
}

impl SearchMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "keyword" => Some(Self::Keyword),
            "phrase" => Some(Self::Phrase),
            "fuzzy" => Some(Self::Fuzzy),
            "entity" => Some(Self::Entity),
            "semantic" => Some(Self::Semantic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Phrase => "phrase",
            Self::Fuzzy => "fuzzy",
            Self::Entity => "entity",
            Self::Semantic => "semantic",
        }
    }
}

/// Per-query options.
#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    /// Required for entity mode.
    pub entity_type: Option<EntityType>,
    /// Overrides the configured fuzzy threshold.
    pub fuzzy_threshold: Option<f32>,
}

/// One search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub ocr_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub snippet: String,
    pub full_text: String,
    pub page_confidence: f32,
    pub image_path: String,
    pub bbox: Option<PageBox>,
    pub word_boxes: Vec<WordBox>,
    pub score: f32,
}

/// An internal match before hydration: which page, how strong, and where
/// the snippet anchors (char offset + length in normalized text).
struct Candidate {
    ocr_id: String,
    score: f32,
    confidence: f32,
    created_at: chrono::DateTime<chrono::Utc>,
    anchor: Option<(usize, usize)>,
    bbox_override: Option<PageBox>,
}

/// Collapse runs of single-letter tokens so dotted acronyms compare equal
/// to their compact forms ("u s" from "U.S." vs "us").
fn collapse_acronyms(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut run = String::new();
    for token in tokens {
        if token.chars().count() == 1 {
            run.push_str(token);
        } else {
            if !run.is_empty() {
                out.push(std::mem::take(&mut run));
            }
            out.push(token.clone());
        }
    }
    if !run.is_empty() {
        out.push(run);
    }
    out
}

/// The search engine over the persistent index.
pub struct SearchEngine {
    store: DocumentStore,
    config: SearchConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SearchEngine {
    pub fn new(
        store: DocumentStore,
        config: SearchConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            store,
            config,
            embedder,
        }
    }

    /// Run a search. Empty queries are invalid; `limit = 0` yields an empty
    /// result list without error.
    pub async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>, CoreError> {
        if query.trim().is_empty() {
            return Err(CoreError::InvalidArgument("query must not be empty".into()));
        }
        let limit = opts
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut candidates = match mode {
            SearchMode::Keyword => self.keyword_candidates(query)?,
            SearchMode::Phrase => self.phrase_candidates(query)?,
            SearchMode::Fuzzy => self.fuzzy_candidates(query, opts)?,
            SearchMode::Entity => self.entity_candidates(query, opts)?,
            SearchMode::Semantic => self.semantic_candidates(query).await?,
        };

        // Total order: score desc, confidence desc, created_at asc, id asc.
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.created_at.cmp(&b.created_at))
                .then(a.ocr_id.cmp(&b.ocr_id))
        });
        candidates.truncate(limit);

        let mut hits = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(row) = self.store.load_hit(&candidate.ocr_id)? else {
                continue;
            };
            let snippet = match candidate.anchor {
                Some((start, len)) => make_snippet(&row.normalized_text, start, len),
                None => make_snippet(&row.normalized_text, 0, 0),
            };
            hits.push(SearchHit {
                ocr_id: row.ocr_id,
                document_id: row.document_id,
                page_number: row.page_number,
                snippet,
                full_text: row.normalized_text,
                page_confidence: row.page_confidence,
                image_path: row.image_path,
                bbox: candidate.bbox_override.or(row.bbox),
                word_boxes: row.word_boxes,
                score: candidate.score,
            });
        }
        Ok(hits)
    }

    /// First char-anchor of any of the query tokens in a page.
    fn first_token_anchor(
        row: &SearchRow,
        query_tokens: &[String],
    ) -> Option<(usize, usize)> {
        let offsets = tokenize_with_offsets(&row.normalized_text);
        offsets
            .iter()
            .find(|(t, _, _)| query_tokens.iter().any(|q| q == t))
            .map(|(_, start, end)| (*start, end - start))
    }

    fn keyword_candidates(&self, query: &str) -> Result<Vec<Candidate>, CoreError> {
        let query_tokens = tokenize_query(query);
        if query_tokens.is_empty() {
            return Err(CoreError::InvalidArgument(
                "query contains no searchable tokens".into(),
            ));
        }

        let rows = self.store.load_search_rows()?;
        let mut out = Vec::new();
        'rows: for row in rows {
            // Positions of every query token in the page token sequence.
            let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
            for (idx, token) in row.tokens.iter().enumerate() {
                for q in &query_tokens {
                    if q == token {
                        positions.entry(q.as_str()).or_default().push(idx);
                    }
                }
            }
            // AND semantics: every token must appear.
            for q in &query_tokens {
                if !positions.contains_key(q.as_str()) {
                    continue 'rows;
                }
            }

            let mut score = 0.0f32;
            for q in &query_tokens {
                let own = &positions[q.as_str()];
                let count = own.len() as f32;
                let mut nearest = 0usize;
                if query_tokens.len() > 1 {
                    let mut best = usize::MAX;
                    for (other, other_positions) in &positions {
                        if *other == q.as_str() {
                            continue;
                        }
                        for a in own {
                            for b in other_positions {
                                best = best.min(a.abs_diff(*b));
                            }
                        }
                    }
                    nearest = if best == usize::MAX { 0 } else { best };
                }
                score += count / (1.0 + nearest as f32);
            }

            let anchor = Self::first_token_anchor(&row, &query_tokens);
            out.push(Candidate {
                ocr_id: row.ocr_id,
                score,
                confidence: row.page_confidence,
                created_at: row.created_at,
                anchor,
                bbox_override: None,
            });
        }
        Ok(out)
    }

    fn phrase_candidates(&self, query: &str) -> Result<Vec<Candidate>, CoreError> {
        let raw_query = tokenize_query(query);
        if raw_query.is_empty() {
            return Err(CoreError::InvalidArgument(
                "query contains no searchable tokens".into(),
            ));
        }
        let query_tokens = collapse_acronyms(&raw_query);

        let rows = self.store.load_search_rows()?;
        let mut out = Vec::new();
        for row in rows {
            let page_tokens = collapse_acronyms(&row.tokens);
            if query_tokens.len() > page_tokens.len() {
                continue;
            }
            let occurrences = page_tokens
                .windows(query_tokens.len())
                .filter(|w| *w == query_tokens.as_slice())
                .count();
            if occurrences == 0 {
                continue;
            }
            let anchor = Self::first_token_anchor(&row, &raw_query);
            out.push(Candidate {
                ocr_id: row.ocr_id,
                score: occurrences as f32,
                confidence: row.page_confidence,
                created_at: row.created_at,
                anchor,
                bbox_override: None,
            });
        }
        Ok(out)
    }

    fn fuzzy_candidates(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<Candidate>, CoreError> {
        let query_tokens = tokenize_query(query);
        if query_tokens.is_empty() {
            return Err(CoreError::InvalidArgument(
                "query contains no searchable tokens".into(),
            ));
        }
        let threshold = opts.fuzzy_threshold.unwrap_or(self.config.fuzzy_threshold);

        let rows = self.store.load_search_rows()?;
        let mut out = Vec::new();
        for row in rows {
            let mut best_sims = Vec::with_capacity(query_tokens.len());
            for q in &query_tokens {
                best_sims.push(best_similarity(q, &row.tokens));
            }
            let matched = best_sims.iter().filter(|s| **s >= threshold).count();
            // At least half of the query tokens must find a close page token.
            if matched * 2 < query_tokens.len() {
                continue;
            }
            let score = best_sims.iter().sum::<f32>() / best_sims.len() as f32;

            // Anchor on the page token closest to any query token.
            let anchor = {
                let offsets = tokenize_with_offsets(&row.normalized_text);
                let mut best: Option<(f32, usize, usize)> = None;
                for (token, start, end) in &offsets {
                    for q in &query_tokens {
                        let sim = trigram_similarity(q, token);
                        if best.map(|(b, _, _)| sim > b).unwrap_or(true) {
                            best = Some((sim, *start, end - start));
                        }
                    }
                }
                best.map(|(_, start, len)| (start, len))
            };

            out.push(Candidate {
                ocr_id: row.ocr_id,
                score,
                confidence: row.page_confidence,
                created_at: row.created_at,
                anchor,
                bbox_override: None,
            });
        }
        Ok(out)
    }

    fn entity_candidates(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<Candidate>, CoreError> {
        let entity_type = opts.entity_type.ok_or_else(|| {
            CoreError::InvalidArgument("entity search requires an entity_type".into())
        })?;

        let mut entities = self
            .store
            .entities_by_normalized(entity_type, &query.to_lowercase())?;
        if entities.is_empty() {
            entities = self.store.entities_by_value_ci(entity_type, query)?;
        }

        // One result per matching OCR text.
        let mut by_ocr: HashMap<String, Candidate> = HashMap::new();
        for entity in entities {
            let Some(ocr) = self.store.get_ocr(&entity.ocr_id)? else {
                continue;
            };
            by_ocr.entry(entity.ocr_id.clone()).or_insert(Candidate {
                ocr_id: entity.ocr_id.clone(),
                score: entity.confidence,
                confidence: ocr.page_confidence,
                created_at: ocr.created_at,
                anchor: Some((entity.span.0, entity.span.1 - entity.span.0)),
                bbox_override: entity.bbox,
            });
        }
        Ok(by_ocr.into_values().collect())
    }

    async fn semantic_candidates(&self, query: &str) -> Result<Vec<Candidate>, CoreError> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            CoreError::CapabilityDisabled("semantic search requires a configured embedder".into())
        })?;
        let query_vector = embedder.embed(query).await?;

        let mut out = Vec::new();
        for (ocr_id, vector) in self.store.load_embeddings()? {
            let score = cosine_similarity(&query_vector, &vector);
            if score <= 0.0 {
                continue;
            }
            let Some(ocr) = self.store.get_ocr(&ocr_id)? else {
                continue;
            };
            out.push(Candidate {
                ocr_id,
                score,
                confidence: ocr.page_confidence,
                created_at: ocr.created_at,
                anchor: None,
                bbox_override: None,
            });
        }
        Ok(out)
    }
}
