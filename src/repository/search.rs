//! Search row loading for the query engine.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, DocumentStore, Result};
use crate::models::{PageBox, WordBox};

/// Lightweight row used for scoring; word boxes are hydrated per hit.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub ocr_id: String,
    pub tokens: Vec<String>,
    pub searchable_text: String,
    pub normalized_text: String,
    pub page_confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// Full hit payload for a single OCR row.
#[derive(Debug, Clone)]
pub struct SearchHitRow {
    pub ocr_id: String,
    pub document_id: String,
    pub page_id: String,
    pub page_number: u32,
    pub normalized_text: String,
    pub page_confidence: f32,
    pub image_path: String,
    pub bbox: Option<PageBox>,
    pub word_boxes: Vec<WordBox>,
}

fn row_to_search_row(row: &Row<'_>) -> rusqlite::Result<SearchRow> {
    let tokens: String = row.get("tokens")?;
    let created_at: String = row.get("created_at")?;
    Ok(SearchRow {
        ocr_id: row.get("ocr_id")?,
        tokens: serde_json::from_str::<Vec<String>>(&tokens).unwrap_or_default(),
        searchable_text: row.get("searchable_text")?,
        normalized_text: row.get("normalized_text")?,
        page_confidence: row.get("page_confidence")?,
        created_at: parse_datetime(&created_at),
    })
}

impl DocumentStore {
    /// Load every indexed page for in-memory scoring.
    ///
    /// Pages with empty text never become hits, so rows with no tokens are
    /// filtered at the SQL level.
    pub fn load_search_rows(&self) -> Result<Vec<SearchRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"SELECT s.ocr_id, s.tokens, s.searchable_text,
                      o.normalized_text, o.page_confidence, o.created_at
               FROM search_index s
               JOIN ocr_texts o ON o.ocr_id = s.ocr_id
               WHERE s.searchable_text <> ''"#,
        )?;
        let rows = stmt
            .query_map([], row_to_search_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Hydrate the full result payload for one OCR row.
    pub fn load_hit(&self, ocr_id: &str) -> Result<Option<SearchHitRow>> {
        let conn = self.connect()?;
        let hit = conn
            .query_row(
                r#"SELECT o.ocr_id, o.document_id, o.page_id, o.normalized_text,
                          o.page_confidence, o.word_boxes, o.bbox,
                          p.page_number, p.image_path
                   FROM ocr_texts o
                   JOIN image_pages p ON p.page_id = o.page_id
                   WHERE o.ocr_id = ?1"#,
                params![ocr_id],
                |row| {
                    let word_boxes: String = row.get("word_boxes")?;
                    let bbox: Option<String> = row.get("bbox")?;
                    Ok(SearchHitRow {
                        ocr_id: row.get("ocr_id")?,
                        document_id: row.get("document_id")?,
                        page_id: row.get("page_id")?,
                        page_number: row.get::<_, i64>("page_number")? as u32,
                        normalized_text: row.get("normalized_text")?,
                        page_confidence: row.get("page_confidence")?,
                        image_path: row.get("image_path")?,
                        bbox: bbox.and_then(|b| serde_json::from_str::<PageBox>(&b).ok()),
                        word_boxes: serde_json::from_str::<Vec<WordBox>>(&word_boxes)
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    /// All stored page embeddings for cosine ranking.
    pub fn load_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT ocr_id, vector FROM page_embeddings")?;
        let rows = stmt
            .query_map([], |row| {
                let ocr_id: String = row.get(0)?;
                let vector: String = row.get(1)?;
                Ok((ocr_id, vector))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, raw)| {
                serde_json::from_str::<Vec<f32>>(&raw).ok().map(|v| (id, v))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, FileType, ImagePage, OcrText};
    use crate::repository::test_store;

    fn seed_indexed_page(store: &DocumentStore, text: &str, tokens: &[&str]) -> String {
        let doc = Document::from_content(
            text.as_bytes(),
            "scan.png".into(),
            FileType::Png,
            None,
            serde_json::json!({}),
        );
        store.insert_document(&doc).unwrap();
        let page = ImagePage::new(&doc.document_id, 1, 800, 1000);
        store.insert_page(&page).unwrap();
        let ocr = OcrText {
            ocr_id: uuid::Uuid::new_v4().to_string(),
            page_id: page.page_id.clone(),
            document_id: doc.document_id.clone(),
            raw_text: text.into(),
            normalized_text: text.into(),
            word_boxes: vec![WordBox::new("w", 0.0, 0.0, 10.0, 10.0, 0.9)],
            bbox: None,
            page_confidence: 0.9,
            engine: "mock".into(),
            created_at: Utc::now(),
        };
        let token_vec: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        store
            .write_page_result(&ocr, &[], &text.to_lowercase(), &token_vec, None)
            .unwrap();
        ocr.ocr_id
    }

    #[test]
    fn test_load_search_rows_skips_empty_text() {
        let (_dir, store) = test_store();
        seed_indexed_page(&store, "flight log", &["flight", "log"]);
        seed_indexed_page(&store, "", &[]);
        let rows = store.load_search_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tokens, vec!["flight", "log"]);
    }

    #[test]
    fn test_load_hit_includes_page_info() {
        let (_dir, store) = test_store();
        let ocr_id = seed_indexed_page(&store, "flight log", &["flight", "log"]);
        let hit = store.load_hit(&ocr_id).unwrap().unwrap();
        assert_eq!(hit.page_number, 1);
        assert!(hit.image_path.starts_with("images/"));
        assert_eq!(hit.word_boxes.len(), 1);
        assert!(store.load_hit("missing").unwrap().is_none());
    }
}
