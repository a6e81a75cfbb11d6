//! OCR result persistence and entity queries.
//!
//! Writing a page's OCR output is a single transaction: prior OCR, entity,
//! and search rows for the page are deleted (cascades), the new rows are
//! inserted, and the page flips to `done`.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, DocumentStore, Result};
use crate::models::{EntityType, OcrText, PageBox, PageEntity, WordBox};

fn row_to_ocr_text(row: &Row<'_>) -> rusqlite::Result<OcrText> {
    let word_boxes: String = row.get("word_boxes")?;
    let bbox: Option<String> = row.get("bbox")?;
    let created_at: String = row.get("created_at")?;
    Ok(OcrText {
        ocr_id: row.get("ocr_id")?,
        page_id: row.get("page_id")?,
        document_id: row.get("document_id")?,
        raw_text: row.get("raw_text")?,
        normalized_text: row.get("normalized_text")?,
        word_boxes: serde_json::from_str::<Vec<WordBox>>(&word_boxes).unwrap_or_default(),
        bbox: bbox.and_then(|b| serde_json::from_str::<PageBox>(&b).ok()),
        page_confidence: row.get("page_confidence")?,
        engine: row.get("engine")?,
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<PageEntity> {
    let entity_type: String = row.get("entity_type")?;
    let bbox: Option<String> = row.get("bbox")?;
    Ok(PageEntity {
        entity_id: row.get("entity_id")?,
        ocr_id: row.get("ocr_id")?,
        document_id: row.get("document_id")?,
        entity_type: EntityType::from_str(&entity_type).unwrap_or(EntityType::Keyword),
        entity_value: row.get("entity_value")?,
        normalized_value: row.get("normalized_value")?,
        span: (
            row.get::<_, i64>("span_start")? as usize,
            row.get::<_, i64>("span_end")? as usize,
        ),
        bbox: bbox.and_then(|b| serde_json::from_str::<PageBox>(&b).ok()),
        confidence: row.get("confidence")?,
    })
}

/// Filters for entity listing.
#[derive(Debug, Default, Clone)]
pub struct EntityFilter {
    pub entity_type: Option<EntityType>,
    pub document_id: Option<String>,
    pub normalized_value: Option<String>,
    pub limit: usize,
}

impl DocumentStore {
    /// Persist one page's OCR output, entities, and search row atomically,
    /// flipping the page to `done`. Prior downstream rows are replaced.
    pub fn write_page_result(
        &self,
        ocr: &OcrText,
        entities: &[PageEntity],
        searchable_text: &str,
        tokens: &[String],
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        // Cascades remove entities, search_index, and embeddings rows.
        tx.execute(
            "DELETE FROM ocr_texts WHERE page_id = ?1",
            params![ocr.page_id],
        )?;

        tx.execute(
            r#"INSERT INTO ocr_texts
               (ocr_id, page_id, document_id, raw_text, normalized_text, word_boxes, bbox, page_confidence, engine, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                ocr.ocr_id,
                ocr.page_id,
                ocr.document_id,
                ocr.raw_text,
                ocr.normalized_text,
                serde_json::to_string(&ocr.word_boxes)?,
                ocr.bbox
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                ocr.page_confidence,
                ocr.engine,
                ocr.created_at.to_rfc3339(),
            ],
        )?;

        for entity in entities {
            tx.execute(
                r#"INSERT INTO entities
                   (entity_id, ocr_id, document_id, entity_type, entity_value, normalized_value, span_start, span_end, bbox, confidence)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                params![
                    entity.entity_id,
                    entity.ocr_id,
                    entity.document_id,
                    entity.entity_type.as_str(),
                    entity.entity_value,
                    entity.normalized_value,
                    entity.span.0 as i64,
                    entity.span.1 as i64,
                    entity
                        .bbox
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    entity.confidence,
                ],
            )?;
        }

        tx.execute(
            "INSERT INTO search_index (index_id, ocr_id, searchable_text, tokens) VALUES (?1, ?2, ?3, ?4)",
            params![
                uuid::Uuid::new_v4().to_string(),
                ocr.ocr_id,
                searchable_text,
                serde_json::to_string(tokens)?,
            ],
        )?;

        if let Some(vector) = embedding {
            tx.execute(
                "INSERT INTO page_embeddings (ocr_id, vector) VALUES (?1, ?2)",
                params![ocr.ocr_id, serde_json::to_string(vector)?],
            )?;
        }

        tx.execute(
            "UPDATE image_pages SET ocr_state = 'done', ocr_error = NULL, updated_at = ?1 WHERE page_id = ?2",
            params![Utc::now().to_rfc3339(), ocr.page_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_ocr_for_page(&self, page_id: &str) -> Result<Option<OcrText>> {
        let conn = self.connect()?;
        let ocr = conn
            .query_row(
                "SELECT * FROM ocr_texts WHERE page_id = ?1",
                params![page_id],
                row_to_ocr_text,
            )
            .optional()?;
        Ok(ocr)
    }

    pub fn get_ocr(&self, ocr_id: &str) -> Result<Option<OcrText>> {
        let conn = self.connect()?;
        let ocr = conn
            .query_row(
                "SELECT * FROM ocr_texts WHERE ocr_id = ?1",
                params![ocr_id],
                row_to_ocr_text,
            )
            .optional()?;
        Ok(ocr)
    }

    /// Delete an OCR row; cascades remove its entities and search row.
    pub fn delete_ocr(&self, ocr_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute("DELETE FROM ocr_texts WHERE ocr_id = ?1", params![ocr_id])?;
        Ok(changed == 1)
    }

    /// Exact entity lookup by type and normalized value.
    pub fn entities_by_normalized(
        &self,
        entity_type: EntityType,
        normalized_value: &str,
    ) -> Result<Vec<PageEntity>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM entities WHERE entity_type = ?1 AND normalized_value = ?2",
        )?;
        let entities = stmt
            .query_map(params![entity_type.as_str(), normalized_value], row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    /// Case-insensitive fallback lookup on the as-found value.
    pub fn entities_by_value_ci(
        &self,
        entity_type: EntityType,
        value: &str,
    ) -> Result<Vec<PageEntity>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM entities WHERE entity_type = ?1 AND LOWER(entity_value) = LOWER(?2)",
        )?;
        let entities = stmt
            .query_map(params![entity_type.as_str(), value], row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    /// List entities with optional filters.
    pub fn list_entities(&self, filter: &EntityFilter) -> Result<Vec<PageEntity>> {
        let conn = self.connect()?;
        let mut sql = String::from("SELECT * FROM entities WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(t) = filter.entity_type {
            sql.push_str(" AND entity_type = ?");
            args.push(Box::new(t.as_str().to_string()));
        }
        if let Some(doc) = &filter.document_id {
            sql.push_str(" AND document_id = ?");
            args.push(Box::new(doc.clone()));
        }
        if let Some(v) = &filter.normalized_value {
            sql.push_str(" AND normalized_value = ?");
            args.push(Box::new(v.clone()));
        }
        sql.push_str(" ORDER BY entity_type, normalized_value");
        if filter.limit > 0 {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(filter.limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let entities = stmt
            .query_map(params_ref.as_slice(), row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    pub fn count_ocr_texts(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ocr_texts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_search_rows(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, FileType, ImagePage, OcrState};
    use crate::repository::test_store;

    fn seed_page(store: &DocumentStore) -> (String, String) {
        let doc = Document::from_content(
            b"ocr doc",
            "scan.pdf".into(),
            FileType::Pdf,
            None,
            serde_json::json!({}),
        );
        store.insert_document(&doc).unwrap();
        let page = ImagePage::new(&doc.document_id, 1, 800, 1000);
        store.insert_page(&page).unwrap();
        (doc.document_id, page.page_id)
    }

    fn sample_ocr(document_id: &str, page_id: &str) -> OcrText {
        let words = vec![
            WordBox::new("flight", 10.0, 10.0, 60.0, 12.0, 0.9),
            WordBox::new("log", 80.0, 10.0, 30.0, 12.0, 0.8),
        ];
        OcrText {
            ocr_id: uuid::Uuid::new_v4().to_string(),
            page_id: page_id.to_string(),
            document_id: document_id.to_string(),
            raw_text: "flight log".into(),
            normalized_text: "flight log".into(),
            bbox: PageBox::enclosing(&words),
            page_confidence: OcrText::weighted_confidence(&words),
            word_boxes: words,
            engine: "tesseract".into(),
            created_at: Utc::now(),
        }
    }

    fn sample_entity(ocr: &OcrText) -> PageEntity {
        PageEntity {
            entity_id: uuid::Uuid::new_v4().to_string(),
            ocr_id: ocr.ocr_id.clone(),
            document_id: ocr.document_id.clone(),
            entity_type: EntityType::Email,
            entity_value: "A@B.COM".into(),
            normalized_value: Some("a@b.com".into()),
            span: (0, 7),
            bbox: None,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_write_page_result_flips_state() {
        let (_dir, store) = test_store();
        let (doc_id, page_id) = seed_page(&store);
        let ocr = sample_ocr(&doc_id, &page_id);
        store
            .write_page_result(&ocr, &[], "flight log", &["flight".into(), "log".into()], None)
            .unwrap();
        let page = store.get_page(&page_id).unwrap().unwrap();
        assert_eq!(page.ocr_state, OcrState::Done);
        let loaded = store.get_ocr_for_page(&page_id).unwrap().unwrap();
        assert_eq!(loaded.word_boxes.len(), 2);
        assert_eq!(store.count_search_rows().unwrap(), 1);
    }

    #[test]
    fn test_rewrite_replaces_downstream_rows() {
        let (_dir, store) = test_store();
        let (doc_id, page_id) = seed_page(&store);
        let first = sample_ocr(&doc_id, &page_id);
        store
            .write_page_result(&first, &[sample_entity(&first)], "flight log", &[], None)
            .unwrap();
        let second = sample_ocr(&doc_id, &page_id);
        store
            .write_page_result(&second, &[], "flight log", &[], None)
            .unwrap();

        // Exactly one OCR row and one search row survive, no orphan entities.
        assert_eq!(store.count_ocr_texts().unwrap(), 1);
        assert_eq!(store.count_search_rows().unwrap(), 1);
        assert!(store
            .entities_by_normalized(EntityType::Email, "a@b.com")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_delete_ocr_cascades() {
        let (_dir, store) = test_store();
        let (doc_id, page_id) = seed_page(&store);
        let ocr = sample_ocr(&doc_id, &page_id);
        store
            .write_page_result(&ocr, &[sample_entity(&ocr)], "flight log", &[], None)
            .unwrap();
        assert!(store.delete_ocr(&ocr.ocr_id).unwrap());
        assert_eq!(store.count_search_rows().unwrap(), 0);
        assert!(store
            .entities_by_normalized(EntityType::Email, "a@b.com")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_entity_lookup_case_insensitive_fallback() {
        let (_dir, store) = test_store();
        let (doc_id, page_id) = seed_page(&store);
        let ocr = sample_ocr(&doc_id, &page_id);
        store
            .write_page_result(&ocr, &[sample_entity(&ocr)], "flight log", &[], None)
            .unwrap();

        let exact = store
            .entities_by_normalized(EntityType::Email, "a@b.com")
            .unwrap();
        assert_eq!(exact.len(), 1);

        let ci = store
            .entities_by_value_ci(EntityType::Email, "a@b.com")
            .unwrap();
        assert_eq!(ci.len(), 1);
        assert_eq!(ci[0].entity_value, "A@B.COM");
    }

    #[test]
    fn test_list_entities_filters() {
        let (_dir, store) = test_store();
        let (doc_id, page_id) = seed_page(&store);
        let ocr = sample_ocr(&doc_id, &page_id);
        store
            .write_page_result(&ocr, &[sample_entity(&ocr)], "flight log", &[], None)
            .unwrap();

        let all = store.list_entities(&EntityFilter::default()).unwrap();
        assert_eq!(all.len(), 1);

        let filtered = store
            .list_entities(&EntityFilter {
                entity_type: Some(EntityType::Phone),
                ..Default::default()
            })
            .unwrap();
        assert!(filtered.is_empty());
    }
}
