//! Image page operations: inserts, worker claims, and the stale-claim reaper.

use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, DocumentStore, Result};
use crate::models::{ImagePage, OcrState};

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<ImagePage> {
    let state: String = row.get("ocr_state")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(ImagePage {
        page_id: row.get("page_id")?,
        document_id: row.get("document_id")?,
        page_number: row.get::<_, i64>("page_number")? as u32,
        image_path: row.get("image_path")?,
        width: row.get::<_, i64>("width")? as u32,
        height: row.get::<_, i64>("height")? as u32,
        ocr_state: OcrState::from_str(&state).unwrap_or(OcrState::Pending),
        ocr_error: row.get("ocr_error")?,
        attempts: row.get::<_, i64>("attempts")? as u32,
        updated_at: parse_datetime(&updated_at),
    })
}

impl DocumentStore {
    /// Insert a page row if absent. Page ids never change once produced.
    pub fn insert_page(&self, page: &ImagePage) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"INSERT OR IGNORE INTO image_pages
               (page_id, document_id, page_number, image_path, width, height, ocr_state, ocr_error, attempts, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                page.page_id,
                page.document_id,
                page.page_number as i64,
                page.image_path,
                page.width as i64,
                page.height as i64,
                page.ocr_state.as_str(),
                page.ocr_error,
                page.attempts as i64,
                page.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn get_page(&self, page_id: &str) -> Result<Option<ImagePage>> {
        let conn = self.connect()?;
        let page = conn
            .query_row(
                "SELECT * FROM image_pages WHERE page_id = ?1",
                params![page_id],
                row_to_page,
            )
            .optional()?;
        Ok(page)
    }

    /// All pages of a document ordered by page number.
    pub fn get_pages_for_document(&self, document_id: &str) -> Result<Vec<ImagePage>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM image_pages WHERE document_id = ?1 ORDER BY page_number ASC",
        )?;
        let pages = stmt
            .query_map(params![document_id], row_to_page)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    /// Atomically claim up to `limit` pending pages for processing.
    ///
    /// SQLite has no `FOR UPDATE SKIP LOCKED`; the claim is an optimistic CAS
    /// on `ocr_state` inside one transaction. A row lost to a concurrent
    /// worker simply drops out of the claimed set.
    pub fn claim_pending_pages(&self, limit: usize) -> Result<Vec<ImagePage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let candidates: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT page_id FROM image_pages WHERE ocr_state = 'pending' ORDER BY updated_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut claimed_ids = Vec::with_capacity(candidates.len());
        for page_id in candidates {
            let changed = tx.execute(
                "UPDATE image_pages SET ocr_state = 'in_progress', updated_at = ?1 WHERE page_id = ?2 AND ocr_state = 'pending'",
                params![now, page_id],
            )?;
            if changed == 1 {
                claimed_ids.push(page_id);
            }
        }

        let mut claimed = Vec::with_capacity(claimed_ids.len());
        for page_id in &claimed_ids {
            let page = tx.query_row(
                "SELECT * FROM image_pages WHERE page_id = ?1",
                params![page_id],
                row_to_page,
            )?;
            claimed.push(page);
        }
        tx.commit()?;
        Ok(claimed)
    }

    /// Release a claim without recording an attempt (shutdown/cancellation).
    pub fn release_claim(&self, page_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE image_pages SET ocr_state = 'pending', updated_at = ?1 WHERE page_id = ?2 AND ocr_state = 'in_progress'",
            params![Utc::now().to_rfc3339(), page_id],
        )?;
        Ok(())
    }

    /// Record a processing failure.
    ///
    /// Transient failures consume an attempt and requeue until the budget is
    /// spent; permanent failures (or an exhausted budget) mark the page
    /// failed with the reason recorded.
    pub fn record_page_failure(
        &self,
        page_id: &str,
        error: &str,
        transient: bool,
        max_attempts: u32,
    ) -> Result<OcrState> {
        let conn = self.connect()?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM image_pages WHERE page_id = ?1",
            params![page_id],
            |row| row.get(0),
        )?;
        let attempts = attempts as u32 + 1;
        let next_state = if transient && attempts < max_attempts {
            OcrState::Pending
        } else {
            OcrState::Failed
        };
        conn.execute(
            "UPDATE image_pages SET ocr_state = ?1, ocr_error = ?2, attempts = ?3, updated_at = ?4 WHERE page_id = ?5",
            params![
                next_state.as_str(),
                error,
                attempts as i64,
                Utc::now().to_rfc3339(),
                page_id
            ],
        )?;
        Ok(next_state)
    }

    /// Return pages stuck `in_progress` longer than the TTL to `pending`.
    /// Returns the number of reaped claims.
    pub fn reap_stale_claims(&self, ttl_seconds: u64) -> Result<usize> {
        let conn = self.connect()?;
        let cutoff = (Utc::now() - ChronoDuration::seconds(ttl_seconds as i64)).to_rfc3339();
        let changed = conn.execute(
            "UPDATE image_pages SET ocr_state = 'pending', updated_at = ?1 WHERE ocr_state = 'in_progress' AND updated_at < ?2",
            params![Utc::now().to_rfc3339(), cutoff],
        )?;
        Ok(changed)
    }

    pub fn count_pages_by_state(&self, state: OcrState) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM image_pages WHERE ocr_state = ?1",
            params![state.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, FileType};
    use crate::repository::test_store;

    fn seed_doc_with_pages(store: &DocumentStore, n: u32) -> String {
        let doc = Document::from_content(
            b"doc for pages",
            "scan.pdf".into(),
            FileType::Pdf,
            None,
            serde_json::json!({}),
        );
        store.insert_document(&doc).unwrap();
        for i in 1..=n {
            store
                .insert_page(&ImagePage::new(&doc.document_id, i, 800, 1000))
                .unwrap();
        }
        doc.document_id.clone()
    }

    #[test]
    fn test_insert_page_idempotent() {
        let (_dir, store) = test_store();
        let doc_id = seed_doc_with_pages(&store, 1);
        let again = ImagePage::new(&doc_id, 1, 800, 1000);
        assert!(!store.insert_page(&again).unwrap());
        assert_eq!(store.get_pages_for_document(&doc_id).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_moves_to_in_progress() {
        let (_dir, store) = test_store();
        seed_doc_with_pages(&store, 3);
        let claimed = store.claim_pending_pages(2).unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.iter().all(|p| p.ocr_state == OcrState::InProgress));
        assert_eq!(store.count_pages_by_state(OcrState::Pending).unwrap(), 1);
    }

    #[test]
    fn test_claims_do_not_overlap() {
        let (_dir, store) = test_store();
        seed_doc_with_pages(&store, 4);
        let a = store.claim_pending_pages(2).unwrap();
        let b = store.claim_pending_pages(4).unwrap();
        let mut all: Vec<String> = a.iter().chain(b.iter()).map(|p| p.page_id.clone()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_release_claim_requeues() {
        let (_dir, store) = test_store();
        seed_doc_with_pages(&store, 1);
        let claimed = store.claim_pending_pages(1).unwrap();
        store.release_claim(&claimed[0].page_id).unwrap();
        assert_eq!(store.count_pages_by_state(OcrState::Pending).unwrap(), 1);
        // Attempt counter untouched by a release.
        let page = store.get_page(&claimed[0].page_id).unwrap().unwrap();
        assert_eq!(page.attempts, 0);
    }

    #[test]
    fn test_transient_failure_requeues_until_budget() {
        let (_dir, store) = test_store();
        seed_doc_with_pages(&store, 1);
        let page = store.claim_pending_pages(1).unwrap().remove(0);
        let s1 = store
            .record_page_failure(&page.page_id, "timeout", true, 2)
            .unwrap();
        assert_eq!(s1, OcrState::Pending);
        store.claim_pending_pages(1).unwrap();
        let s2 = store
            .record_page_failure(&page.page_id, "timeout", true, 2)
            .unwrap();
        assert_eq!(s2, OcrState::Failed);
        let stored = store.get_page(&page.page_id).unwrap().unwrap();
        assert_eq!(stored.ocr_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_permanent_failure_fails_immediately() {
        let (_dir, store) = test_store();
        seed_doc_with_pages(&store, 1);
        let page = store.claim_pending_pages(1).unwrap().remove(0);
        let s = store
            .record_page_failure(&page.page_id, "corrupt image", false, 5)
            .unwrap();
        assert_eq!(s, OcrState::Failed);
    }

    #[test]
    fn test_reaper_requeues_stale_claims() {
        let (_dir, store) = test_store();
        seed_doc_with_pages(&store, 1);
        let page = store.claim_pending_pages(1).unwrap().remove(0);
        // TTL of zero makes every in-progress claim stale.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let reaped = store.reap_stale_claims(1).unwrap();
        assert_eq!(reaped, 1);
        let stored = store.get_page(&page.page_id).unwrap().unwrap();
        assert_eq!(stored.ocr_state, OcrState::Pending);
    }
}
