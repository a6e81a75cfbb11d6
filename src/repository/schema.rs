//! Database schema initialization.

use rusqlite::params;

use super::{DocumentStore, Result};

/// Bumped when the schema changes shape; additive migrations key off it.
pub(crate) const STORAGE_FORMAT_VERSION: u32 = 2;

impl DocumentStore {
    /// Initialize the database schema.
    pub(crate) fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                source_url TEXT,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                page_count INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS image_pages (
                page_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                page_number INTEGER NOT NULL,
                image_path TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                ocr_state TEXT NOT NULL DEFAULT 'pending',
                ocr_error TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                UNIQUE(document_id, page_number)
            );

            CREATE TABLE IF NOT EXISTS ocr_texts (
                ocr_id TEXT PRIMARY KEY,
                page_id TEXT NOT NULL UNIQUE REFERENCES image_pages(page_id) ON DELETE CASCADE,
                document_id TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                word_boxes TEXT NOT NULL,
                bbox TEXT,
                page_confidence REAL NOT NULL,
                engine TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entities (
                entity_id TEXT PRIMARY KEY,
                ocr_id TEXT NOT NULL REFERENCES ocr_texts(ocr_id) ON DELETE CASCADE,
                document_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_value TEXT NOT NULL,
                normalized_value TEXT,
                span_start INTEGER NOT NULL,
                span_end INTEGER NOT NULL,
                bbox TEXT,
                confidence REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS search_index (
                index_id TEXT PRIMARY KEY,
                ocr_id TEXT NOT NULL UNIQUE REFERENCES ocr_texts(ocr_id) ON DELETE CASCADE,
                searchable_text TEXT NOT NULL,
                tokens TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS page_embeddings (
                ocr_id TEXT PRIMARY KEY REFERENCES ocr_texts(ocr_id) ON DELETE CASCADE,
                vector TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS storage_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_source_url
                ON documents(source_url);
            CREATE INDEX IF NOT EXISTS idx_image_pages_document
                ON image_pages(document_id, page_number);
            CREATE INDEX IF NOT EXISTS idx_image_pages_queue
                ON image_pages(ocr_state)
                WHERE ocr_state IN ('pending', 'in_progress');
            CREATE INDEX IF NOT EXISTS idx_ocr_texts_document
                ON ocr_texts(document_id);
            CREATE INDEX IF NOT EXISTS idx_entities_ocr
                ON entities(ocr_id);
            CREATE INDEX IF NOT EXISTS idx_entities_type_value
                ON entities(entity_type, normalized_value);
        "#,
        )?;

        self.record_format_version(&conn)?;
        Ok(())
    }

    fn record_format_version(&self, conn: &rusqlite::Connection) -> Result<()> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM storage_meta WHERE key = 'format_version'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match existing.and_then(|v| v.parse::<u32>().ok()) {
            Some(v) if v == STORAGE_FORMAT_VERSION => {}
            Some(v) if v < STORAGE_FORMAT_VERSION => {
                // Additive schema only; CREATE IF NOT EXISTS above already
                // brought the store forward.
                tracing::info!("Upgraded store format from {} to {}", v, STORAGE_FORMAT_VERSION);
                conn.execute(
                    "UPDATE storage_meta SET value = ?1 WHERE key = 'format_version'",
                    params![STORAGE_FORMAT_VERSION.to_string()],
                )?;
            }
            Some(v) => {
                tracing::warn!(
                    "Store format {} is newer than supported {}; proceeding read-compatibly",
                    v,
                    STORAGE_FORMAT_VERSION
                );
            }
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO storage_meta (key, value) VALUES ('format_version', ?1)",
                    params![STORAGE_FORMAT_VERSION.to_string()],
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_store;

    #[test]
    fn test_init_schema_creates_tables() {
        let (_dir, store) = test_store();
        let conn = store.connect().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for expected in [
            "documents",
            "entities",
            "image_pages",
            "ocr_texts",
            "page_embeddings",
            "search_index",
            "storage_meta",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let (_dir, store) = test_store();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
    }
}
