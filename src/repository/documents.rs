//! Document row operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, DocumentStore, RepositoryError, Result};
use crate::models::{Document, FileType};

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let file_type: String = row.get("file_type")?;
    let metadata: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    Ok(Document {
        document_id: row.get("document_id")?,
        source_url: row.get("source_url")?,
        file_name: row.get("file_name")?,
        file_type: FileType::from_str(&file_type).unwrap_or(FileType::Pdf),
        file_size: row.get::<_, i64>("file_size")? as u64,
        page_count: row.get::<_, i64>("page_count")? as u32,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_at),
    })
}

impl DocumentStore {
    /// Insert a document row. Returns false when a row with the same
    /// content hash already exists (nothing is modified in that case).
    pub fn insert_document(&self, doc: &Document) -> Result<bool> {
        let conn = self.connect()?;
        let metadata = serde_json::to_string(&doc.metadata)?;
        let changed = conn.execute(
            r#"INSERT OR IGNORE INTO documents
               (document_id, source_url, file_name, file_type, file_size, page_count, metadata, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                doc.document_id,
                doc.source_url,
                doc.file_name,
                doc.file_type.as_str(),
                doc.file_size as i64,
                doc.page_count as i64,
                metadata,
                doc.created_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Get a document by id.
    pub fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let conn = self.connect()?;
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE document_id = ?1",
                params![document_id],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// Get a document by source URL.
    pub fn get_document_by_url(&self, url: &str) -> Result<Option<Document>> {
        let conn = self.connect()?;
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE source_url = ?1",
                params![url],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    pub fn document_exists(&self, document_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM documents WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record the final page count once splitting completes.
    pub fn set_page_count(&self, document_id: &str, page_count: u32) -> Result<()> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE documents SET page_count = ?1 WHERE document_id = ?2",
            params![page_count as i64, document_id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("document {}", document_id)));
        }
        Ok(())
    }

    pub fn count_documents(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete a document and, via cascades, its pages, OCR rows, entities,
    /// and search rows.
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "DELETE FROM documents WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(changed == 1)
    }
}
