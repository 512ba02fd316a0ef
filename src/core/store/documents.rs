use anyhow::Result;
use rusqlite::params;

use super::Store;
use super::types::{DocumentPage, DocumentRecord, DocumentStatus, GeneratedDocument};

impl Store {
    /// Insert a document, its pages, and one pending embedding job per page,
    /// all in a single transaction. A document with no pages has nothing to
    /// embed and is completed immediately.
    pub async fn ingest_document(
        &self,
        owner_id: &str,
        title: &str,
        pages: &[String],
    ) -> Result<DocumentRecord> {
        let db = self.db.lock().await;
        let tx = db.unchecked_transaction()?;

        let status = if pages.is_empty() {
            DocumentStatus::Completed
        } else {
            DocumentStatus::Processing
        };
        tx.execute(
            "INSERT INTO documents (owner_id, title, status) VALUES (?1, ?2, ?3)",
            params![owner_id, title, status.as_str()],
        )?;
        let document_id = tx.last_insert_rowid();

        for (i, content) in pages.iter().enumerate() {
            tx.execute(
                "INSERT INTO document_pages (document_id, page_number, content)
                 VALUES (?1, ?2, ?3)",
                params![document_id, (i + 1) as i64, content],
            )?;
            let page_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO embedding_jobs (target_table, target_id, owner_id, content)
                 VALUES ('document_pages', ?1, ?2, ?3)",
                params![page_id, owner_id, content],
            )?;
        }

        let created_at: String = tx.query_row(
            "SELECT created_at FROM documents WHERE id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(DocumentRecord {
            id: document_id,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            status,
            created_at,
        })
    }

    pub async fn get_document(&self, document_id: i64) -> Result<Option<DocumentRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, owner_id, title, status, created_at FROM documents WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![document_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        match rows.next() {
            Some(row) => {
                let (id, owner_id, title, status, created_at) = row?;
                let status = DocumentStatus::parse(&status)
                    .ok_or_else(|| anyhow::anyhow!("unknown document status '{}'", status))?;
                Ok(Some(DocumentRecord {
                    id,
                    owner_id,
                    title,
                    status,
                    created_at,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn list_document_pages(&self, document_id: i64) -> Result<Vec<DocumentPage>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, document_id, page_number, content FROM document_pages
             WHERE document_id = ?1 ORDER BY page_number ASC",
        )?;
        let rows = stmt.query_map(params![document_id], |row| {
            Ok(DocumentPage {
                id: row.get(0)?,
                document_id: row.get(1)?,
                page_number: row.get(2)?,
                content: row.get(3)?,
            })
        })?;
        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }

    /// Flip the document to completed if it is still processing, no
    /// non-terminal embedding jobs remain for its pages, and at least one
    /// page actually got an embedding. The conditional UPDATE makes the
    /// transition exactly-once: concurrent callers race on the status guard
    /// and only one row change is ever reported.
    pub async fn try_complete_document(&self, document_id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE documents SET status = 'completed', updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status = 'processing'
               AND NOT EXISTS (
                   SELECT 1 FROM embedding_jobs j
                   JOIN document_pages p ON p.id = j.target_id
                   WHERE j.target_table = 'document_pages'
                     AND p.document_id = ?1
                     AND j.status IN ('pending', 'processing')
               )
               AND EXISTS (
                   SELECT 1 FROM embedding_jobs j
                   JOIN document_pages p ON p.id = j.target_id
                   WHERE j.target_table = 'document_pages'
                     AND p.document_id = ?1
                     AND j.status = 'completed'
               )",
            params![document_id],
        )?;
        Ok(changed > 0)
    }

    /// Mark the document failed when every job is terminal and none
    /// succeeded. Same exactly-once guard as completion.
    pub async fn try_fail_document(&self, document_id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE documents SET status = 'failed', updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status = 'processing'
               AND NOT EXISTS (
                   SELECT 1 FROM embedding_jobs j
                   JOIN document_pages p ON p.id = j.target_id
                   WHERE j.target_table = 'document_pages'
                     AND p.document_id = ?1
                     AND j.status != 'failed'
               )",
            params![document_id],
        )?;
        Ok(changed > 0)
    }

    /// Document ids owned by the pages backing the given job targets.
    /// Used after a batch to know which documents may have just finished.
    pub async fn documents_for_page_ids(&self, page_ids: &[i64]) -> Result<Vec<i64>> {
        if page_ids.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.db.lock().await;
        let placeholders = std::iter::repeat("?")
            .take(page_ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT DISTINCT document_id FROM document_pages WHERE id IN ({placeholders})
             ORDER BY document_id"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(page_ids.iter()), |row| {
            row.get::<_, i64>(0)
        })?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub async fn record_generated_document(
        &self,
        owner_id: &str,
        title: &str,
        file_path: &str,
        source_ids: &[i64],
    ) -> Result<GeneratedDocument> {
        let source_json = serde_json::to_string(source_ids)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO generated_documents (owner_id, title, file_path, source_ids)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, title, file_path, source_json],
        )?;
        let id = db.last_insert_rowid();
        let created_at: String = db.query_row(
            "SELECT created_at FROM generated_documents WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(GeneratedDocument {
            id,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            file_path: file_path.to_string(),
            source_ids: source_ids.to_vec(),
            created_at,
        })
    }

    pub async fn get_generated_document(
        &self,
        owner_id: &str,
        id: i64,
    ) -> Result<Option<GeneratedDocument>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, owner_id, title, file_path, source_ids, created_at
             FROM generated_documents WHERE id = ?1 AND owner_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![id, owner_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        match rows.next() {
            Some(row) => {
                let (id, owner_id, title, file_path, source_json, created_at) = row?;
                let source_ids: Vec<i64> = serde_json::from_str(&source_json)?;
                Ok(Some(GeneratedDocument {
                    id,
                    owner_id,
                    title,
                    file_path,
                    source_ids,
                    created_at,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn log_email(
        &self,
        owner_id: &str,
        recipient: &str,
        subject: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO email_log (owner_id, recipient, subject, status, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![owner_id, recipient, subject, status, error],
        )?;
        Ok(())
    }
}
