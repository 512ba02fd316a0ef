use anyhow::Result;
use rusqlite::params;

use super::Store;
use super::types::{ClaimedJob, JobRecord, JobStatus};

impl Store {
    /// Enqueue an embedding job outside the document ingest path.
    pub async fn enqueue_embedding_job(
        &self,
        target_table: &str,
        target_id: i64,
        owner_id: &str,
        content: &str,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO embedding_jobs (target_table, target_id, owner_id, content)
             VALUES (?1, ?2, ?3, ?4)",
            params![target_table, target_id, owner_id, content],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Atomically claim up to `limit` pending jobs, oldest first. The single
    /// conditional UPDATE is the claim: a job row moves pending -> processing
    /// and is returned to exactly one caller, so concurrent workers never
    /// share a job.
    pub async fn claim_pending_jobs(&self, limit: usize) -> Result<Vec<ClaimedJob>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "UPDATE embedding_jobs SET status = 'processing'
             WHERE status = 'pending' AND id IN (
                 SELECT id FROM embedding_jobs WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC LIMIT ?1
             )
             RETURNING id, target_table, target_id, owner_id, content",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ClaimedJob {
                id: row.get(0)?,
                target_table: row.get(1)?,
                target_id: row.get(2)?,
                owner_id: row.get(3)?,
                content: row.get(4)?,
            })
        })?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Finish a claimed job: write the vector to the page row and the vec0
    /// index, then flip the job to completed. The status guard keeps a job
    /// that was failed concurrently from being resurrected.
    pub async fn complete_job(&self, job_id: i64, page_id: i64, embedding: &[f32]) -> Result<bool> {
        let vector_json = serde_json::to_string(embedding)?;
        let db = self.db.lock().await;
        let tx = db.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE embedding_jobs
             SET status = 'completed', processed_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status = 'processing'",
            params![job_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute(
            "UPDATE document_pages SET embedding = ?1 WHERE id = ?2",
            params![vector_json, page_id],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO vss_document_pages (rowid, embedding) VALUES (?1, ?2)",
            params![page_id, vector_json],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Record a terminal failure for a claimed job.
    pub async fn fail_job(&self, job_id: i64, error_message: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db.execute(
            "UPDATE embedding_jobs
             SET status = 'failed', error_message = ?2, processed_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status = 'processing'",
            params![job_id, error_message],
        )?;
        Ok(changed > 0)
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, target_table, target_id, status, error_message
             FROM embedding_jobs WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![job_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        match rows.next() {
            Some(row) => {
                let (id, target_table, target_id, status, error_message) = row?;
                let status = JobStatus::parse(&status)
                    .ok_or_else(|| anyhow::anyhow!("unknown job status '{}'", status))?;
                Ok(Some(JobRecord {
                    id,
                    target_table,
                    target_id,
                    status,
                    error_message,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn count_jobs_with_status(&self, status: &str) -> Result<i64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM embedding_jobs WHERE status = ?1",
            params![status],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
