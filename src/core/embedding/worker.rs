use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::Embedder;
use crate::core::store::Store;

/// Summary of one worker pass over the job queue.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Drains pending embedding jobs in batches. Each pass claims a batch,
/// embeds every job, then settles any documents whose last outstanding job
/// just finished. Safe to run from overlapping cron ticks because claiming
/// is atomic in the store.
pub struct EmbeddingWorker {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingWorker {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Process at most one batch. An empty queue is a no-op returning an
    /// all-zero outcome.
    pub async fn process_batch(&self) -> Result<BatchOutcome> {
        let jobs = self.store.claim_pending_jobs(self.batch_size).await?;
        if jobs.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut outcome = BatchOutcome::default();
        let mut touched_pages = Vec::with_capacity(jobs.len());

        for job in &jobs {
            if job.target_table == "document_pages" {
                touched_pages.push(job.target_id);
            }
            match self.embedder.embed(&job.content).await {
                Ok(vector) => {
                    self.store.complete_job(job.id, job.target_id, &vector).await?;
                    outcome.processed += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("embedding job {} failed: {}", job.id, message);
                    self.store.fail_job(job.id, &message).await?;
                    outcome.failed += 1;
                    outcome.errors.push(format!("job {}: {}", job.id, message));
                }
            }
        }

        // Settle documents whose pages appeared in this batch. Each settle
        // call is conditional in SQL, so an overlapping pass doing the same
        // documents is harmless.
        for document_id in self.store.documents_for_page_ids(&touched_pages).await? {
            if self.store.try_complete_document(document_id).await? {
                info!("document {} completed", document_id);
            } else if self.store.try_fail_document(document_id).await? {
                warn!("document {} failed: no page embedded successfully", document_id);
            }
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "embedding batch done"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::types::DocumentStatus;
    use crate::core::store::{EMBEDDING_DIM, test_store};
    use async_trait::async_trait;

    /// Embeds everything to a fixed vector, except content containing
    /// "boom" which errors.
    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("boom") {
                anyhow::bail!("provider rejected input");
            }
            Ok(vec![0.5; EMBEDDING_DIM])
        }
    }

    fn worker(store: Arc<Store>, batch_size: usize) -> EmbeddingWorker {
        EmbeddingWorker::new(store, Arc::new(FixedEmbedder), batch_size)
    }

    #[tokio::test]
    async fn empty_queue_is_a_noop() {
        let store = Arc::new(test_store().await);
        let outcome = worker(store, 10).process_batch().await.unwrap();
        assert_eq!(outcome, BatchOutcome::default());
    }

    #[tokio::test]
    async fn single_pass_embeds_pages_and_completes_document() {
        let store = Arc::new(test_store().await);
        let doc = store
            .ingest_document("u", "d", &["one".into(), "two".into(), "three".into()])
            .await
            .unwrap();

        let outcome = worker(store.clone(), 10).process_batch().await.unwrap();
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.errors.is_empty());

        let got = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(got.status, DocumentStatus::Completed);
        assert_eq!(store.count_jobs_with_status("pending").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_size_caps_one_pass() {
        let store = Arc::new(test_store().await);
        let doc = store
            .ingest_document("u", "d", &["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();

        let w = worker(store.clone(), 2);
        let first = w.process_batch().await.unwrap();
        assert_eq!(first.processed, 2);
        // Document still has one pending job, must not complete yet.
        let got = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(got.status, DocumentStatus::Processing);

        let second = w.process_batch().await.unwrap();
        assert_eq!(second.processed, 1);
        let got = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(got.status, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn one_bad_job_does_not_sink_the_batch() {
        let store = Arc::new(test_store().await);
        let doc = store
            .ingest_document("u", "d", &["fine".into(), "boom page".into(), "also fine".into()])
            .await
            .unwrap();

        let outcome = worker(store.clone(), 10).process_batch().await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("provider rejected input"));

        // Partial success still completes the document.
        let got = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(got.status, DocumentStatus::Completed);
        assert_eq!(store.count_jobs_with_status("failed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn all_jobs_failing_fails_the_document() {
        let store = Arc::new(test_store().await);
        let doc = store
            .ingest_document("u", "d", &["boom a".into(), "boom b".into()])
            .await
            .unwrap();

        let outcome = worker(store.clone(), 10).process_batch().await.unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.failed, 2);

        let got = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(got.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn second_pass_over_drained_queue_changes_nothing() {
        let store = Arc::new(test_store().await);
        store.ingest_document("u", "d", &["a".into()]).await.unwrap();
        let w = worker(store.clone(), 10);
        w.process_batch().await.unwrap();
        let again = w.process_batch().await.unwrap();
        assert_eq!(again, BatchOutcome::default());
    }
}
