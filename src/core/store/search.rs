use anyhow::Result;
use rusqlite::params;

use super::Store;
use super::types::SearchHit;

/// Pages with cosine similarity below this are dropped from semantic results.
const SIMILARITY_FLOOR: f64 = 0.25;

/// Page content longer than this is cut before being handed to the model.
const MAX_SNIPPET_CHARS: usize = 2000;

fn truncate_snippet(content: &str) -> String {
    if content.len() <= MAX_SNIPPET_CHARS {
        return content.to_string();
    }
    let mut end = MAX_SNIPPET_CHARS;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &content[..end])
}

impl Store {
    /// Case-insensitive substring search over the caller's completed
    /// documents, ranked by occurrence count then page order. An optional
    /// document id narrows the search before ranking, so a targeted
    /// document cannot be crowded out of the result window by others.
    pub async fn grep_search(
        &self,
        owner_id: &str,
        query: &str,
        document_id: Option<i64>,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT d.id, d.title, p.page_number, p.content
             FROM document_pages p
             JOIN documents d ON d.id = p.document_id
             WHERE d.owner_id = ?1 AND d.status = 'completed'
               AND (?2 IS NULL OR d.id = ?2)
             ORDER BY d.id ASC, p.page_number ASC",
        )?;
        let rows = stmt.query_map(params![owner_id, document_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (document_id, document_title, page_number, content) = row?;
            let count = content.to_lowercase().matches(&needle).count();
            if count > 0 {
                hits.push((
                    count,
                    SearchHit {
                        document_id,
                        document_title,
                        page_number,
                        content: truncate_snippet(&content),
                        score: Some(count as f64),
                    },
                ));
            }
        }
        hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.page_number.cmp(&b.1.page_number)));
        Ok(hits.into_iter().take(max_results).map(|(_, h)| h).collect())
    }

    /// KNN over the vec0 index, filtered to the caller's completed
    /// documents and optionally to one document. Over-fetches because the
    /// post-filter discards hits from other owners, other documents and
    /// low-similarity neighbours.
    pub async fn semantic_search(
        &self,
        owner_id: &str,
        query_embedding: &[f32],
        document_id: Option<i64>,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let vector_json = serde_json::to_string(query_embedding)?;
        let k = (max_results * 4).clamp(1, 64);

        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT v.rowid, v.distance, d.id, d.title, d.owner_id, d.status,
                    p.page_number, p.content
             FROM vss_document_pages v
             JOIN document_pages p ON p.id = v.rowid
             JOIN documents d ON d.id = p.document_id
             WHERE v.embedding MATCH ?1 AND k = ?2
             ORDER BY v.distance ASC",
        )?;
        let rows = stmt.query_map(params![vector_json, k as i64], |row| {
            Ok((
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (distance, row_document_id, title, row_owner, status, page_number, content) = row?;
            if row_owner != owner_id || status != "completed" {
                continue;
            }
            if document_id.is_some_and(|id| id != row_document_id) {
                continue;
            }
            let similarity = 1.0 - distance;
            if similarity < SIMILARITY_FLOOR {
                continue;
            }
            hits.push(SearchHit {
                document_id: row_document_id,
                document_title: title,
                page_number,
                content: truncate_snippet(&content),
                score: Some(similarity),
            });
            if hits.len() >= max_results {
                break;
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{EMBEDDING_DIM, test_store};
    use super::*;

    async fn completed_doc(store: &super::super::Store, owner: &str, pages: &[&str]) -> i64 {
        let doc = store
            .ingest_document(owner, "doc", &pages.iter().map(|p| p.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let claimed = store.claim_pending_jobs(100).await.unwrap();
        for job in claimed {
            // One-hot vector keyed by page id so tests can query for an
            // exact match later.
            let mut vec = vec![0.0_f32; EMBEDDING_DIM];
            vec[(job.target_id as usize) % EMBEDDING_DIM] = 1.0;
            store.complete_job(job.id, job.target_id, &vec).await.unwrap();
        }
        store.try_complete_document(doc.id).await.unwrap();
        doc.id
    }

    #[tokio::test]
    async fn grep_ranks_by_occurrence_count() {
        let store = test_store().await;
        completed_doc(
            &store,
            "u",
            &["nothing here", "Widget widget WIDGET", "one widget only"],
        )
        .await;

        let hits = store.grep_search("u", "widget", None, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page_number, 2);
        assert_eq!(hits[0].score, Some(3.0));
        assert_eq!(hits[1].page_number, 3);
    }

    #[tokio::test]
    async fn grep_skips_other_owners_and_incomplete_docs() {
        let store = test_store().await;
        completed_doc(&store, "other", &["secret widget"]).await;
        // Processing doc for the searching user.
        store
            .ingest_document("u", "pending", &["widget in flight".into()])
            .await
            .unwrap();

        assert!(store.grep_search("u", "widget", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn grep_truncates_long_pages() {
        let store = test_store().await;
        let long = format!("widget {}", "x".repeat(3000));
        completed_doc(&store, "u", &[&long]).await;
        let hits = store.grep_search("u", "widget", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.ends_with("... [truncated]"));
        assert!(hits[0].content.len() < 3000);
    }

    #[tokio::test]
    async fn semantic_search_returns_nearest_owned_pages() {
        let store = test_store().await;
        let doc_id = completed_doc(&store, "u", &["alpha", "beta"]).await;
        let pages = store.list_document_pages(doc_id).await.unwrap();

        // Query with the exact vector stored for page one.
        let mut query = vec![0.0_f32; EMBEDDING_DIM];
        query[(pages[0].id as usize) % EMBEDDING_DIM] = 1.0;

        let hits = store.semantic_search("u", &query, None, 5).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].page_number, 1);
        assert!(hits[0].score.unwrap() > 0.9);
    }

    #[tokio::test]
    async fn semantic_search_filters_foreign_owner() {
        let store = test_store().await;
        let doc_id = completed_doc(&store, "owner-a", &["content"]).await;
        let pages = store.list_document_pages(doc_id).await.unwrap();
        let mut query = vec![0.0_f32; EMBEDDING_DIM];
        query[(pages[0].id as usize) % EMBEDDING_DIM] = 1.0;

        let hits = store.semantic_search("owner-b", &query, None, 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn semantic_search_scopes_to_requested_document() {
        let store = test_store().await;
        let first = completed_doc(&store, "u", &["alpha"]).await;
        let second = completed_doc(&store, "u", &["beta"]).await;
        let first_pages = store.list_document_pages(first).await.unwrap();

        // Query vector is an exact match for the first document's page.
        let mut query = vec![0.0_f32; EMBEDDING_DIM];
        query[(first_pages[0].id as usize) % EMBEDDING_DIM] = 1.0;

        let hits = store
            .semantic_search("u", &query, Some(second), 5)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.document_id == second));

        let hits = store
            .semantic_search("u", &query, Some(first), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, first);
    }
}
