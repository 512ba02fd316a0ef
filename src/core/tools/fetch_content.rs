use serde_json::{Value, json};

use super::{Observation, ToolError, ToolRegistry, optional_i64, optional_u64, require_str};

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_MAX_RESULTS: usize = 20;

/// Search the caller's completed documents, semantically or by substring.
pub async fn run(
    ctx: &ToolRegistry,
    owner_id: &str,
    params: &Value,
) -> Result<Observation, ToolError> {
    let search_type = require_str(params, "search_type")?;
    let query = require_str(params, "query")?;
    let target_id = optional_i64(params, "target_id");
    let max_results = optional_u64(params, "max_results")
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_MAX_RESULTS);

    let hits = match search_type {
        "grep" => ctx
            .breakers
            .read
            .guard(ctx.store.grep_search(owner_id, query, target_id, max_results))
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?,
        "semantic" => {
            let vector = ctx
                .embedder
                .embed(query)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("query embedding: {e}")))?;
            ctx.breakers
                .read
                .guard(
                    ctx.store
                        .semantic_search(owner_id, &vector, target_id, max_results),
                )
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
        }
        other => {
            // Validation failure is part of the conversation, not a crash.
            return Ok(Observation::error(json!({
                "error": format!(
                    "invalid search_type '{}', expected \"semantic\" or \"grep\"",
                    other
                ),
            })));
        }
    };

    let results: Vec<Value> = hits
        .into_iter()
        .map(|h| {
            json!({
                "target_id": h.document_id,
                "document_title": h.document_title,
                "page_number": h.page_number,
                "content": h.content,
                "score": h.score,
            })
        })
        .collect();

    Ok(Observation::success(json!({
        "search_type": search_type,
        "query": query,
        "result_count": results.len(),
        "results": results,
    })))
}
