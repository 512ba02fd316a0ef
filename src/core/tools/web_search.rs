use serde::Deserialize;
use serde_json::{Value, json};

use super::{Observation, ToolError, ToolRegistry, optional_u64, require_str};

const DEFAULT_MAX_TOKENS: usize = 800;

// Rough chars-per-token estimate used to cap the digest.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Deserialize)]
struct SearchProviderResponse {
    results: Vec<SearchProviderResult>,
}

#[derive(Deserialize)]
struct SearchProviderResult {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

/// Query the external search provider and return a plain-text digest. When
/// the breaker is open the observation reports "unavailable" instead of
/// waiting out the outage.
pub async fn run(
    ctx: &ToolRegistry,
    _owner_id: &str,
    params: &Value,
) -> Result<Observation, ToolError> {
    let query = require_str(params, "query")?;
    let max_tokens = optional_u64(params, "max_tokens")
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let Some(config) = &ctx.web_search else {
        return Ok(Observation::error(json!({
            "success": false,
            "status": "unavailable",
            "error": "no web search provider configured",
        })));
    };

    if let Err(open) = ctx.breakers.search.check() {
        return Ok(Observation::error(json!({
            "success": false,
            "status": "unavailable",
            "error": open.to_string(),
        })));
    }

    let response = ctx
        .http
        .get(&config.endpoint)
        .query(&[("q", query)])
        .header("Authorization", format!("Bearer {}", config.api_key))
        .send()
        .await
        .and_then(|r| r.error_for_status());

    let parsed: SearchProviderResponse = match response {
        Ok(r) => {
            ctx.breakers.search.record_success();
            r.json()
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("search response: {e}")))?
        }
        Err(e) => {
            ctx.breakers.search.record_failure();
            return Err(ToolError::ExecutionFailed(format!("web search: {e}")));
        }
    };

    Ok(Observation::success(json!({
        "success": true,
        "query": query,
        "result_count": parsed.results.len(),
        "digest": build_digest(&parsed.results, max_tokens * CHARS_PER_TOKEN),
    })))
}

/// Concatenate result entries up to the character budget. An entry that
/// overflows the remaining budget is cut rather than dropped, so the digest
/// is never empty when the provider returned results.
fn build_digest(results: &[SearchProviderResult], max_chars: usize) -> String {
    let mut digest = String::new();
    for result in results {
        let entry = format!("{} ({})\n{}\n\n", result.title, result.url, result.snippet);
        let remaining = max_chars.saturating_sub(digest.len());
        if remaining == 0 {
            break;
        }
        if entry.len() <= remaining {
            digest.push_str(&entry);
        } else {
            let mut end = remaining;
            while !entry.is_char_boundary(end) {
                end -= 1;
            }
            digest.push_str(&entry[..end]);
            break;
        }
    }
    digest.trim_end().to_string()
}
