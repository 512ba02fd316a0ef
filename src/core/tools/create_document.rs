use serde_json::{Value, json};
use tokio::fs;

use super::{Observation, ToolError, ToolRegistry, require_str};

/// Save generated content as a new artifact under the workspace and record
/// it so later turns (and `send_email`) can reference it by id.
pub async fn run(
    ctx: &ToolRegistry,
    owner_id: &str,
    params: &Value,
) -> Result<Observation, ToolError> {
    let title = require_str(params, "title")?;
    let content = require_str(params, "content")?;
    let source_ids: Vec<i64> = params
        .get("source_ids")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let dir = ctx.store.workspace_dir().join("generated");
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("workspace dir: {e}")))?;
    let file_path = dir.join(format!("{}.md", uuid::Uuid::new_v4()));
    fs::write(&file_path, format!("# {title}\n\n{content}"))
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("write artifact: {e}")))?;

    let record = ctx
        .breakers
        .write
        .guard(ctx.store.record_generated_document(
            owner_id,
            title,
            &file_path.to_string_lossy(),
            &source_ids,
        ))
        .await
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

    Ok(Observation::success(json!({
        "document_id": record.id,
        "title": record.title,
        "file_path": record.file_path,
    })))
}
