use axum::{Json, extract::State};

use crate::interfaces::web::AppState;

/// Unauthenticated liveness probe with queue depth and breaker states.
pub async fn health_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pending = state
        .store
        .count_jobs_with_status("pending")
        .await
        .unwrap_or(-1);
    let processing = state
        .store
        .count_jobs_with_status("processing")
        .await
        .unwrap_or(-1);

    Json(serde_json::json!({
        "status": "ok",
        "jobs": { "pending": pending, "processing": processing },
        "breakers": {
            "read": state.breakers.read.stats(),
            "write": state.breakers.write.stats(),
            "auth": state.breakers.auth.stats(),
            "web_search": state.breakers.search.stats(),
        },
    }))
}
