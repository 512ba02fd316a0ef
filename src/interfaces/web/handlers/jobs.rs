use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::interfaces::web::AppState;

/// On-demand worker pass over the pending queue. Safe to call while the
/// cron tick runs; the claim keeps them from double-processing.
pub async fn process_jobs(State(state): State<AppState>) -> impl IntoResponse {
    match state.worker.process_batch().await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "outcome": outcome })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}
