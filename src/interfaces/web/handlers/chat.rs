use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthedOwner;

#[derive(serde::Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Run one agent session for the caller's message. Fatal sessions map to a
/// 502 so clients can tell them apart from a normal (possibly apologetic)
/// answer.
pub async fn chat_endpoint(
    State(state): State<AppState>,
    Extension(AuthedOwner(owner_id)): Extension<AuthedOwner>,
    Json(payload): Json<ChatRequest>,
) -> impl IntoResponse {
    let message = payload.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "success": false, "error": "Message is required" })),
        );
    }

    match state.orchestrator.run_session(&owner_id, message).await {
        Ok(outcome) if outcome.is_failure() => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "success": false,
                "outcome": outcome.as_str(),
                "error": outcome.text(),
            })),
        ),
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "outcome": outcome.as_str(),
                "response": outcome.text(),
            })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}
