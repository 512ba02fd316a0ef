use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthedOwner;

#[derive(serde::Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
}

pub async fn list_tokens(
    State(state): State<AppState>,
    Extension(AuthedOwner(owner_id)): Extension<AuthedOwner>,
) -> Json<serde_json::Value> {
    match state.store.list_api_tokens(&owner_id).await {
        Ok(tokens) => Json(serde_json::json!({ "success": true, "tokens": tokens })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn create_token(
    State(state): State<AppState>,
    Extension(AuthedOwner(owner_id)): Extension<AuthedOwner>,
    Json(payload): Json<CreateTokenRequest>,
) -> Json<serde_json::Value> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Json(serde_json::json!({ "success": false, "error": "Token name is required" }));
    }

    match state.store.create_api_token(&owner_id, &name).await {
        Ok((raw_token, record)) => Json(serde_json::json!({
            "success": true,
            "token": raw_token,
            "record": record,
            "message": "Token created. Save the token value - it will not be shown again."
        })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn delete_token(
    State(state): State<AppState>,
    Extension(AuthedOwner(owner_id)): Extension<AuthedOwner>,
    Path(token_id): Path<String>,
) -> Json<serde_json::Value> {
    match state.store.delete_api_token(&owner_id, &token_id).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Token revoked" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Token not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
