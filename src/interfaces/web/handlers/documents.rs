use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthedOwner;

#[derive(serde::Deserialize)]
pub struct UploadRequest {
    pub title: String,
    pub pages: Vec<String>,
}

/// Accept a pre-chunked document for indexing. Embedding happens in the
/// background, so the reply is 202 with the id to poll.
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(AuthedOwner(owner_id)): Extension<AuthedOwner>,
    Json(payload): Json<UploadRequest>,
) -> impl IntoResponse {
    let title = payload.title.trim();
    if title.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "success": false, "error": "Title is required" })),
        );
    }

    let result = state
        .breakers
        .write
        .guard(state.store.ingest_document(&owner_id, title, &payload.pages))
        .await;

    match result {
        Ok(doc) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "success": true,
                "document_id": doc.id,
                "status": doc.status,
                "page_count": payload.pages.len(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

pub async fn get_document_status(
    State(state): State<AppState>,
    Extension(AuthedOwner(owner_id)): Extension<AuthedOwner>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let result = state.breakers.read.guard(state.store.get_document(id)).await;
    match result {
        Ok(Some(doc)) if doc.owner_id == owner_id => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "document": {
                    "id": doc.id,
                    "title": doc.title,
                    "status": doc.status,
                    "created_at": doc.created_at,
                },
            })),
        ),
        // Foreign documents read as absent.
        Ok(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "success": false, "error": "Document not found" })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        ),
    }
}
