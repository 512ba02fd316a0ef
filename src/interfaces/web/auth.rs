use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

/// Authenticated caller identity, inserted into request extensions for
/// handlers to pick up.
#[derive(Clone)]
pub struct AuthedOwner(pub String);

/// Owner id used while no tokens exist yet and the server listens on
/// loopback only.
const BOOTSTRAP_OWNER: &str = "local";

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // No tokens configured yet: allow open access only on loopback so the
    // first token can be created at all.
    let any_tokens_exist = match state.store.has_any_api_tokens().await {
        Ok(exists) => exists,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    if !any_tokens_exist {
        let is_loopback = state.api_host == "127.0.0.1"
            || state.api_host == "::1"
            || state.api_host == "localhost";
        if is_loopback {
            req.extensions_mut()
                .insert(AuthedOwner(BOOTSTRAP_OWNER.to_string()));
            return next.run(req).await;
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "No API tokens configured. Create a token before exposing on a non-loopback address."
            })),
        )
            .into_response();
    }

    let raw_token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let raw_token = match raw_token {
        Some(t) => t,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Missing or invalid Authorization header. Use: Bearer <token>" })),
            )
                .into_response();
        }
    };

    // Token lookups run through the auth breaker so a wedged store fails
    // fast instead of stalling every request.
    let resolved = state
        .breakers
        .auth
        .guard(state.store.resolve_api_token(&raw_token))
        .await;

    match resolved {
        Ok(Some(owner_id)) => {
            req.extensions_mut().insert(AuthedOwner(owner_id));
            next.run(req).await
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or unauthorized API token" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::web::test_support::test_state;
    use axum::{Router, middleware, response::IntoResponse, routing::get};
    use serde_json::json;
    use tower::util::ServiceExt;

    fn protected_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/ping",
                get(|| async { Json(json!({ "ok": true })).into_response() }),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::require_auth,
            ))
            .with_state(state)
    }

    async fn request_ping_status(app: Router, headers: Vec<(&str, String)>) -> StatusCode {
        let mut req_builder = Request::builder().uri("/api/ping");
        for (k, v) in headers {
            req_builder = req_builder.header(k, v);
        }
        let req = req_builder
            .body(Body::empty())
            .expect("request should build");
        app.oneshot(req)
            .await
            .expect("oneshot should succeed")
            .status()
    }

    #[tokio::test]
    async fn no_tokens_on_loopback_allows_request() {
        let (state, _) = test_state("127.0.0.1", false).await;
        let app = protected_app(state);
        let status = request_ping_status(app, vec![]).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn no_tokens_on_non_loopback_rejects_request() {
        let (state, _) = test_state("0.0.0.0", false).await;
        let app = protected_app(state);
        let status = request_ping_status(app, vec![]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_present_requires_authorization_header() {
        let (state, _) = test_state("127.0.0.1", true).await;
        let app = protected_app(state);
        let status = request_ping_status(app, vec![]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_bearer_token_is_accepted() {
        let (state, token) = test_state("127.0.0.1", true).await;
        let token = token.expect("token should exist");
        let app = protected_app(state);
        let status =
            request_ping_status(app, vec![("authorization", format!("Bearer {}", token))]).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (state, _) = test_state("127.0.0.1", true).await;
        let app = protected_app(state);
        let status = request_ping_status(
            app,
            vec![(
                "authorization",
                "Bearer dsk_00000000000000000000000000000000".to_string(),
            )],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
