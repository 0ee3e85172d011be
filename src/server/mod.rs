//! HTTP surface: the manual refresh trigger, the callable endpoints and a
//! health probe. CORS is open so the mobile and web clients can call in.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{any, get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, ServiceState};

/// Inline images arrive base64 encoded in the request body.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Bind `port` and serve in a background task.
pub async fn spawn_server(state: AppState, port: u16) -> Result<JoinHandle<()>> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "HTTP server listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server stopped");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/updateMatchPoolManual", any(routes::update_match_pool_manual))
        .route("/callGemini", post(routes::call_gemini))
        .route("/callFootballApi", post(routes::call_football_api))
        .route("/verifyPurchase", post(routes::verify_purchase))
        .route("/getPurchaseHistory", post(routes::get_purchase_history))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Caller, IdentityVerifier, TokenError};
    use crate::config::AppConfig;
    use crate::data::football::ApiFootballClient;
    use crate::engine::MatchPoolRefresher;
    use crate::gateway::ProxyGateway;
    use crate::llm::gemini::GeminiClient;
    use crate::purchases::{MockPlayStoreApi, PurchaseVerifier};
    use crate::storage::memory::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct OneUser;

    #[async_trait]
    impl IdentityVerifier for OneUser {
        async fn verify(&self, id_token: &str) -> Result<Caller, TokenError> {
            match id_token {
                "valid" => Ok(Caller::new("user-1")),
                _ => Err(TokenError::Invalid("unknown token".into())),
            }
        }
    }

    /// Upstream clients point at a closed port; none of these tests reach them.
    fn test_state() -> AppState {
        let cfg = AppConfig::default();
        let store = Arc::new(MemoryStore::new());
        let football = Arc::new(ApiFootballClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap());
        let llm = Arc::new(GeminiClient::new("http://127.0.0.1:9", "m", Duration::from_secs(1)).unwrap());

        Arc::new(ServiceState {
            refresher: Arc::new(MatchPoolRefresher::new(store.clone(), football.clone(), &cfg)),
            gateway: ProxyGateway::new(store.clone(), llm, football, cfg.secrets.clone()),
            purchases: PurchaseVerifier::new(
                store,
                Arc::new(MockPlayStoreApi::new()),
                cfg.purchases.subscription_patterns.clone(),
            ),
            identity: Arc::new(OneUser),
        })
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let resp = build_router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_callable_requires_token() {
        for uri in ["/callGemini", "/callFootballApi", "/verifyPurchase", "/getPurchaseHistory"] {
            let resp = build_router(test_state())
                .oneshot(post_json(uri, None, r#"{"data": {}}"#))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body_json(resp).await["error"]["status"], "UNAUTHENTICATED");
        }
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthenticated() {
        let resp = build_router(test_state())
            .oneshot(post_json("/callGemini", Some("forged"), r#"{"data": {"prompt": "hi"}}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let resp = build_router(test_state())
            .oneshot(post_json("/callGemini", None, "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = build_router(test_state())
            .oneshot(post_json("/callGemini", Some("valid"), "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["status"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_missing_prompt_is_invalid_argument() {
        let resp = build_router(test_state())
            .oneshot(post_json("/callGemini", Some("valid"), r#"{"data": {}}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_secret_is_internal() {
        let resp = build_router(test_state())
            .oneshot(post_json("/callFootballApi", Some("valid"), r#"{"data": {"endpoint": "fixtures"}}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"]["status"], "INTERNAL");
    }

    #[tokio::test]
    async fn test_empty_history() {
        let resp = build_router(test_state())
            .oneshot(post_json("/getPurchaseHistory", Some("valid"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"result": {"success": true, "purchases": []}}));
    }

    #[tokio::test]
    async fn test_manual_trigger_bad_date() {
        let resp = build_router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/updateMatchPoolManual?date=March-5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("March-5"));
    }

    #[tokio::test]
    async fn test_manual_trigger_without_key_fails() {
        let resp = build_router(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/updateMatchPoolManual")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("API_FOOTBALL_KEY"));
    }
}
