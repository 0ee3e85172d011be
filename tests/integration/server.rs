//! HTTP-level runs through the full router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use matchpool::auth::oauth::StaticToken;
use matchpool::auth::{Caller, IdentityVerifier, TokenError};
use matchpool::config::AppConfig;
use matchpool::data::throttle::Throttle;
use matchpool::engine::MatchPoolRefresher;
use matchpool::gateway::ProxyGateway;
use matchpool::llm::gemini::GeminiClient;
use matchpool::purchases::play::GooglePlayClient;
use matchpool::purchases::PurchaseVerifier;
use matchpool::server::{build_router, ServiceState};
use matchpool::storage::memory::MemoryStore;

use crate::mock_football::{fixture_item, MockFootball};

struct TestUsers;

#[async_trait]
impl IdentityVerifier for TestUsers {
    async fn verify(&self, id_token: &str) -> Result<Caller, TokenError> {
        id_token
            .strip_prefix("token-for-")
            .map(Caller::new)
            .ok_or_else(|| TokenError::Invalid("unknown test token".into()))
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    football: Arc<MockFootball>,
}

fn harness(football: MockFootball) -> Harness {
    harness_with_throttle(football, Throttle::unlimited())
}

fn harness_with_throttle(football: MockFootball, throttle: Throttle) -> Harness {
    let cfg = AppConfig::default();
    let store = Arc::new(MemoryStore::with_data(json!({
        "remoteConfig": {"API_FOOTBALL_KEY": "football-secret", "GEMINI_API_KEY": "gemini-secret"}
    })));
    let football = Arc::new(football);

    // Gemini and Play point at a closed port; these tests never reach them.
    let llm = Arc::new(GeminiClient::new("http://127.0.0.1:9", "gemini-1.5-flash", Duration::from_secs(1)).unwrap());
    let play = Arc::new(
        GooglePlayClient::new("http://127.0.0.1:9", Arc::new(StaticToken::new("t")), Duration::from_secs(1)).unwrap(),
    );

    let state = Arc::new(ServiceState {
        refresher: Arc::new(MatchPoolRefresher::with_throttle(
            store.clone(),
            football.clone(),
            &cfg,
            Arc::new(throttle),
        )),
        gateway: ProxyGateway::new(store.clone(), llm, football.clone(), cfg.secrets.clone()),
        purchases: PurchaseVerifier::new(store.clone(), play, cfg.purchases.subscription_patterns.clone()),
        identity: Arc::new(TestUsers),
    });

    Harness { app: build_router(state), store, football }
}

fn callable(uri: &str, token: Option<&str>, data: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    req.body(Body::from(json!({"data": data}).to_string())).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_manual_trigger_single_date() {
    // Fixtures later than now, so the janitor at the end of the run keeps them.
    let day = Utc::now().date_naive() + ChronoDuration::days(1);
    let kickoff = format!("{}T20:00:00+00:00", day.format("%Y-%m-%d"));
    let football = MockFootball::new().with_date(
        day,
        vec![
            fixture_item(1, 203, &kickoff, (994, "Göztepe"), (549, "Beşiktaş")),
            fixture_item(2, 203, &kickoff, (611, "Fenerbahçe"), (645, "Galatasaray")),
            fixture_item(3, 39, &kickoff, (42, "Arsenal"), (49, "Chelsea")),
        ],
    );
    let h = harness(football);

    let uri = format!("/updateMatchPoolManual?date={}", day.format("%Y-%m-%d"));
    let resp = h
        .app
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["totalMatches"], 3);
    assert_eq!(json["leagues"], 2);
    assert!(json["timestamp"].is_string());

    let pool = h.store.snapshot()["matchPool"][day.format("%Y-%m-%d").to_string()].clone();
    assert_eq!(pool.as_object().unwrap().len(), 3);
    assert_eq!(pool["1"]["homeTeam"], "Goztepe");
}

#[tokio::test]
async fn test_manual_trigger_survives_client_disconnect() {
    let day = Utc::now().date_naive() + ChronoDuration::days(1);
    let date = day.format("%Y-%m-%d").to_string();
    let kickoff = format!("{date}T20:00:00+00:00");
    let football = MockFootball::new().with_date(
        day,
        vec![
            fixture_item(1, 203, &kickoff, (994, "Göztepe"), (549, "Beşiktaş")),
            fixture_item(2, 39, &kickoff, (42, "Arsenal"), (49, "Chelsea")),
        ],
    );
    // Seven spaced upstream calls: well past the client's patience.
    let h = harness_with_throttle(football, Throttle::new(Duration::from_millis(150)));

    let request = Request::builder()
        .method("POST")
        .uri(format!("/updateMatchPoolManual?date={date}"))
        .body(Body::empty())
        .unwrap();
    let gave_up = tokio::time::timeout(Duration::from_millis(100), h.app.oneshot(request)).await;
    assert!(gave_up.is_err(), "the request should still be running");

    let mut written = false;
    for _ in 0..100 {
        if h.store.snapshot().get("poolMetadata").is_some() {
            written = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(written, "refresh should complete after the client left");

    let snap = h.store.snapshot();
    assert_eq!(snap["poolMetadata"]["totalMatches"], 2);
    assert_eq!(snap["matchPool"][&date].as_object().unwrap().len(), 2);
    assert_eq!(h.football.count("fixtures"), 1);
    assert_eq!(h.football.count("stats"), 4);
    assert_eq!(h.football.count("h2h"), 2);
}

#[tokio::test]
async fn test_proxies_reject_anonymous_callers_before_upstream() {
    let h = harness(MockFootball::new());

    let resp = h
        .app
        .clone()
        .oneshot(callable("/callFootballApi", None, json!({"endpoint": "fixtures", "params": {"live": "all"}})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(resp).await,
        json!({"error": {"status": "UNAUTHENTICATED", "message": "the caller must be authenticated"}})
    );

    let resp = h
        .app
        .clone()
        .oneshot(callable("/callGemini", Some("forged"), json!({"prompt": "Who wins?"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert!(h.football.calls().is_empty());
}

#[tokio::test]
async fn test_proxy_missing_fields_before_upstream() {
    let h = harness(MockFootball::new());

    let resp = h
        .app
        .clone()
        .oneshot(callable("/callFootballApi", Some("token-for-u1"), json!({"params": {"league": 39}})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["status"], "INVALID_ARGUMENT");

    let resp = h
        .app
        .clone()
        .oneshot(callable("/callFootballApi", Some("token-for-u1"), json!({"endpoint": "https://attacker.example/x"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .app
        .clone()
        .oneshot(callable("/callGemini", Some("token-for-u1"), json!({"prompt": "", "imageBase64": "aGk="})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(h.football.calls().is_empty());
}

#[tokio::test]
async fn test_football_proxy_passthrough() {
    let h = harness(MockFootball::new());

    let resp = h
        .app
        .oneshot(callable(
            "/callFootballApi",
            Some("token-for-u1"),
            json!({"endpoint": "/standings", "params": {"league": 203, "season": 2023}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["result"]["success"], true);
    assert_eq!(json["result"]["data"]["endpoint"], "standings");
    assert_eq!(json["result"]["data"]["params"]["season"], "2023");
    assert_eq!(h.football.calls(), vec!["raw standings".to_string()]);
    assert!(h.football.keys_seen().contains("football-secret"));
}

#[tokio::test]
async fn test_purchase_endpoints_require_authentication() {
    let h = harness(MockFootball::new());

    let resp = h
        .app
        .clone()
        .oneshot(callable(
            "/verifyPurchase",
            None,
            json!({"productId": "coins_100", "purchaseToken": "t", "packageName": "com.aispor.pro"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = h
        .app
        .clone()
        .oneshot(callable("/verifyPurchase", Some("token-for-u1"), json!({"productId": "coins_100"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .app
        .oneshot(callable("/getPurchaseHistory", Some("token-for-u1"), Value::Null))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["result"]["purchases"], json!([]));
}
