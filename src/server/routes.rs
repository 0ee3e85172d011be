//! Route handlers.
//!
//! The manual trigger speaks plain JSON. Everything else follows the
//! Firebase callable protocol: the request body is `{"data": ...}`, a
//! success is `{"result": ...}` and a failure is a [`ServiceError`]
//! envelope.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::{authenticate, Caller, IdentityVerifier};
use crate::engine::{MatchPoolRefresher, RefreshPlan};
use crate::error::ServiceError;
use crate::gateway::{FootballResponse, LlmResponse, ProxyGateway};
use crate::purchases::{HistoryResponse, PurchaseVerifier, VerifyResponse};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything the handlers need.
pub struct ServiceState {
    pub refresher: Arc<MatchPoolRefresher>,
    pub gateway: ProxyGateway,
    pub purchases: PurchaseVerifier,
    pub identity: Arc<dyn IdentityVerifier>,
}

pub type AppState = Arc<ServiceState>;

// ---------------------------------------------------------------------------
// Callable envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CallableRequest {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

type CallableResult<T> = Result<Json<CallableResponse<T>>, ServiceError>;

fn ok<T>(result: T) -> CallableResult<T> {
    Ok(Json(CallableResponse { result }))
}

/// Resolve the caller and unwrap `data`. A malformed body from an
/// anonymous caller is reported as unauthenticated, never as bad input.
async fn callable(state: &ServiceState, headers: &HeaderMap, body: &Bytes) -> Result<(Option<Caller>, Value), ServiceError> {
    let caller = authenticate(state.identity.as_ref(), headers).await;

    let parsed = if body.is_empty() {
        Ok(CallableRequest::default())
    } else {
        serde_json::from_slice::<CallableRequest>(body)
    };
    match parsed {
        Ok(req) => Ok((caller, req.data)),
        Err(_) if caller.is_none() => Err(ServiceError::Unauthenticated),
        Err(e) => Err(ServiceError::invalid_argument(format!("Malformed request body: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Manual trigger
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ManualTriggerQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTriggerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_matches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leagues: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManualTriggerResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            message: None,
            total_matches: None,
            leagues: None,
            timestamp: None,
            error: Some(error),
        }
    }
}

/// `/updateMatchPoolManual`, any method.
pub async fn update_match_pool_manual(
    State(state): State<AppState>,
    Query(query): Query<ManualTriggerQuery>,
) -> Response {
    let plan = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => RefreshPlan::for_date_param(raw),
        None => Ok(state.refresher.default_plan(chrono::Utc::now())),
    };

    // The run lives in its own task so a client disconnect cannot cut it
    // short between the fetch and the write.
    let outcome = match plan {
        Ok(plan) => {
            let refresher = state.refresher.clone();
            match tokio::spawn(async move { refresher.run(plan).await }).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("Refresh task failed: {e}")),
            }
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(summary) => {
            info!(%summary, "Manual refresh succeeded");
            let body = ManualTriggerResponse {
                success: true,
                message: Some("Match pool updated".to_string()),
                total_matches: Some(summary.total_matches),
                leagues: Some(summary.leagues),
                timestamp: Some(summary.timestamp.to_rfc3339()),
                error: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Manual refresh failed");
            let body = ManualTriggerResponse::failure(format!("{e:#}"));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Callable endpoints
// ---------------------------------------------------------------------------

pub async fn call_gemini(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> CallableResult<LlmResponse> {
    let (caller, data) = callable(&state, &headers, &body).await?;
    ok(state.gateway.call_llm(caller.as_ref(), data).await?)
}

pub async fn call_football_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> CallableResult<FootballResponse> {
    let (caller, data) = callable(&state, &headers, &body).await?;
    ok(state.gateway.call_football(caller.as_ref(), data).await?)
}

pub async fn verify_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> CallableResult<VerifyResponse> {
    let (caller, data) = callable(&state, &headers, &body).await?;
    ok(state.purchases.verify(caller.as_ref(), data).await?)
}

pub async fn get_purchase_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> CallableResult<HistoryResponse> {
    let (caller, _) = callable(&state, &headers, &body).await?;
    ok(state.purchases.history(caller.as_ref()).await?)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}
