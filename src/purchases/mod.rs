//! Google Play purchase verification and history.
//!
//! Each `(user, purchase token)` pair moves through
//! `unseen → verified (unacknowledged) → verified (acknowledged)`; a token
//! whose upstream state is unacceptable is rejected and nothing is stored.
//! Records live at `purchases/{uid}/{escaped token}`.

pub mod play;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{require_caller, Caller};
use crate::error::ServiceError;
use crate::gateway::parse_request;
use crate::storage::{encode_key, get_typed, paths, set_typed, KeyValueStore};
use crate::types::PurchaseRecord;

/// Subscription `paymentState`: payment received.
const PAYMENT_RECEIVED: i64 = 1;
/// One-time product `purchaseState`: canceled.
const PURCHASE_CANCELED: i64 = 1;

// ---------------------------------------------------------------------------
// Play Store API
// ---------------------------------------------------------------------------

/// The fields of a Play purchase the verifier reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayPurchase {
    pub order_id: String,
    /// Purchase (or subscription start) time, epoch millis.
    pub purchase_time: i64,
    /// `paymentState` for subscriptions, `purchaseState` for products.
    pub state: Option<i64>,
    pub acknowledged: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlayApiError {
    #[error("Play API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Play API request failed: {0}")]
    Transport(String),

    #[error("could not decode Play API response: {0}")]
    Decode(String),

    #[error("Play API authorization failed: {0}")]
    Auth(String),
}

impl PlayApiError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, PlayApiError::Status { status, .. } if (400..500).contains(status))
    }
}

impl From<PlayApiError> for ServiceError {
    fn from(e: PlayApiError) -> Self {
        if e.is_client_error() {
            ServiceError::InvalidArgument(e.to_string())
        } else {
            ServiceError::Internal(e.to_string())
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayStoreApi: Send + Sync {
    async fn get_subscription(
        &self,
        package_name: &str,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<PlayPurchase, PlayApiError>;

    async fn get_product(
        &self,
        package_name: &str,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<PlayPurchase, PlayApiError>;

    async fn acknowledge(
        &self,
        package_name: &str,
        product_id: &str,
        purchase_token: &str,
        subscription: bool,
    ) -> Result<(), PlayApiError>;
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub purchase_token: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub order_id: String,
    pub product_id: String,
    pub purchase_time: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub purchases: Vec<PurchaseRecord>,
}

fn required(field: Option<String>, name: &str) -> Result<String, ServiceError> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::invalid_argument(format!("{name} is required")))
}

fn store_error(context: &str, e: anyhow::Error) -> ServiceError {
    error!(error = %e, "{context}");
    ServiceError::internal(context)
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

pub struct PurchaseVerifier {
    store: Arc<dyn KeyValueStore>,
    play: Arc<dyn PlayStoreApi>,
    subscription_patterns: Vec<String>,
}

impl PurchaseVerifier {
    pub fn new(store: Arc<dyn KeyValueStore>, play: Arc<dyn PlayStoreApi>, subscription_patterns: Vec<String>) -> Self {
        Self { store, play, subscription_patterns }
    }

    pub fn is_subscription(&self, product_id: &str) -> bool {
        self.subscription_patterns.iter().any(|p| product_id.contains(p.as_str()))
    }

    /// All stored purchases of one user, unparseable entries skipped.
    async fn user_records(&self, uid: &str) -> Result<Vec<(String, PurchaseRecord)>, ServiceError> {
        let stored = self
            .store
            .get(&paths::user_purchases(uid))
            .await
            .map_err(|e| store_error("Failed to read purchases", e))?;
        let Some(Value::Object(entries)) = stored else {
            return Ok(Vec::new());
        };

        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<PurchaseRecord>(value) {
                Ok(record) => Some((key, record)),
                Err(e) => {
                    warn!(uid, key = %key, error = %e, "Skipping unreadable purchase record");
                    None
                }
            })
            .collect())
    }

    /// Verify a purchase token with Google Play and record it.
    pub async fn verify(&self, caller: Option<&Caller>, data: Value) -> Result<VerifyResponse, ServiceError> {
        let caller = require_caller(caller)?;
        let req: VerifyRequest = parse_request(data)?;
        let product_id = required(req.product_id, "productId")?;
        let purchase_token = required(req.purchase_token, "purchaseToken")?;
        let package_name = required(req.package_name, "packageName")?;

        let record_path = paths::purchase(&caller.uid, &purchase_token);

        // Replay guard.
        let existing: Option<PurchaseRecord> = get_typed(self.store.as_ref(), &record_path)
            .await
            .map_err(|e| store_error("Failed to read purchase record", e))?;
        if existing.as_ref().is_some_and(PurchaseRecord::is_settled) {
            info!(uid = %caller.uid, %product_id, "Purchase already verified");
            return Err(ServiceError::AlreadyExists("Purchase already verified".into()));
        }

        let is_subscription = self.is_subscription(&product_id);
        let purchase = if is_subscription {
            self.play.get_subscription(&package_name, &product_id, &purchase_token).await
        } else {
            self.play.get_product(&package_name, &product_id, &purchase_token).await
        }
        .map_err(|e| {
            warn!(uid = %caller.uid, %product_id, error = %e, "Play lookup failed");
            ServiceError::from(e)
        })?;

        let valid = if is_subscription {
            purchase.state == Some(PAYMENT_RECEIVED)
        } else {
            purchase.state != Some(PURCHASE_CANCELED)
        };
        if !valid {
            warn!(uid = %caller.uid, %product_id, state = ?purchase.state, "Purchase rejected");
            return Err(ServiceError::FailedPrecondition(if is_subscription {
                "Subscription payment not received".into()
            } else {
                "Purchase was canceled".into()
            }));
        }

        // The same order must not be redeemed under a second token.
        if !purchase.order_id.is_empty() {
            let token_key = encode_key(&purchase_token);
            let duplicate = self
                .user_records(&caller.uid)
                .await?
                .into_iter()
                .any(|(key, r)| r.order_id == purchase.order_id && key != token_key);
            if duplicate {
                warn!(uid = %caller.uid, order_id = %purchase.order_id, "Duplicate order id");
                return Err(ServiceError::AlreadyExists("Order already used".into()));
            }
        }

        let record = PurchaseRecord {
            product_id: product_id.clone(),
            order_id: purchase.order_id.clone(),
            package_name: package_name.clone(),
            purchase_token: purchase_token.clone(),
            purchase_time: purchase.purchase_time,
            verified: true,
            acknowledged: purchase.acknowledged,
            verified_at: Utc::now().timestamp_millis(),
            is_subscription,
            purchase_state: purchase.state.unwrap_or(-1),
        };
        set_typed(self.store.as_ref(), &record_path, &record)
            .await
            .map_err(|e| store_error("Failed to store purchase record", e))?;

        if !purchase.acknowledged {
            match self
                .play
                .acknowledge(&package_name, &product_id, &purchase_token, is_subscription)
                .await
            {
                Ok(()) => {
                    let flag = format!("{record_path}/acknowledged");
                    if let Err(e) = self.store.set(&flag, Value::Bool(true)).await {
                        warn!(error = %e, "Failed to mark purchase acknowledged");
                    }
                }
                Err(e) => warn!(uid = %caller.uid, %product_id, error = %e, "Acknowledge failed"),
            }
        }

        info!(uid = %caller.uid, %product_id, order_id = %purchase.order_id, is_subscription, "Purchase verified");
        Ok(VerifyResponse {
            success: true,
            order_id: purchase.order_id,
            product_id,
            purchase_time: purchase.purchase_time,
        })
    }

    /// The caller's purchases, newest first.
    pub async fn history(&self, caller: Option<&Caller>) -> Result<HistoryResponse, ServiceError> {
        let caller = require_caller(caller)?;
        let mut purchases: Vec<PurchaseRecord> =
            self.user_records(&caller.uid).await?.into_iter().map(|(_, r)| r).collect();
        purchases.sort_by(|a, b| b.purchase_time.cmp(&a.purchase_time));
        Ok(HistoryResponse { success: true, purchases })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
