//! Google Play Developer API client.
//!
//! API: `https://androidpublisher.googleapis.com/androidpublisher/v3/`
//! Auth: service-account OAuth bearer token, `androidpublisher` scope.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{PlayApiError, PlayPurchase, PlayStoreApi};
use crate::auth::oauth::TokenSource;

pub const ANDROID_PUBLISHER_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

// Millisecond fields arrive as decimal strings.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPurchase {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    start_time_millis: Option<String>,
    /// Absent once a subscription has lapsed.
    #[serde(default)]
    payment_state: Option<i64>,
    #[serde(default)]
    acknowledgement_state: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductPurchase {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    purchase_time_millis: Option<String>,
    #[serde(default)]
    purchase_state: i64,
    #[serde(default)]
    acknowledgement_state: i64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn parse_millis(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GooglePlayClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl GooglePlayClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenSource>, timeout: Duration) -> Result<Self, PlayApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlayApiError::Transport(e.without_url().to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, package_name: &str, kind: &str, product_id: &str, token: &str) -> String {
        format!(
            "{}/androidpublisher/v3/applications/{}/purchases/{}/{}/tokens/{}",
            self.base_url,
            urlencoding::encode(package_name),
            kind,
            urlencoding::encode(product_id),
            urlencoding::encode(token),
        )
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<reqwest::Response, PlayApiError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| PlayApiError::Auth(e.to_string()))?;

        let resp = req
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| PlayApiError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let raw = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&raw)
            .ok()
            .and_then(|e| e.error)
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(raw);
        Err(PlayApiError::Status { status: status.as_u16(), message })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PlayApiError> {
        let resp = self.authorized(self.http.get(url)).await?;
        resp.json::<T>()
            .await
            .map_err(|e| PlayApiError::Decode(e.without_url().to_string()))
    }
}

#[async_trait]
impl PlayStoreApi for GooglePlayClient {
    async fn get_subscription(
        &self,
        package_name: &str,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<PlayPurchase, PlayApiError> {
        debug!(package_name, product_id, "Fetching subscription purchase");
        let url = self.url(package_name, "subscriptions", product_id, purchase_token);
        let sub: SubscriptionPurchase = self.get_json(&url).await?;
        Ok(PlayPurchase {
            order_id: sub.order_id,
            purchase_time: parse_millis(sub.start_time_millis.as_deref()),
            state: sub.payment_state,
            acknowledged: sub.acknowledgement_state == 1,
        })
    }

    async fn get_product(
        &self,
        package_name: &str,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<PlayPurchase, PlayApiError> {
        debug!(package_name, product_id, "Fetching product purchase");
        let url = self.url(package_name, "products", product_id, purchase_token);
        let product: ProductPurchase = self.get_json(&url).await?;
        Ok(PlayPurchase {
            order_id: product.order_id,
            purchase_time: parse_millis(product.purchase_time_millis.as_deref()),
            state: Some(product.purchase_state),
            acknowledged: product.acknowledgement_state == 1,
        })
    }

    async fn acknowledge(
        &self,
        package_name: &str,
        product_id: &str,
        purchase_token: &str,
        subscription: bool,
    ) -> Result<(), PlayApiError> {
        let kind = if subscription { "subscriptions" } else { "products" };
        let url = format!("{}:acknowledge", self.url(package_name, kind, product_id, purchase_token));
        self.authorized(self.http.post(&url).json(&json!({}))).await?;
        Ok(())
    }
}
