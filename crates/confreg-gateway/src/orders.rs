//! Typed client for the Razorpay orders API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/v1/orders` | Create order |
//! | GET    | `/v1/orders/{id}` | Fetch order |
//!
//! Authentication is HTTP basic with `key_id:key_secret`. Amounts are in
//! minor units (paise for INR, cents for USD).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Convert whole currency units to the provider's minor units.
pub fn to_minor_units(major: u64) -> Result<u64, GatewayError> {
    major
        .checked_mul(100)
        .ok_or(GatewayError::AmountOverflow(major))
}

/// Order status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOrderStatus {
    /// No payment attempted.
    Created,
    /// A payment attempt was made.
    Attempted,
    /// Fully paid.
    Paid,
    /// Forward-compatible catch-all.
    #[serde(other)]
    Unknown,
}

/// Request to create an order.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in minor units.
    pub amount: u64,
    /// ISO currency code.
    pub currency: String,
    /// Merchant receipt reference (max 40 characters).
    pub receipt: String,
    /// Capture automatically on authorisation.
    pub payment_capture: u8,
    /// Free-form notes echoed back in webhooks.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, String>,
}

impl CreateOrderRequest {
    /// An auto-captured order with no notes.
    pub fn new(amount_minor: u64, currency: impl Into<String>, receipt: impl Into<String>) -> Self {
        Self {
            amount: amount_minor,
            currency: currency.into(),
            receipt: receipt.into(),
            payment_capture: 1,
            notes: BTreeMap::new(),
        }
    }

    /// Attach a note.
    pub fn note(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.notes.insert(key.into(), value.into());
        self
    }
}

/// Order as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Provider order id, e.g. `order_EKwxwAgItmmXdp`.
    pub id: String,
    /// Amount in minor units.
    pub amount: u64,
    /// ISO currency code.
    pub currency: String,
    /// Merchant receipt reference.
    #[serde(default)]
    pub receipt: Option<String>,
    /// Order status.
    pub status: ProviderOrderStatus,
    /// Unix timestamp of creation.
    #[serde(default)]
    pub created_at: i64,
}

/// Client for the Razorpay orders API.
#[derive(Debug, Clone)]
pub struct OrdersClient {
    http: reqwest::Client,
    base_url: Url,
    config: GatewayConfig,
}

impl OrdersClient {
    pub(crate) fn new(http: reqwest::Client, config: GatewayConfig) -> Self {
        Self {
            http,
            base_url: config.api_url.clone(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Create an order.
    ///
    /// Calls `POST {api_url}/v1/orders`.
    pub async fn create_order(&self, req: &CreateOrderRequest) -> Result<Order, GatewayError> {
        let endpoint = "POST /v1/orders";
        let resp = self
            .http
            .post(self.url("v1/orders"))
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.as_str()))
            .json(req)
            .send()
            .await
            .map_err(|e| GatewayError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        let order: Order = read_json(endpoint, resp).await?;
        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            currency = %order.currency,
            "gateway order created"
        );
        Ok(order)
    }

    /// Fetch an order by id.
    ///
    /// Calls `GET {api_url}/v1/orders/{id}`.
    pub async fn fetch_order(&self, order_id: &str) -> Result<Order, GatewayError> {
        let endpoint = "GET /v1/orders/{id}";
        let resp = self
            .http
            .get(self.url(&format!("v1/orders/{order_id}")))
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.as_str()))
            .send()
            .await
            .map_err(|e| GatewayError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;
        read_json(endpoint, resp).await
    }
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, GatewayError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
        return Err(GatewayError::ApiError {
            endpoint: endpoint.into(),
            status,
            body,
        });
    }
    resp.json().await.map_err(|e| GatewayError::Deserialization {
        endpoint: endpoint.into(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units() {
        assert_eq!(to_minor_units(4840).unwrap(), 484_000);
        assert!(matches!(
            to_minor_units(u64::MAX),
            Err(GatewayError::AmountOverflow(_))
        ));
    }

    #[test]
    fn create_request_shape() {
        let req = CreateOrderRequest::new(484_000, "INR", "rcpt_1").note("email", "a@x.org");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["amount"], 484_000);
        assert_eq!(v["payment_capture"], 1);
        assert_eq!(v["notes"]["email"], "a@x.org");
        let bare = serde_json::to_value(CreateOrderRequest::new(1, "USD", "r")).unwrap();
        assert!(bare.get("notes").is_none());
    }

    #[test]
    fn unknown_order_status_is_tolerated() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "order_1", "amount": 100, "currency": "INR", "status": "expired"
        }))
        .unwrap();
        assert_eq!(order.status, ProviderOrderStatus::Unknown);
    }
}
