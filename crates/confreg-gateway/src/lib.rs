#![deny(missing_docs)]

//! # confreg-gateway -- Typed client for the payment providers
//!
//! - **Razorpay orders** via [`orders::OrdersClient`].
//! - **Signatures**: webhook and checkout HMAC verification in [`signature`].
//! - **Webhook payloads** in [`webhook`], parsed only after verification.
//! - **PhonePe** pay-page checkout and status in [`phonepe`].
//!
//! This crate is the only path from the service to a provider. It performs
//! no retries; a failed call surfaces as a [`GatewayError`] and the caller
//! decides what the user sees.

pub mod config;
pub mod error;
pub mod orders;
pub mod phonepe;
pub mod signature;
pub mod webhook;

pub use config::{ConfigError, GatewayConfig, PhonePeConfig};
pub use error::GatewayError;
pub use orders::{to_minor_units, CreateOrderRequest, Order};
pub use signature::{verify_checkout_signature, verify_webhook_signature, SignatureError};
pub use webhook::{PaymentEntity, WebhookEvent, WebhookKind};

use std::time::Duration;

/// Top-level Razorpay client.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    orders: orders::OrdersClient,
    config: GatewayConfig,
}

impl GatewayClient {
    /// Create a client from configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self {
            orders: orders::OrdersClient::new(http, config.clone()),
            config,
        })
    }

    /// Access the orders client.
    pub fn orders(&self) -> &orders::OrdersClient {
        &self.orders
    }

    /// Public key id for the checkout widget.
    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Verify a checkout confirmation against the key secret.
    pub fn verify_checkout(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        verify_checkout_signature(
            self.config.key_secret.as_bytes(),
            order_id,
            payment_id,
            signature,
        )
    }
}
