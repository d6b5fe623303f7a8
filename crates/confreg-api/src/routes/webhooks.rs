//! # Payment Provider Webhooks
//!
//! - **POST `/v1/webhooks/razorpay`**
//!
//! The body is taken as raw bytes and the HMAC is checked over exactly those
//! bytes before anything is parsed. A bad or missing signature gets 400.
//! Every verified delivery gets 200 with a status string, including ones
//! that could not be acted on, so the provider does not redeliver them.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use confreg_gateway::signature::WEBHOOK_SIGNATURE_HEADER;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::payments;
use crate::state::AppState;

/// Webhook acknowledgement.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/v1/webhooks/razorpay", post(razorpay_webhook))
}

/// POST /v1/webhooks/razorpay: Signed payment event delivery.
#[utoipa::path(
    post,
    path = "/v1/webhooks/razorpay",
    params(("x-razorpay-signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body")),
    responses(
        (status = 200, description = "Delivery verified and processed", body = WebhookAck),
        (status = 400, description = "Signature missing or invalid", body = WebhookAck),
    ),
    tag = "webhooks"
)]
async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = payments::verify_webhook(&state, &body, signature) {
        tracing::warn!(error = %e, "webhook rejected");
        return (StatusCode::BAD_REQUEST, WebhookAck::new("unauthorized"));
    }

    match payments::handle_webhook(&state, &body, signature).await {
        Ok(outcome) => {
            tracing::info!(status = outcome.as_str(), "webhook processed");
            (StatusCode::OK, WebhookAck::new(outcome.as_str()))
        }
        Err(e) => {
            tracing::error!(error = %e, "webhook processing failed");
            (StatusCode::OK, WebhookAck::new("error handled"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::Body;
    use axum::http::Request;
    use confreg_gateway::signature::sign;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use zeroize::Zeroizing;

    const SECRET: &str = "whsec_test";

    fn app(secret: Option<&str>) -> Router {
        let state = AppState::with_config(AppConfig {
            webhook_secret: secret.map(|s| Zeroizing::new(s.to_string())),
            ..AppConfig::default()
        })
        .unwrap();
        public_router().with_state(state)
    }

    async fn deliver(app: Router, body: &str, signature: Option<String>) -> (StatusCode, String) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/razorpay")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            req = req.header(WEBHOOK_SIGNATURE_HEADER, sig);
        }
        let resp = app
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let ack: WebhookAck = serde_json::from_slice(&bytes).unwrap();
        (status, ack.status)
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let (status, ack) = deliver(app(Some(SECRET)), "{}", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(ack, "unauthorized");
    }

    #[tokio::test]
    async fn unconfigured_secret_rejects_everything() {
        let body = r#"{"event":"payment.captured","payload":{}}"#;
        let sig = sign(SECRET.as_bytes(), body.as_bytes());
        let (status, _) = deliver(app(None), body, Some(sig)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_garbage_is_acknowledged_as_invalid() {
        let body = "not json";
        let sig = sign(SECRET.as_bytes(), body.as_bytes());
        let (status, ack) = deliver(app(Some(SECRET)), body, Some(sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, "invalid payload");
    }

    #[tokio::test]
    async fn signature_covers_exact_bytes() {
        let body = r#"{"event":"payment.captured","payload":{}}"#;
        let sig = sign(SECRET.as_bytes(), body.as_bytes());
        let reformatted = r#"{ "event": "payment.captured", "payload": {} }"#;
        let (status, _) = deliver(app(Some(SECRET)), reformatted, Some(sig)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
