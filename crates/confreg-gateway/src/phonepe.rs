//! Typed client for PhonePe pay-page checkout.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/pg/v1/pay` | Create pay-page payment |
//! | GET    | `/pg/v1/status/{merchantId}/{merchantTransactionId}` | Payment status |
//!
//! Requests are authenticated with an `X-VERIFY` checksum:
//! `sha256_hex(data + endpoint_path + salt_key) + "###" + salt_index`,
//! where `data` is the base64 request payload for `pay` and empty for
//! `status`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PhonePeConfig;
use crate::error::GatewayError;
use crate::orders::{read_json, to_minor_units};

const PAY_PATH: &str = "/pg/v1/pay";

/// `X-VERIFY` checksum for a request.
pub fn checksum(data: &str, endpoint_path: &str, salt_key: &str, salt_index: &str) -> String {
    let digest = Sha256::digest(format!("{data}{endpoint_path}{salt_key}").as_bytes());
    format!("{}###{salt_index}", hex::encode(digest))
}

/// A pay-page payment to create.
#[derive(Debug, Clone)]
pub struct PayRequest {
    /// Unique merchant transaction id.
    pub merchant_transaction_id: String,
    /// Stable id of the paying user.
    pub merchant_user_id: String,
    /// Amount in whole rupees.
    pub amount: u64,
    /// Payer phone number.
    pub mobile_number: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayPayload<'a> {
    merchant_id: &'a str,
    merchant_transaction_id: &'a str,
    merchant_user_id: &'a str,
    amount: u64,
    redirect_url: &'a str,
    redirect_mode: &'static str,
    callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_number: Option<&'a str>,
    payment_instrument: PaymentInstrument,
}

#[derive(Serialize)]
struct PaymentInstrument {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct PayEnvelope {
    request: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderResponse<T> {
    success: bool,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayData {
    merchant_transaction_id: String,
    instrument_response: InstrumentResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResponse {
    redirect_info: RedirectInfo,
}

#[derive(Deserialize)]
struct RedirectInfo {
    url: String,
}

/// Where to send the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayPage {
    /// Merchant transaction id echoed back.
    pub merchant_transaction_id: String,
    /// Hosted pay page URL.
    pub payment_url: String,
}

/// Settlement state of a PhonePe transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhonePeState {
    /// Settled.
    Completed,
    /// Failed or declined.
    Failed,
    /// Still in flight.
    Pending,
    /// Forward-compatible catch-all.
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    merchant_transaction_id: String,
    #[serde(default)]
    transaction_id: Option<String>,
    amount: u64,
    state: PhonePeState,
}

/// Result of a status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatus {
    /// Merchant transaction id.
    pub merchant_transaction_id: String,
    /// Provider transaction id, once assigned.
    pub transaction_id: Option<String>,
    /// Amount in paise.
    pub amount_minor: u64,
    /// Settlement state.
    pub state: PhonePeState,
    /// Provider response code, e.g. `PAYMENT_SUCCESS`.
    pub code: String,
}

/// Client for PhonePe.
#[derive(Debug, Clone)]
pub struct PhonePeClient {
    http: reqwest::Client,
    config: PhonePeConfig,
}

impl PhonePeClient {
    /// Build a client with its own connection pool.
    pub fn new(config: PhonePeConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.as_str().trim_end_matches('/'))
    }

    /// Create a pay-page payment.
    ///
    /// Calls `POST {api_base}/pg/v1/pay`.
    pub async fn create_payment(&self, req: &PayRequest) -> Result<PayPage, GatewayError> {
        let endpoint = "POST /pg/v1/pay";
        let payload = PayPayload {
            merchant_id: &self.config.merchant_id,
            merchant_transaction_id: &req.merchant_transaction_id,
            merchant_user_id: &req.merchant_user_id,
            amount: to_minor_units(req.amount)?,
            redirect_url: &self.config.redirect_url,
            redirect_mode: "POST",
            callback_url: &self.config.callback_url,
            mobile_number: req.mobile_number.as_deref(),
            payment_instrument: PaymentInstrument { kind: "PAY_PAGE" },
        };
        let json = serde_json::to_vec(&payload).map_err(|e| GatewayError::UnexpectedResponse {
            endpoint: endpoint.into(),
            detail: format!("payload encoding failed: {e}"),
        })?;
        let encoded = BASE64.encode(json);
        let verify = checksum(
            &encoded,
            PAY_PATH,
            &self.config.salt_key,
            &self.config.salt_index,
        );

        let resp = self
            .http
            .post(self.url(PAY_PATH))
            .header("X-VERIFY", verify)
            .json(&PayEnvelope { request: encoded })
            .send()
            .await
            .map_err(|e| GatewayError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        let body: ProviderResponse<PayData> = read_json(endpoint, resp).await?;
        let data = match (body.success, body.data) {
            (true, Some(data)) => data,
            _ => {
                return Err(GatewayError::UnexpectedResponse {
                    endpoint: endpoint.into(),
                    detail: format!("{}: {}", body.code, body.message),
                })
            }
        };
        tracing::info!(
            merchant_transaction_id = %data.merchant_transaction_id,
            "phonepe payment created"
        );
        Ok(PayPage {
            merchant_transaction_id: data.merchant_transaction_id,
            payment_url: data.instrument_response.redirect_info.url,
        })
    }

    /// Check a transaction's status.
    ///
    /// Calls `GET {api_base}/pg/v1/status/{merchantId}/{merchantTransactionId}`.
    pub async fn payment_status(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<PaymentStatus, GatewayError> {
        let endpoint = "GET /pg/v1/status";
        let path = format!(
            "/pg/v1/status/{}/{merchant_transaction_id}",
            self.config.merchant_id
        );
        let verify = checksum("", &path, &self.config.salt_key, &self.config.salt_index);

        let resp = self
            .http
            .get(self.url(&path))
            .header("X-VERIFY", verify)
            .header("X-MERCHANT-ID", &self.config.merchant_id)
            .send()
            .await
            .map_err(|e| GatewayError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        let body: ProviderResponse<StatusData> = read_json(endpoint, resp).await?;
        let data = body.data.ok_or_else(|| GatewayError::UnexpectedResponse {
            endpoint: endpoint.into(),
            detail: format!("{}: {}", body.code, body.message),
        })?;
        Ok(PaymentStatus {
            merchant_transaction_id: data.merchant_transaction_id,
            transaction_id: data.transaction_id,
            amount_minor: data.amount,
            state: data.state,
            code: body.code,
        })
    }
}
