//! # Payment API
//!
//! All routes require a registrant token.
//!
//! - **POST `/v1/payments/orders`**: price a selection and open a gateway order
//! - **POST `/v1/payments/save`**: record a checkout the widget reported as paid
//! - **POST `/v1/payments/bank-transfer`**: record a receipt pending verification
//! - **POST `/v1/payments/bank-transfer/receipt?transaction_id&file_name`**:
//!   raw-body receipt image, recorded the same way
//! - **GET `/v1/payments/receipts/:name`**: a stored receipt (its registrant or admin)
//! - **POST `/v1/payments/failed`**: send the failure notice
//! - **POST `/v1/payments/phonepe`**: start a PhonePe pay-page payment
//! - **GET `/v1/payments/phonepe/:txn`**: poll and settle a PhonePe payment

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use confreg_core::{CategorySelection, PaymentRecord};
use confreg_gateway::phonepe::PayPage;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::services::payments::{self, BankTransfer, CreatedOrder, PhonePeOutcome, SavePayment};
use crate::state::AppState;

/// Categories to price, each with its currency.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectionRequest {
    #[schema(value_type = Vec<Object>)]
    pub categories_selected: Vec<CategorySelection>,
    /// Overrides the registrant's phone for PhonePe.
    #[serde(default)]
    pub mobile_number: Option<String>,
}

impl Validate for SelectionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.categories_selected.is_empty() {
            return Err("categories_selected must not be empty".to_string());
        }
        Ok(())
    }
}

/// Optional reason attached to a failure notice.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FailureNotice {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BankTransferResponse {
    /// False when the transaction id was already on the ledger.
    pub payment_added: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReceiptParams {
    pub transaction_id: String,
    /// Original name; jpg, jpeg or png.
    pub file_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReceiptResponse {
    /// False when the transaction id was already on the ledger.
    pub payment_added: bool,
    /// Where the stored receipt is served from.
    pub receipt_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/orders", post(create_order))
        .route("/v1/payments/save", post(save_payment))
        .route("/v1/payments/bank-transfer", post(bank_transfer))
        .route(
            "/v1/payments/bank-transfer/receipt",
            post(upload_receipt).layer(DefaultBodyLimit::max(payments::MAX_RECEIPT_BYTES)),
        )
        .route("/v1/payments/receipts/:name", get(receipt))
        .route("/v1/payments/failed", post(payment_failed))
        .route("/v1/payments/phonepe", post(phonepe_initiate))
        .route("/v1/payments/phonepe/:txn", get(phonepe_status))
}

/// POST /v1/payments/orders: Open a gateway order for a selection.
///
/// The amount is computed here; the client never supplies it.
#[utoipa::path(
    post,
    path = "/v1/payments/orders",
    request_body = SelectionRequest,
    responses(
        (status = 201, description = "Order created", body = CreatedOrder),
        (status = 400, description = "Empty or mixed-currency selection", body = crate::error::ErrorBody),
        (status = 502, description = "Payment provider error", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway not configured", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SelectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedOrder>), AppError> {
    let req = extract_validated_json(body)?;
    let order = payments::create_order(&state, &caller, req.categories_selected).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /v1/payments/save: Record a checkout confirmed by the widget.
#[utoipa::path(
    post,
    path = "/v1/payments/save",
    request_body = SavePayment,
    responses(
        (status = 201, description = "Payment recorded"),
        (status = 401, description = "Checkout signature rejected", body = crate::error::ErrorBody),
        (status = 409, description = "Payment already recorded", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn save_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SavePayment>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentRecord>), AppError> {
    let req = extract_json(body)?;
    let record = payments::save_payment(&state, &caller, req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /v1/payments/bank-transfer: Record a bank-transfer receipt.
///
/// Idempotent on `transaction_id`.
#[utoipa::path(
    post,
    path = "/v1/payments/bank-transfer",
    request_body = BankTransfer,
    responses(
        (status = 200, description = "Receipt processed", body = BankTransferResponse),
        (status = 400, description = "Missing transaction id", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn bank_transfer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<BankTransfer>, JsonRejection>,
) -> Result<Json<BankTransferResponse>, AppError> {
    let req = extract_json(body)?;
    let payment_added = payments::record_bank_transfer(&state, &caller, req).await?;
    Ok(Json(BankTransferResponse { payment_added }))
}

/// POST /v1/payments/bank-transfer/receipt: Store a receipt image and record the transfer.
#[utoipa::path(
    post,
    path = "/v1/payments/bank-transfer/receipt",
    params(ReceiptParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Receipt processed", body = ReceiptResponse),
        (status = 400, description = "Missing transaction id or unsupported image", body = crate::error::ErrorBody),
        (status = 413, description = "Receipt too large"),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn upload_receipt(
    State(state): State<AppState>,
    caller: CallerIdentity,
    params: Result<Query<ReceiptParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<ReceiptResponse>, AppError> {
    let params = extract_query(params)?;
    let receipt_url =
        payments::upload_receipt(&state, &caller, &params.transaction_id, &params.file_name, &body).await?;
    Ok(Json(ReceiptResponse {
        payment_added: receipt_url.is_some(),
        receipt_url,
    }))
}

/// GET /v1/payments/receipts/:name: Stream a stored receipt.
#[utoipa::path(
    get,
    path = "/v1/payments/receipts/{name}",
    params(("name" = String, Path, description = "Stored receipt name")),
    responses(
        (status = 200, description = "Receipt image"),
        (status = 404, description = "Unknown receipt or not the caller's", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn receipt(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let doc = payments::open_receipt(&state, &caller, &name).await?;
    Ok(super::attachment(&doc.file_name, doc.handle, doc.len))
}

/// POST /v1/payments/failed: Mail the caller a failed-payment notice.
#[utoipa::path(
    post,
    path = "/v1/payments/failed",
    request_body = FailureNotice,
    responses(
        (status = 202, description = "Notice queued", body = StatusResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn payment_failed(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Option<Json<FailureNotice>>,
) -> (StatusCode, Json<StatusResponse>) {
    let notice = body.map(|Json(n)| n).unwrap_or_default();
    payments::notify_failure(&state, &caller, notice.reason.as_deref());
    (
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "notice queued".to_string(),
        }),
    )
}

/// POST /v1/payments/phonepe: Start a PhonePe payment for an INR selection.
#[utoipa::path(
    post,
    path = "/v1/payments/phonepe",
    request_body = SelectionRequest,
    responses(
        (status = 201, description = "Pay page created"),
        (status = 400, description = "Selection not payable in INR", body = crate::error::ErrorBody),
        (status = 502, description = "PhonePe error", body = crate::error::ErrorBody),
        (status = 503, description = "PhonePe not configured", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn phonepe_initiate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SelectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PayPage>), AppError> {
    let req = extract_validated_json(body)?;
    let page =
        payments::phonepe_initiate(&state, &caller, req.categories_selected, req.mobile_number)
            .await?;
    Ok((StatusCode::CREATED, Json(page)))
}

/// GET /v1/payments/phonepe/:txn: Check a PhonePe payment and record it once settled.
#[utoipa::path(
    get,
    path = "/v1/payments/phonepe/{txn}",
    params(("txn" = String, Path, description = "Merchant transaction id")),
    responses(
        (status = 200, description = "Current status", body = PhonePeOutcome),
        (status = 404, description = "Unknown transaction", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn phonepe_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(txn): Path<String>,
) -> Result<Json<PhonePeOutcome>, AppError> {
    Ok(Json(payments::phonepe_status(&state, &caller, &txn).await?))
}
