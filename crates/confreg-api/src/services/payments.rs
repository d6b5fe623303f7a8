//! # Payments
//!
//! Every channel that can settle a registration fee ends in
//! [`record_payment`]: gateway checkout confirmations, gateway webhooks,
//! bank-transfer receipts and PhonePe status checks. Recording is
//! idempotent on the payment id. The in-memory ledger decides under the
//! registrant's write lock and the database's unique index decides across
//! restarts and instances.
//!
//! Amounts are never taken from the client: fees are recomputed from the
//! selection and the order amount is the one the server created.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use confreg_core::{
    normalize_email, quote, CategorySelection, FeeQuote, OrderRecord, OrderState, PaymentMode,
    PaymentRecord, PaymentStatus, Registrant, RECEIPT_EXTENSIONS,
};
use confreg_gateway::phonepe::{PayPage, PayRequest, PaymentStatus as PhonePeStatus, PhonePeState};
use confreg_gateway::{to_minor_units, verify_webhook_signature, CreateOrderRequest, WebhookEvent, WebhookKind};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{CallerIdentity, Role};
use crate::effects::SideEffect;
use crate::error::AppError;
use crate::mailer::OutgoingMail;
use crate::sheets::SheetRow;
use crate::state::{AppState, Checkout};

/// Category summary stored when several categories are paid together.
pub const MULTI_CATEGORY: &str = "Multi";
/// Category summary for bank-transfer receipts.
pub const BANK_TRANSFER_CATEGORY: &str = "Bank Transfer";
/// Signature marker for bank-transfer receipts.
pub const BANK_TRANSFER_SIGNATURE: &str = "bank_transfer";
/// Signature marker for PhonePe settlements.
pub const PHONEPE_SIGNATURE: &str = "phonepe";

/// The pricing date for fees computed now.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn category_summary(selection: &[CategorySelection]) -> String {
    match selection {
        [only] => only.category.clone(),
        _ => MULTI_CATEGORY.to_string(),
    }
}

/// The single currency every selected category is priced in.
fn selection_currency(selection: &[CategorySelection]) -> Result<String, AppError> {
    let first = selection
        .first()
        .ok_or_else(|| AppError::Validation("at least one category must be selected".into()))?;
    if selection.iter().any(|s| s.currency != first.currency) {
        return Err(AppError::Validation(
            "all selected categories must use the same currency".into(),
        ));
    }
    Ok(first.currency.clone())
}

fn registrant_for(state: &AppState, uid: Uuid) -> Result<Registrant, AppError> {
    state
        .users
        .get(&uid)
        .ok_or_else(|| AppError::NotFound(format!("registrant {uid} not found")))
}

// -- Ledger -------------------------------------------------------------------

/// Append `record` to the ledger of `user_id`.
///
/// Returns the registrant as it stands after the append, or `None` when the
/// payment id was already recorded. Secondary effects are the caller's job.
///
/// With a database attached the insert is the deciding write: the in-memory
/// ledger only takes the record once Postgres has, so a failed persist leaves
/// nothing behind and the same payment can be retried.
pub async fn record_payment(
    state: &AppState,
    user_id: Uuid,
    record: &PaymentRecord,
) -> Result<Option<Registrant>, AppError> {
    let Some(pool) = &state.db_pool else {
        return apply_in_memory(state, user_id, record);
    };

    let current = registrant_for(state, user_id)?;
    if current.payments.contains(&record.payment_id) {
        tracing::info!(user_id = %user_id, payment_id = %record.payment_id, "duplicate payment ignored");
        return Ok(None);
    }

    match crate::db::payments::insert(pool, user_id, record).await {
        Ok(true) => apply_in_memory(state, user_id, record),
        Ok(false) => {
            tracing::warn!(
                user_id = %user_id,
                payment_id = %record.payment_id,
                "payment already present in database"
            );
            // Another instance won; mirror its row so later lookups agree.
            let _ = apply_in_memory(state, user_id, record)?;
            Ok(None)
        }
        Err(e) => {
            tracing::error!(
                user_id = %user_id,
                payment_id = %record.payment_id,
                error = %e,
                "failed to persist payment to database"
            );
            Err(AppError::database("payment could not be persisted", e))
        }
    }
}

fn apply_in_memory(
    state: &AppState,
    user_id: Uuid,
    record: &PaymentRecord,
) -> Result<Option<Registrant>, AppError> {
    let now = Utc::now();
    let (outcome, registrant) = state
        .users
        .try_update(&user_id, |r| {
            let outcome = r.apply_payment(record.clone(), now);
            Ok::<_, AppError>((outcome, r.clone()))
        })
        .ok_or_else(|| AppError::NotFound(format!("registrant {user_id} not found")))??;

    if !outcome.accepted() {
        tracing::info!(user_id = %user_id, payment_id = %record.payment_id, "duplicate payment ignored");
        return Ok(None);
    }

    tracing::info!(
        user_id = %user_id,
        payment_id = %record.payment_id,
        amount_minor = record.amount_minor,
        currency = %record.currency,
        status = record.status.as_str(),
        "payment recorded"
    );
    Ok(Some(registrant))
}

/// Queue the spreadsheet row and the receipt for an accepted payment.
fn notify_recorded(state: &AppState, registrant: &Registrant, record: &PaymentRecord) {
    state.effects.enqueue(SideEffect::AppendPaymentRow {
        payment_id: record.payment_id.clone(),
        row: SheetRow::payment(registrant, record),
    });
    state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::payment_confirmation(
        &state.config.event_name,
        registrant,
        record,
    )));
}

/// Move a tracked order toward `target`.
///
/// Untracked orders and refused transitions are logged and skipped; the
/// payment itself has already been decided by the time this runs.
async fn settle_order(state: &AppState, order_id: &str, target: OrderState) {
    let now = Utc::now();
    let key = order_id.to_string();
    let result = state.orders.try_update(&key, |order| {
        let moved = match target {
            OrderState::Paid => order.capture(now),
            other => order.advance(other, now),
        };
        moved.map(|()| order.state)
    });

    let state_now = match result {
        None => {
            tracing::debug!(order_id, "payment for untracked order");
            return;
        }
        Some(Err(e)) => {
            tracing::warn!(order_id, error = %e, "order transition skipped");
            return;
        }
        Some(Ok(s)) => s,
    };

    tracing::info!(order_id, state = %state_now, "order advanced");
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::orders::update_state(pool, order_id, state_now, now).await {
            tracing::error!(order_id, error = %e, "failed to persist order state to database");
        }
    }
}

async fn track_order(state: &AppState, order: OrderRecord, checkout: Checkout) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::orders::insert(pool, &order).await {
            tracing::error!(order_id = %order.order_id, error = %e, "failed to persist order to database");
            return Err(AppError::database("order could not be persisted", e));
        }
    }
    state.checkouts.insert(order.order_id.clone(), checkout);
    state.orders.insert(order.order_id.clone(), order);
    Ok(())
}

// -- Gateway checkout ---------------------------------------------------------

/// A gateway order ready for the checkout widget.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedOrder {
    pub order_id: String,
    /// Amount in minor units, as sent to the provider.
    pub amount_minor: u64,
    pub currency: String,
    /// Public key id the widget is opened with.
    pub key_id: String,
    /// Server-side breakdown the amount was derived from.
    #[schema(value_type = Object)]
    pub quote: FeeQuote,
}

/// Price a selection and create a gateway order for it.
pub async fn create_order(
    state: &AppState,
    caller: &CallerIdentity,
    selection: Vec<CategorySelection>,
) -> Result<CreatedOrder, AppError> {
    let gateway = state
        .gateway
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("payment gateway is not configured".into()))?;
    let uid = caller.registrant_id()?;
    let registrant = registrant_for(state, uid)?;
    let currency = selection_currency(&selection)?;

    let fee = quote(&selection, today(), PaymentMode::Online);
    if fee.total == 0 {
        return Err(AppError::Validation("selection has no payable fee".into()));
    }
    let amount_minor = to_minor_units(fee.total)?;
    let receipt = format!("rcpt_{}", &Uuid::new_v4().simple().to_string()[..16]);
    let notes = serde_json::to_string(&selection)
        .map_err(|e| AppError::Internal(format!("failed to encode category notes: {e}")))?;

    let request = CreateOrderRequest::new(amount_minor, currency.as_str(), receipt.as_str())
        .note("email", registrant.email.as_str())
        .note("categoriesSelected", notes);
    let order = gateway.orders().create_order(&request).await?;

    let now = Utc::now();
    track_order(
        state,
        OrderRecord::new(&order.id, amount_minor, currency.as_str(), receipt, now),
        Checkout {
            user_id: uid,
            email: registrant.email.clone(),
            selection,
            quote: fee.clone(),
        },
    )
    .await?;

    tracing::info!(user_id = %uid, order_id = %order.id, amount_minor, currency = %currency, "order created");
    Ok(CreatedOrder {
        order_id: order.id,
        amount_minor,
        currency,
        key_id: gateway.key_id().to_string(),
        quote: fee,
    })
}

/// Checkout confirmation posted by the client after the widget succeeds.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SavePayment {
    pub razorpay_payment_id: String,
    pub order_id: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub categories_selected: Vec<CategorySelection>,
    /// `"online"` for widget payments. Anything else is priced offline.
    #[serde(default)]
    pub payment_mode: Option<String>,
}

/// Record a checkout the client reports as successful.
pub async fn save_payment(
    state: &AppState,
    caller: &CallerIdentity,
    req: SavePayment,
) -> Result<PaymentRecord, AppError> {
    let uid = caller.registrant_id()?;
    let payment_id = req.razorpay_payment_id.trim();
    let order_id = req.order_id.trim();
    if payment_id.is_empty() || order_id.is_empty() {
        return Err(AppError::Validation(
            "razorpay_payment_id and order_id are required".into(),
        ));
    }

    match &state.gateway {
        Some(gateway) => gateway
            .verify_checkout(order_id, payment_id, req.signature.as_deref())
            .map_err(|e| {
                tracing::warn!(user_id = %uid, order_id, error = %e, "checkout signature rejected");
                AppError::Unauthorized(format!("checkout signature rejected: {e}"))
            })?,
        None => tracing::warn!(
            order_id,
            "payment gateway not configured: accepting checkout without signature check"
        ),
    }

    let checkout = state.checkouts.get(&order_id.to_string());
    if let Some(c) = &checkout {
        if c.user_id != uid {
            return Err(AppError::Forbidden("order belongs to another registrant".into()));
        }
    }

    let selection = match (&checkout, req.categories_selected.is_empty()) {
        (Some(c), true) => c.selection.clone(),
        _ => req.categories_selected,
    };
    let fee = quote(&selection, today(), PaymentMode::from_client(req.payment_mode.as_deref()));
    let tracked = state.orders.get(&order_id.to_string());
    let (amount_minor, currency) = match tracked {
        Some(order) => (order.amount_minor, order.currency),
        None => (
            to_minor_units(fee.total)?,
            selection_currency(&selection).unwrap_or_else(|_| "INR".to_string()),
        ),
    };

    let record = PaymentRecord {
        payment_id: payment_id.to_string(),
        order_id: order_id.to_string(),
        signature: req.signature.unwrap_or_default(),
        category: category_summary(&selection),
        currency,
        amount_minor,
        status: PaymentStatus::Paid,
        fee_details: fee.lines,
        receipt_url: None,
        timestamp: Utc::now(),
    };

    let Some(registrant) = record_payment(state, uid, &record).await? else {
        return Err(AppError::Conflict(format!(
            "payment {} already recorded",
            record.payment_id
        )));
    };
    settle_order(state, &record.order_id, OrderState::Paid).await;
    notify_recorded(state, &registrant, &record);
    Ok(record)
}

/// How long a settled order stays tracked in memory.
pub const SETTLED_ORDER_RETENTION_SECS: i64 = 24 * 3600;
/// How long an order may sit unsettled before it stops being tracked.
pub const OPEN_ORDER_RETENTION_SECS: i64 = 7 * 24 * 3600;

/// Stop tracking orders past their retention, and any checkout left without
/// an order. Returns how many orders were dropped.
///
/// Stored rows are untouched; this only bounds the in-memory stores.
pub fn prune_orders(state: &AppState, now: DateTime<Utc>) -> usize {
    let dropped = state.orders.retain(|_, order| {
        let retention = if order.state.is_terminal() {
            SETTLED_ORDER_RETENTION_SECS
        } else {
            OPEN_ORDER_RETENTION_SECS
        };
        now - order.updated_at < ChronoDuration::seconds(retention)
    });
    let orphaned = state.checkouts.retain(|id, _| state.orders.contains(id));
    if dropped + orphaned > 0 {
        tracing::debug!(orders = dropped, checkouts = orphaned, "stale orders pruned");
    }
    dropped
}

// -- Bank transfer ------------------------------------------------------------

/// A bank-transfer receipt submitted for manual verification.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BankTransfer {
    pub transaction_id: String,
    /// Where the uploaded receipt can be found.
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub categories_selected: Vec<CategorySelection>,
}

/// Record a bank-transfer receipt as pending verification.
///
/// Returns whether a ledger entry was added; a repeated transaction id is not
/// an error.
pub async fn record_bank_transfer(
    state: &AppState,
    caller: &CallerIdentity,
    req: BankTransfer,
) -> Result<bool, AppError> {
    let uid = caller.registrant_id()?;
    let txn = req.transaction_id.trim();
    if txn.is_empty() {
        return Err(AppError::Validation("transaction_id is required".into()));
    }
    let registrant = registrant_for(state, uid)?;
    let currency = if registrant.is_national() { "INR" } else { "USD" };
    let fee_details = if req.categories_selected.is_empty() {
        Vec::new()
    } else {
        quote(&req.categories_selected, today(), PaymentMode::Offline).lines
    };

    let record = PaymentRecord {
        payment_id: txn.to_string(),
        order_id: format!("BANK_{txn}"),
        signature: BANK_TRANSFER_SIGNATURE.to_string(),
        category: BANK_TRANSFER_CATEGORY.to_string(),
        currency: currency.to_string(),
        amount_minor: 0,
        status: PaymentStatus::PendingVerification,
        fee_details,
        receipt_url: req.receipt_url.filter(|u| !u.trim().is_empty()),
        timestamp: Utc::now(),
    };

    let Some(registrant) = record_payment(state, uid, &record).await? else {
        return Ok(false);
    };
    state.effects.enqueue(SideEffect::AppendPaymentRow {
        payment_id: record.payment_id.clone(),
        row: SheetRow::payment(&registrant, &record),
    });
    state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::bank_transfer_received(
        &state.config.event_name,
        &registrant,
        txn,
    )));
    Ok(true)
}

/// Largest accepted receipt image.
pub const MAX_RECEIPT_BYTES: usize = 5 * 1024 * 1024;
/// Path receipts are served from; the stored name follows.
pub const RECEIPT_PATH: &str = "/v1/payments/receipts";

/// Store a receipt image and record the transfer it proves.
///
/// Returns the receipt URL when a ledger entry was added. The stored file
/// is removed again when nothing was recorded.
pub async fn upload_receipt(
    state: &AppState,
    caller: &CallerIdentity,
    transaction_id: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<Option<String>, AppError> {
    let uid = caller.registrant_id()?;
    if transaction_id.trim().is_empty() {
        return Err(AppError::Validation("transaction_id is required".into()));
    }
    if bytes.len() > MAX_RECEIPT_BYTES {
        return Err(AppError::Validation(format!(
            "receipt must not exceed {} MB",
            MAX_RECEIPT_BYTES / (1024 * 1024)
        )));
    }
    registrant_for(state, uid)?;

    let prefix = format!("receipt-{}", uid.simple());
    let stored = super::documents::store(state, &prefix, file_name, bytes, &RECEIPT_EXTENSIONS, Utc::now()).await?;
    let receipt_url = format!("{RECEIPT_PATH}/{}", stored.stored_name);
    let transfer = BankTransfer {
        transaction_id: transaction_id.to_string(),
        receipt_url: Some(receipt_url.clone()),
        categories_selected: Vec::new(),
    };
    match record_bank_transfer(state, caller, transfer).await {
        Ok(true) => {
            tracing::info!(user_id = %uid, path = %stored.stored_name, "bank-transfer receipt stored");
            Ok(Some(receipt_url))
        }
        Ok(false) => {
            super::documents::discard(state, &stored.stored_name).await;
            Ok(None)
        }
        Err(e) => {
            super::documents::discard(state, &stored.stored_name).await;
            Err(e)
        }
    }
}

/// Open a stored receipt for an admin or for the registrant whose ledger
/// cites it.
pub async fn open_receipt(
    state: &AppState,
    caller: &CallerIdentity,
    stored_name: &str,
) -> Result<super::documents::OpenDocument, AppError> {
    let url = format!("{RECEIPT_PATH}/{stored_name}");
    let cited = |r: &Registrant| {
        r.payments
            .records()
            .iter()
            .any(|p| p.receipt_url.as_deref() == Some(url.as_str()))
    };
    let allowed = caller.role == Role::Admin
        || caller
            .user_id
            .and_then(|uid| state.users.get(&uid))
            .is_some_and(|r| cited(&r));
    if !allowed {
        return Err(AppError::NotFound(format!("receipt {stored_name:?} not found")));
    }
    super::documents::open_stored(state, "receipt", stored_name, stored_name).await
}

/// Send the caller a failed-payment notice. Nothing is recorded.
pub fn notify_failure(state: &AppState, caller: &CallerIdentity, reason: Option<&str>) {
    let to = caller
        .user_id
        .and_then(|uid| state.users.get(&uid))
        .map(|r| r.email)
        .unwrap_or_else(|| caller.email.clone());
    tracing::info!(email = %to, "payment failure reported by client");
    state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::payment_failed(
        &state.config.event_name,
        &to,
        reason,
    )));
}

// -- Webhooks -----------------------------------------------------------------

/// What a verified webhook delivery did. Reported to the provider with 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    PaymentSaved,
    AlreadyRecorded,
    InvalidPayload,
    UserNotFound,
    AuthorizationNoted,
    FailureNoted,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentSaved => "payment saved",
            Self::AlreadyRecorded => "already recorded",
            Self::InvalidPayload => "invalid payload",
            Self::UserNotFound => "user not found",
            Self::AuthorizationNoted => "authorization noted",
            Self::FailureNoted => "failure noted",
            Self::Ignored => "ignored",
        }
    }
}

/// Check the webhook signature over the raw body.
///
/// Fails closed: without a configured secret nothing is accepted.
pub fn verify_webhook(state: &AppState, raw_body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
    let secret = state
        .config
        .webhook_secret
        .as_ref()
        .ok_or_else(|| AppError::Unauthorized("webhook secret is not configured".into()))?;
    verify_webhook_signature(secret.as_bytes(), raw_body, signature)
        .map_err(|e| AppError::Unauthorized(format!("webhook signature rejected: {e}")))
}

/// Act on a verified webhook delivery.
pub async fn handle_webhook(
    state: &AppState,
    raw_body: &[u8],
    signature: Option<&str>,
) -> Result<WebhookOutcome, AppError> {
    let event = match WebhookEvent::parse(raw_body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "webhook body is not a valid event");
            return Ok(WebhookOutcome::InvalidPayload);
        }
    };
    let kind = event.kind();
    let Some(payment) = event.payment() else {
        tracing::debug!(event = %event.event, "webhook without payment entity ignored");
        return Ok(WebhookOutcome::Ignored);
    };

    match kind {
        WebhookKind::PaymentCaptured | WebhookKind::OrderPaid => {
            let Some(email) = payment.payer_email().and_then(|e| normalize_email(e).ok()) else {
                tracing::warn!(payment_id = %payment.id, "captured payment carries no usable email");
                return Ok(WebhookOutcome::InvalidPayload);
            };
            let Some(registrant) = state.find_user_by_email(&email) else {
                tracing::warn!(payment_id = %payment.id, email = %email, "captured payment for unknown registrant");
                return Ok(WebhookOutcome::UserNotFound);
            };

            let selection = payment.notes.categories().unwrap_or_else(|e| {
                tracing::warn!(payment_id = %payment.id, error = %e, "unreadable category notes");
                Vec::new()
            });
            let fee = quote(&selection, today(), PaymentMode::Online);
            match to_minor_units(fee.total) {
                Ok(expected) if fee.total > 0 && expected != payment.amount => tracing::warn!(
                    payment_id = %payment.id,
                    expected_minor = expected,
                    paid_minor = payment.amount,
                    "captured amount differs from recomputed fee"
                ),
                _ => {}
            }

            let order_id = payment.order_id.clone().unwrap_or_default();
            let record = PaymentRecord {
                payment_id: payment.id.clone(),
                order_id: order_id.clone(),
                signature: signature.unwrap_or_default().to_string(),
                category: category_summary(&selection),
                currency: payment.currency.clone(),
                amount_minor: payment.amount,
                status: PaymentStatus::Paid,
                fee_details: fee.lines,
                receipt_url: None,
                timestamp: Utc::now(),
            };

            let recorded = record_payment(state, registrant.uid, &record).await?;
            if !order_id.is_empty() {
                settle_order(state, &order_id, OrderState::Paid).await;
            }
            match recorded {
                Some(updated) => {
                    notify_recorded(state, &updated, &record);
                    Ok(WebhookOutcome::PaymentSaved)
                }
                None => Ok(WebhookOutcome::AlreadyRecorded),
            }
        }
        WebhookKind::PaymentAuthorized => {
            if let Some(order_id) = &payment.order_id {
                settle_order(state, order_id, OrderState::Pending).await;
            }
            Ok(WebhookOutcome::AuthorizationNoted)
        }
        WebhookKind::PaymentFailed => {
            if let Some(order_id) = &payment.order_id {
                settle_order(state, order_id, OrderState::Failed).await;
            }
            tracing::info!(
                payment_id = %payment.id,
                reason = payment.error_description.as_deref().unwrap_or("unknown"),
                "payment failed"
            );
            if let Some(email) = payment.payer_email() {
                state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::payment_failed(
                    &state.config.event_name,
                    email.trim(),
                    payment.error_description.as_deref(),
                )));
            }
            Ok(WebhookOutcome::FailureNoted)
        }
        WebhookKind::Other(name) => {
            tracing::debug!(event = %name, "unhandled webhook event");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

// -- PhonePe ------------------------------------------------------------------

/// Start a PhonePe pay-page payment for a selection priced in INR.
pub async fn phonepe_initiate(
    state: &AppState,
    caller: &CallerIdentity,
    selection: Vec<CategorySelection>,
    mobile_number: Option<String>,
) -> Result<PayPage, AppError> {
    let client = state
        .phonepe
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("PhonePe is not configured".into()))?;
    let uid = caller.registrant_id()?;
    let registrant = registrant_for(state, uid)?;
    if selection_currency(&selection)? != "INR" {
        return Err(AppError::Validation("PhonePe accepts INR selections only".into()));
    }

    let fee = quote(&selection, today(), PaymentMode::Online);
    if fee.total == 0 {
        return Err(AppError::Validation("selection has no payable fee".into()));
    }
    let amount_minor = to_minor_units(fee.total)?;

    let now = Utc::now();
    let uid_short = uid.simple().to_string();
    let txn = format!("REG_{}_{}", &uid_short[..12], now.timestamp_millis());
    let page = client
        .create_payment(&PayRequest {
            merchant_transaction_id: txn.clone(),
            merchant_user_id: uid_short,
            amount: fee.total,
            mobile_number: mobile_number
                .filter(|m| !m.trim().is_empty())
                .or_else(|| Some(registrant.phone.clone())),
        })
        .await?;

    track_order(
        state,
        OrderRecord::new(&txn, amount_minor, "INR", txn.as_str(), now),
        Checkout {
            user_id: uid,
            email: registrant.email.clone(),
            selection,
            quote: fee,
        },
    )
    .await?;

    tracing::info!(user_id = %uid, merchant_transaction_id = %txn, "PhonePe payment initiated");
    Ok(page)
}

/// Result of a PhonePe status check.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PhonePeOutcome {
    #[schema(value_type = Object)]
    pub status: PhonePeStatus,
    /// Whether this check added a ledger entry.
    pub payment_recorded: bool,
}

/// Ask PhonePe how a transaction ended and record it if it settled.
pub async fn phonepe_status(
    state: &AppState,
    caller: &CallerIdentity,
    merchant_transaction_id: &str,
) -> Result<PhonePeOutcome, AppError> {
    let client = state
        .phonepe
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("PhonePe is not configured".into()))?;
    let checkout = state
        .checkouts
        .get(&merchant_transaction_id.to_string())
        .ok_or_else(|| AppError::NotFound(format!("transaction {merchant_transaction_id} not found")))?;
    if !caller.can_access_user(checkout.user_id) {
        return Err(AppError::Forbidden("transaction belongs to another registrant".into()));
    }

    let status = client.payment_status(merchant_transaction_id).await?;
    let mut payment_recorded = false;
    match status.state {
        PhonePeState::Completed => {
            let record = PaymentRecord {
                payment_id: status
                    .transaction_id
                    .clone()
                    .unwrap_or_else(|| merchant_transaction_id.to_string()),
                order_id: merchant_transaction_id.to_string(),
                signature: PHONEPE_SIGNATURE.to_string(),
                category: category_summary(&checkout.selection),
                currency: "INR".to_string(),
                amount_minor: status.amount_minor,
                status: PaymentStatus::Paid,
                fee_details: checkout.quote.lines.clone(),
                receipt_url: None,
                timestamp: Utc::now(),
            };
            if let Some(registrant) = record_payment(state, checkout.user_id, &record).await? {
                notify_recorded(state, &registrant, &record);
                payment_recorded = true;
            }
            settle_order(state, merchant_transaction_id, OrderState::Paid).await;
        }
        PhonePeState::Failed => {
            settle_order(state, merchant_transaction_id, OrderState::Failed).await;
            state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::payment_failed(
                &state.config.event_name,
                &checkout.email,
                Some(status.code.as_str()),
            )));
        }
        PhonePeState::Pending | PhonePeState::Unknown => {
            tracing::debug!(merchant_transaction_id, code = %status.code, "PhonePe payment not settled yet");
        }
    }

    Ok(PhonePeOutcome {
        status,
        payment_recorded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use confreg_core::NewRegistrant;
    use confreg_gateway::signature::sign;
    use zeroize::Zeroizing;

    const WEBHOOK_SECRET: &str = "whsec";

    fn state() -> AppState {
        let config = AppConfig {
            webhook_secret: Some(Zeroizing::new(WEBHOOK_SECRET.into())),
            ..AppConfig::default()
        };
        AppState::with_config(config).unwrap()
    }

    async fn registrant(state: &AppState, email: &str, country: &str) -> Registrant {
        let signup: NewRegistrant = serde_json::from_value(serde_json::json!({
            "email": email,
            "password": "correct horse battery",
            "phone": "99999",
            "given_name": "Ada",
            "country": country,
            "affiliation": "IISc"
        }))
        .unwrap();
        crate::services::users::register(state, signup).await.unwrap()
    }

    fn caller(r: &Registrant) -> CallerIdentity {
        CallerIdentity {
            role: Role::Attendee,
            user_id: Some(r.uid),
            email: r.email.clone(),
        }
    }

    fn student_inr() -> Vec<CategorySelection> {
        vec![CategorySelection {
            category: "Student / Participant".into(),
            currency: "INR".into(),
        }]
    }

    fn captured(email: &str, payment_id: &str) -> Vec<u8> {
        let notes = serde_json::to_string(&serde_json::json!([
            { "key": "Student / Participant", "currency": "INR" }
        ]))
        .unwrap();
        serde_json::to_vec(&serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": payment_id,
                "order_id": "order_1",
                "currency": "INR",
                "amount": 484000,
                "status": "captured",
                "notes": { "email": email, "categoriesSelected": notes }
            }}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn save_payment_twice_conflicts() {
        let state = state();
        let r = registrant(&state, "ada@x.org", "India").await;
        let req = SavePayment {
            razorpay_payment_id: "pay_1".into(),
            order_id: "order_1".into(),
            signature: None,
            categories_selected: student_inr(),
            payment_mode: Some("online".into()),
        };

        let record = save_payment(&state, &caller(&r), req.clone()).await.unwrap();
        let expected = quote(&student_inr(), today(), PaymentMode::Online).total * 100;
        assert_eq!(record.amount_minor, expected);
        assert_eq!(record.category, "Student / Participant");

        let err = save_payment(&state, &caller(&r), req).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.users.get(&r.uid).unwrap().payments.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_recording_keeps_one_entry() {
        let state = state();
        let r = registrant(&state, "ada@x.org", "India").await;
        let record = PaymentRecord {
            payment_id: "pay_race".into(),
            order_id: "order_1".into(),
            signature: String::new(),
            category: "Multi".into(),
            currency: "INR".into(),
            amount_minor: 100,
            status: PaymentStatus::Paid,
            fee_details: Vec::new(),
            receipt_url: None,
            timestamp: Utc::now(),
        };

        let mut handles = Vec::new();
        for _ in 0..16 {
            let state = state.clone();
            let record = record.clone();
            let uid = r.uid;
            handles.push(tokio::spawn(async move {
                record_payment(&state, uid, &record).await.unwrap().is_some()
            }));
        }
        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(state.users.get(&r.uid).unwrap().payments.len(), 1);
    }

    #[tokio::test]
    async fn failed_persist_leaves_ledger_untouched_and_retryable() {
        let state = state();
        let r = registrant(&state, "ada@x.org", "India").await;
        let state = state.with_db_pool(Some(crate::db::unreachable_pool()));
        let record = PaymentRecord {
            payment_id: "pay_retry".into(),
            order_id: "order_1".into(),
            signature: String::new(),
            category: "Student / Participant".into(),
            currency: "INR".into(),
            amount_minor: 484_000,
            status: PaymentStatus::Paid,
            fee_details: Vec::new(),
            receipt_url: None,
            timestamp: Utc::now(),
        };

        let err = record_payment(&state, r.uid, &record).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        let stored = state.users.get(&r.uid).unwrap();
        assert!(stored.payments.is_empty());
        assert!(stored.selected_category.is_none());

        // A retry hits the same failure rather than a duplicate.
        let err = record_payment(&state, r.uid, &record).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let req = BankTransfer {
            transaction_id: "UTR9".into(),
            receipt_url: None,
            categories_selected: Vec::new(),
        };
        assert!(record_bank_transfer(&state, &caller(&r), req).await.is_err());
        assert!(state.users.get(&r.uid).unwrap().payments.is_empty());
    }

    #[tokio::test]
    async fn bank_transfer_is_idempotent_and_priced_by_residence() {
        let state = state();
        let r = registrant(&state, "bob@x.org", "Germany").await;
        let req = BankTransfer {
            transaction_id: "UTR123".into(),
            receipt_url: Some("https://files.example/receipt.pdf".into()),
            categories_selected: Vec::new(),
        };
        assert!(record_bank_transfer(&state, &caller(&r), req.clone()).await.unwrap());
        assert!(!record_bank_transfer(&state, &caller(&r), req).await.unwrap());

        let stored = state.users.get(&r.uid).unwrap();
        let entry = &stored.payments.records()[0];
        assert_eq!(entry.order_id, "BANK_UTR123");
        assert_eq!(entry.currency, "USD");
        assert_eq!(entry.status, PaymentStatus::PendingVerification);
        assert_eq!(entry.amount_minor, 0);
    }

    #[tokio::test]
    async fn receipt_upload_records_transfer_and_serves_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_config(AppConfig {
            downloads_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        })
        .unwrap();
        let ada = registrant(&state, "ada@x.org", "India").await;
        let eve = registrant(&state, "eve@x.org", "India").await;

        let url = upload_receipt(&state, &caller(&ada), "UTR9", "slip.PNG", b"\x89PNG")
            .await
            .unwrap()
            .unwrap();
        let stored_name = url.strip_prefix(&format!("{RECEIPT_PATH}/")).unwrap();
        let ada_record = state.users.get(&ada.uid).unwrap();
        let entry = &ada_record.payments.records()[0];
        assert_eq!(entry.receipt_url.as_deref(), Some(url.as_str()));

        assert_eq!(open_receipt(&state, &caller(&ada), stored_name).await.unwrap().len, 4);
        assert!(matches!(
            open_receipt(&state, &caller(&eve), stored_name).await,
            Err(AppError::NotFound(_))
        ));

        // A repeated transaction id keeps the first receipt only.
        let again = upload_receipt(&state, &caller(&ada), "UTR9", "slip.png", b"\x89PNG").await;
        assert_eq!(again.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn receipt_upload_rejects_documents_and_oversize() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_config(AppConfig {
            downloads_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        })
        .unwrap();
        let ada = registrant(&state, "ada@x.org", "India").await;

        let pdf = upload_receipt(&state, &caller(&ada), "UTR1", "slip.pdf", b"%PDF").await;
        assert!(matches!(pdf, Err(AppError::Validation(_))));
        let huge = vec![0u8; MAX_RECEIPT_BYTES + 1];
        let big = upload_receipt(&state, &caller(&ada), "UTR1", "slip.jpg", &huge).await;
        assert!(matches!(big, Err(AppError::Validation(_))));
        assert!(state.users.get(&ada.uid).unwrap().payments.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn webhook_signature_is_checked_over_raw_body() {
        let state = state();
        let body = captured("ada@x.org", "pay_1");
        let good = sign(WEBHOOK_SECRET.as_bytes(), &body);
        assert!(verify_webhook(&state, &body, Some(&good)).is_ok());

        let mut tampered = body.clone();
        tampered.push(b' ');
        assert!(verify_webhook(&state, &tampered, Some(&good)).is_err());
        assert!(verify_webhook(&state, &body, None).is_err());
    }

    #[tokio::test]
    async fn webhook_records_once() {
        let state = state();
        let r = registrant(&state, "ada@x.org", "India").await;
        let body = captured("ada@x.org", "pay_hook");

        let first = handle_webhook(&state, &body, Some("sig")).await.unwrap();
        assert_eq!(first, WebhookOutcome::PaymentSaved);
        let second = handle_webhook(&state, &body, Some("sig")).await.unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyRecorded);

        let stored = state.users.get(&r.uid).unwrap();
        assert_eq!(stored.payments.len(), 1);
        assert!(stored.payments.records()[0].fee_details[0].total_amount > 0);
    }

    #[tokio::test]
    async fn webhook_for_unknown_payer_is_reported() {
        let state = state();
        let body = captured("ghost@x.org", "pay_ghost");
        let outcome = handle_webhook(&state, &body, None).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::UserNotFound);

        let outcome = handle_webhook(&state, b"not json", None).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::InvalidPayload);
    }

    #[tokio::test]
    async fn order_creation_requires_gateway() {
        let state = state();
        let r = registrant(&state, "ada@x.org", "India").await;
        let err = create_order(&state, &caller(&r), student_inr()).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn pruning_drops_stale_orders_and_their_checkouts() {
        let state = state();
        let r = registrant(&state, "ada@x.org", "India").await;
        let now = Utc::now();
        let fee = quote(&student_inr(), today(), PaymentMode::Online);
        let checkout = |uid| Checkout {
            user_id: uid,
            email: "ada@x.org".into(),
            selection: student_inr(),
            quote: fee.clone(),
        };

        let mut settled = OrderRecord::new("order_paid", 100, "INR", "rcpt_1", now);
        settled.capture(now - ChronoDuration::hours(25)).unwrap();
        let open = OrderRecord::new("order_open", 100, "INR", "rcpt_2", now - ChronoDuration::hours(25));
        let abandoned = OrderRecord::new("order_old", 100, "INR", "rcpt_3", now - ChronoDuration::days(8));
        for order in [settled, open, abandoned] {
            track_order(&state, order, checkout(r.uid)).await.unwrap();
        }
        state.checkouts.insert("order_gone".into(), checkout(r.uid));

        assert_eq!(prune_orders(&state, now), 2);
        assert!(state.orders.contains(&"order_open".to_string()));
        assert_eq!(state.orders.len(), 1);
        assert_eq!(state.checkouts.len(), 1);
        assert!(state.checkouts.contains(&"order_open".to_string()));
    }

    #[tokio::test]
    async fn failed_order_persist_tracks_nothing() {
        let state = state().with_db_pool(Some(crate::db::unreachable_pool()));
        let fee = quote(&student_inr(), today(), PaymentMode::Online);
        let order = OrderRecord::new("order_1", 100, "INR", "rcpt_1", Utc::now());
        let checkout = Checkout {
            user_id: Uuid::new_v4(),
            email: "ada@x.org".into(),
            selection: student_inr(),
            quote: fee,
        };
        assert!(track_order(&state, order, checkout).await.is_err());
        assert!(state.orders.is_empty());
        assert!(state.checkouts.is_empty());
    }

    #[test]
    fn mixed_currencies_are_rejected() {
        let mut selection = student_inr();
        selection.push(CategorySelection {
            category: "Student / Participant".into(),
            currency: "USD".into(),
        });
        assert!(selection_currency(&selection).is_err());
        assert!(selection_currency(&[]).is_err());
        assert_eq!(category_summary(&selection), MULTI_CATEGORY);
    }
}
