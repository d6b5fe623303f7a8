//! # Payments
//!
//! Ledger entries, the per-registrant append-only ledger, and the order
//! lifecycle tracked for every gateway order.
//!
//! ## Idempotence
//!
//! A payment id appears at most once in a ledger. Webhook delivery and the
//! client's own confirmation call race each other for the same payment; the
//! loser observes [`RecordOutcome::Duplicate`] and must treat it as a no-op.
//! Callers serialise access to a ledger (one write lock, or a unique index
//! in the database) so the check and the append are a single step.
//!
//! ## Order Lifecycle
//!
//! ```text
//! CREATED ──► PENDING ──► PAID
//!    │           │
//!    └───────────┴──────► FAILED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::fee::{Currency, FeeLine};

// ── Ledger Entries ──────────────────────────────────────────────────────────

/// Settlement status of a recorded payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Captured by the gateway.
    Paid,
    /// Bank transfer receipt awaiting manual verification.
    PendingVerification,
}

impl PaymentStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::PendingVerification => "pending_verification",
        }
    }
}

/// One entry in a registrant's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Gateway payment id, or the bank transaction id. Unique per ledger.
    pub payment_id: String,
    /// Gateway order id (`BANK_<txn>` for bank transfers).
    pub order_id: String,
    /// Checkout signature, or a marker for non-gateway channels.
    pub signature: String,
    /// Category summary. `"Multi"` when several categories were paid together.
    pub category: String,
    /// Currency code.
    pub currency: String,
    /// Amount in minor units (paise, cents).
    pub amount_minor: u64,
    /// Settlement status.
    pub status: PaymentStatus,
    /// Server-side fee breakdown at the time of recording.
    #[serde(default)]
    pub fee_details: Vec<FeeLine>,
    /// Uploaded receipt location, for bank transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    /// When the record was accepted.
    pub timestamp: DateTime<Utc>,
}

/// Result of appending to a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The record was appended.
    Accepted,
    /// A record with the same payment id already exists; nothing changed.
    Duplicate,
}

impl RecordOutcome {
    /// Whether the ledger changed.
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Append-only list of a registrant's payments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentLedger(Vec<PaymentRecord>);

impl PaymentLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored records, dropping any repeated payment id.
    pub fn from_records(records: impl IntoIterator<Item = PaymentRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            ledger.record(record);
        }
        ledger
    }

    /// Append `record` unless its payment id is already present.
    pub fn record(&mut self, record: PaymentRecord) -> RecordOutcome {
        if self.contains(&record.payment_id) {
            return RecordOutcome::Duplicate;
        }
        self.0.push(record);
        RecordOutcome::Accepted
    }

    /// Whether a payment id has been recorded.
    pub fn contains(&self, payment_id: &str) -> bool {
        self.0.iter().any(|r| r.payment_id == payment_id)
    }

    /// Look up a record by payment id.
    pub fn get(&self, payment_id: &str) -> Option<&PaymentRecord> {
        self.0.iter().find(|r| r.payment_id == payment_id)
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[PaymentRecord] {
        &self.0
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Render a minor-unit amount as `<symbol><major>.<minor>`, e.g. `₹4840.00`.
pub fn format_amount(amount_minor: u64, currency: &str) -> String {
    let symbol = Currency::from_code(currency)
        .map(|c| c.symbol())
        .unwrap_or("");
    format!("{symbol}{}.{:02}", amount_minor / 100, amount_minor % 100)
}

// ── Order Lifecycle ─────────────────────────────────────────────────────────

/// Lifecycle state of a gateway order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Order created with the provider; no payment attempt seen.
    Created,
    /// A payment was authorised but not yet captured.
    Pending,
    /// Payment captured. Terminal state.
    Paid,
    /// Payment failed. Terminal state.
    Failed,
}

impl OrderState {
    /// Whether this is a terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CREATED" => Some(Self::Created),
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    fn allows(&self, to: OrderState) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Pending)
                | (Self::Created, Self::Failed)
                | (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Failed)
        )
    }

    /// Move to `to` if the edge exists.
    pub fn transition(self, to: OrderState) -> Result<OrderState, TransitionError> {
        if self.allows(to) {
            Ok(to)
        } else {
            Err(TransitionError {
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }

    /// Settle as paid. A capture that arrives while still `Created` steps
    /// through `Pending` first; the provider can skip the authorised event.
    pub fn capture(self) -> Result<OrderState, TransitionError> {
        match self {
            Self::Created => self.transition(Self::Pending)?.transition(Self::Paid),
            other => other.transition(Self::Paid),
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gateway order tracked server-side so the expected amount never comes
/// from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Provider order id.
    pub order_id: String,
    /// Expected amount in minor units.
    pub amount_minor: u64,
    /// Currency code.
    pub currency: String,
    /// Merchant receipt reference.
    pub receipt: String,
    /// Current lifecycle state.
    pub state: OrderState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Track a freshly created order.
    pub fn new(
        order_id: impl Into<String>,
        amount_minor: u64,
        currency: impl Into<String>,
        receipt: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            amount_minor,
            currency: currency.into(),
            receipt: receipt.into(),
            state: OrderState::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a transition, stamping `updated_at` on success.
    pub fn advance(&mut self, to: OrderState, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.state = self.state.transition(to)?;
        self.updated_at = now;
        Ok(())
    }

    /// Apply [`OrderState::capture`], stamping `updated_at` on success.
    pub fn capture(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.state = self.state.capture()?;
        self.updated_at = now;
        Ok(())
    }
}
