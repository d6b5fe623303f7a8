//! Payment ledger persistence.
//!
//! `UNIQUE (user_id, payment_id)` is the durable idempotency guard: an insert
//! that loses the race affects zero rows instead of failing.

use chrono::{DateTime, Utc};
use confreg_core::{FeeLine, PaymentRecord, PaymentStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{amount_from_db, amount_to_db, from_jsonb, to_jsonb};

/// Append a payment to a registrant's ledger and refresh the registrant's
/// category summary, in one transaction.
///
/// Returns `false` when the payment id was already recorded for this user.
pub async fn insert(pool: &PgPool, user_id: Uuid, record: &PaymentRecord) -> Result<bool, sqlx::Error> {
    let amount = amount_to_db(record.amount_minor)?;
    let fee_details = to_jsonb("fee_details", &record.fee_details)?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO payments (user_id, payment_id, order_id, signature, category, currency,
             amount_minor, status, fee_details, receipt_url, recorded_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (user_id, payment_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(&record.payment_id)
    .bind(&record.order_id)
    .bind(&record.signature)
    .bind(&record.category)
    .bind(&record.currency)
    .bind(amount)
    .bind(record.status.as_str())
    .bind(&fee_details)
    .bind(&record.receipt_url)
    .bind(record.timestamp)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    if inserted {
        sqlx::query(
            "UPDATE registrants SET selected_category = $1, selected_category_details = $2,
                 updated_at = $3
             WHERE uid = $4",
        )
        .bind(&record.category)
        .bind(&fee_details)
        .bind(record.timestamp)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Load every ledger entry, oldest first, tagged with its owner.
pub async fn load_all(pool: &PgPool) -> Result<Vec<(Uuid, PaymentRecord)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(
        "SELECT user_id, payment_id, order_id, signature, category, currency, amount_minor,
             status, fee_details, receipt_url, recorded_at
         FROM payments ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PaymentRow::into_record).collect())
}

fn parse_status(s: &str) -> PaymentStatus {
    match s {
        "paid" => PaymentStatus::Paid,
        "pending_verification" => PaymentStatus::PendingVerification,
        other => {
            tracing::warn!(status = other, "unknown payment status in database, defaulting to pending_verification");
            PaymentStatus::PendingVerification
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    user_id: Uuid,
    payment_id: String,
    order_id: String,
    signature: String,
    category: String,
    currency: String,
    amount_minor: i64,
    status: String,
    fee_details: serde_json::Value,
    receipt_url: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_record(self) -> (Uuid, PaymentRecord) {
        let fee_details: Vec<FeeLine> = from_jsonb("fee_details", self.fee_details);
        (
            self.user_id,
            PaymentRecord {
                payment_id: self.payment_id,
                order_id: self.order_id,
                signature: self.signature,
                category: self.category,
                currency: self.currency,
                amount_minor: amount_from_db("amount_minor", self.amount_minor),
                status: parse_status(&self.status),
                fee_details,
                receipt_url: self.receipt_url,
                timestamp: self.recorded_at,
            },
        )
    }
}
