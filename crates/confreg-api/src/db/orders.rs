//! Gateway order persistence.
//!
//! Transition rules are enforced by [`confreg_core::OrderState`], not in SQL.

use chrono::{DateTime, Utc};
use confreg_core::{OrderRecord, OrderState};
use sqlx::PgPool;

use super::{amount_from_db, amount_to_db};

pub async fn insert(pool: &PgPool, order: &OrderRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (order_id, amount_minor, currency, receipt, state, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (order_id) DO NOTHING",
    )
    .bind(&order.order_id)
    .bind(amount_to_db(order.amount_minor)?)
    .bind(&order.currency)
    .bind(&order.receipt)
    .bind(order.state.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_state(
    pool: &PgPool,
    order_id: &str,
    state: OrderState,
    updated_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET state = $1, updated_at = $2 WHERE order_id = $3")
        .bind(state.as_str())
        .bind(updated_at)
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<OrderRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT order_id, amount_minor, currency, receipt, state, created_at, updated_at
         FROM orders ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(OrderRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    amount_minor: i64,
    currency: String,
    receipt: String,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_record(self) -> OrderRecord {
        let state = OrderState::from_name(&self.state).unwrap_or_else(|| {
            tracing::warn!(
                order_id = %self.order_id,
                state = %self.state,
                "unknown order state in database, defaulting to CREATED"
            );
            OrderState::Created
        });
        OrderRecord {
            order_id: self.order_id,
            amount_minor: amount_from_db("amount_minor", self.amount_minor),
            currency: self.currency,
            receipt: self.receipt,
            state,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
