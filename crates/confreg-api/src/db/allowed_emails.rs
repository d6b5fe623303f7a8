//! Allow-list persistence.
//!
//! The list is a single row. Add and remove are single statements so two
//! admins editing at once cannot lose each other's changes.

use chrono::{DateTime, Utc};
use confreg_core::AllowList;
use sqlx::PgPool;

pub async fn load(pool: &PgPool) -> Result<Option<AllowList>, sqlx::Error> {
    let row = sqlx::query_as::<_, AllowListRow>(
        "SELECT emails, created_at, updated_at FROM allowed_emails WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(AllowListRow::into_record))
}

/// Append `email` unless present, creating the row on first use.
/// Returns the list as stored afterwards.
pub async fn add(pool: &PgPool, email: &str, now: DateTime<Utc>) -> Result<AllowList, sqlx::Error> {
    let row = sqlx::query_as::<_, AllowListRow>(
        "INSERT INTO allowed_emails (id, emails, created_at, updated_at)
         VALUES (1, ARRAY[$1]::TEXT[], $2, $2)
         ON CONFLICT (id) DO UPDATE
             SET emails = CASE
                     WHEN $1 = ANY(allowed_emails.emails) THEN allowed_emails.emails
                     ELSE array_append(allowed_emails.emails, $1)
                 END,
                 updated_at = $2
         RETURNING emails, created_at, updated_at",
    )
    .bind(email)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into_record())
}

/// Remove every occurrence of `email`. Returns the list as stored afterwards,
/// or `None` if the list was never created.
pub async fn remove(
    pool: &PgPool,
    email: &str,
    now: DateTime<Utc>,
) -> Result<Option<AllowList>, sqlx::Error> {
    let row = sqlx::query_as::<_, AllowListRow>(
        "UPDATE allowed_emails SET emails = array_remove(emails, $1), updated_at = $2
         WHERE id = 1
         RETURNING emails, created_at, updated_at",
    )
    .bind(email)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(AllowListRow::into_record))
}

#[derive(sqlx::FromRow)]
struct AllowListRow {
    emails: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AllowListRow {
    fn into_record(self) -> AllowList {
        AllowList {
            emails: self.emails,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
