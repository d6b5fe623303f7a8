//! Invitation request persistence. One row per registrant.

use chrono::{DateTime, NaiveDate, Utc};
use confreg_core::InvitationRequest;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert or replace the registrant's request. `created_at` is kept on replace.
pub async fn upsert(pool: &PgPool, r: &InvitationRequest) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO invitation_requests (user_id, name, address, passport_number,
             passport_expiry, country, nationality, date_of_birth, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (user_id) DO UPDATE
             SET name = EXCLUDED.name, address = EXCLUDED.address,
                 passport_number = EXCLUDED.passport_number,
                 passport_expiry = EXCLUDED.passport_expiry, country = EXCLUDED.country,
                 nationality = EXCLUDED.nationality, date_of_birth = EXCLUDED.date_of_birth,
                 updated_at = EXCLUDED.updated_at",
    )
    .bind(r.user_id)
    .bind(&r.name)
    .bind(&r.address)
    .bind(&r.passport_number)
    .bind(r.passport_expiry)
    .bind(&r.country)
    .bind(&r.nationality)
    .bind(r.date_of_birth)
    .bind(r.created_at)
    .bind(r.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<InvitationRequest>, sqlx::Error> {
    let rows = sqlx::query_as::<_, InvitationRow>(
        "SELECT user_id, name, address, passport_number, passport_expiry, country,
             nationality, date_of_birth, created_at, updated_at
         FROM invitation_requests",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(InvitationRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct InvitationRow {
    user_id: Uuid,
    name: String,
    address: String,
    passport_number: String,
    passport_expiry: Option<NaiveDate>,
    country: String,
    nationality: Option<String>,
    date_of_birth: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvitationRow {
    fn into_record(self) -> InvitationRequest {
        InvitationRequest {
            user_id: self.user_id,
            name: self.name,
            address: self.address,
            passport_number: self.passport_number,
            passport_expiry: self.passport_expiry,
            country: self.country,
            nationality: self.nationality,
            date_of_birth: self.date_of_birth,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
