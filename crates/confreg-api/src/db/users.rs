//! Registrant persistence operations.
//!
//! The payment ledger lives in the `payments` table; see [`super::payments`].

use chrono::{DateTime, Utc};
use confreg_core::{AccompanyingPerson, FeeLine, PaymentLedger, Registrant};
use sqlx::PgPool;
use uuid::Uuid;

use super::{from_jsonb, to_jsonb};

/// Insert a new registrant. Fails with a unique violation if the email is taken.
pub async fn insert(pool: &PgPool, r: &Registrant) -> Result<(), sqlx::Error> {
    let persons = to_jsonb("accompanying_persons", &r.accompanying_persons)?;
    let details = to_jsonb("selected_category_details", &r.selected_category_details)?;

    sqlx::query(
        "INSERT INTO registrants (uid, email, password_hash, phone, given_name, family_name,
             full_name, country, affiliation, title, category1, address, zipcode,
             dietary_preference, accompanying_persons, selected_category,
             selected_category_details, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
    )
    .bind(r.uid)
    .bind(&r.email)
    .bind(&r.password_hash)
    .bind(&r.phone)
    .bind(&r.given_name)
    .bind(&r.family_name)
    .bind(&r.full_name)
    .bind(&r.country)
    .bind(&r.affiliation)
    .bind(&r.title)
    .bind(&r.category1)
    .bind(&r.address)
    .bind(&r.zipcode)
    .bind(&r.dietary_preference)
    .bind(&persons)
    .bind(&r.selected_category)
    .bind(&details)
    .bind(r.created_at)
    .bind(r.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write back the mutable profile fields and the category summary.
pub async fn update(pool: &PgPool, r: &Registrant) -> Result<bool, sqlx::Error> {
    let persons = to_jsonb("accompanying_persons", &r.accompanying_persons)?;
    let details = to_jsonb("selected_category_details", &r.selected_category_details)?;

    let result = sqlx::query(
        "UPDATE registrants SET phone = $1, country = $2, affiliation = $3, title = $4,
             category1 = $5, address = $6, zipcode = $7, dietary_preference = $8,
             accompanying_persons = $9, selected_category = $10,
             selected_category_details = $11, updated_at = $12
         WHERE uid = $13",
    )
    .bind(&r.phone)
    .bind(&r.country)
    .bind(&r.affiliation)
    .bind(&r.title)
    .bind(&r.category1)
    .bind(&r.address)
    .bind(&r.zipcode)
    .bind(&r.dietary_preference)
    .bind(&persons)
    .bind(&r.selected_category)
    .bind(&details)
    .bind(r.updated_at)
    .bind(r.uid)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace the password hash.
pub async fn update_password(
    pool: &PgPool,
    uid: Uuid,
    password_hash: &str,
    updated_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE registrants SET password_hash = $1, updated_at = $2 WHERE uid = $3")
        .bind(password_hash)
        .bind(updated_at)
        .bind(uid)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load every registrant, without ledgers.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Registrant>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RegistrantRow>(
        "SELECT uid, email, password_hash, phone, given_name, family_name, full_name, country,
             affiliation, title, category1, address, zipcode, dietary_preference,
             accompanying_persons, selected_category, selected_category_details,
             created_at, updated_at
         FROM registrants ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(RegistrantRow::into_record).collect())
}

/// Whether a database error is the email uniqueness constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map_or(false, |e| e.is_unique_violation())
}

#[derive(sqlx::FromRow)]
struct RegistrantRow {
    uid: Uuid,
    email: String,
    password_hash: String,
    phone: String,
    given_name: String,
    family_name: Option<String>,
    full_name: String,
    country: String,
    affiliation: String,
    title: Option<String>,
    category1: Option<String>,
    address: Option<String>,
    zipcode: Option<String>,
    dietary_preference: Option<String>,
    accompanying_persons: serde_json::Value,
    selected_category: Option<String>,
    selected_category_details: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RegistrantRow {
    fn into_record(self) -> Registrant {
        let accompanying_persons: Vec<AccompanyingPerson> =
            from_jsonb("accompanying_persons", self.accompanying_persons);
        let selected_category_details: Vec<FeeLine> =
            from_jsonb("selected_category_details", self.selected_category_details);
        Registrant {
            uid: self.uid,
            email: self.email,
            password_hash: self.password_hash,
            phone: self.phone,
            given_name: self.given_name,
            family_name: self.family_name,
            full_name: self.full_name,
            country: self.country,
            affiliation: self.affiliation,
            title: self.title,
            category1: self.category1,
            address: self.address,
            zipcode: self.zipcode,
            dietary_preference: self.dietary_preference,
            accompanying_persons,
            selected_category: self.selected_category,
            selected_category_details,
            payments: PaymentLedger::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
