//! Abstract persistence. The attached document is stored as three nullable
//! columns.

use chrono::{DateTime, Utc};
use confreg_core::abstracts::AbstractStatus;
use confreg_core::AbstractSubmission;
use sqlx::PgPool;
use uuid::Uuid;

use super::document_from_columns;

/// Insert a new abstract. Returns `false` when the code is already taken.
pub async fn insert(pool: &PgPool, a: &AbstractSubmission) -> Result<bool, sqlx::Error> {
    let doc = a.document.as_ref();
    let result = sqlx::query(
        "INSERT INTO abstracts (abstract_code, user_id, title, theme, presenting_type,
             first_author_name, first_author_affiliation, other_authors,
             presenting_author_name, presenting_author_affiliation, main_body,
             document_name, document_stored_name, document_uploaded_at,
             is_finalized, status, remarks, submitted_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
         ON CONFLICT (abstract_code) DO NOTHING",
    )
    .bind(&a.abstract_code)
    .bind(a.user_id)
    .bind(&a.title)
    .bind(&a.theme)
    .bind(&a.presenting_type)
    .bind(&a.first_author_name)
    .bind(&a.first_author_affiliation)
    .bind(&a.other_authors)
    .bind(&a.presenting_author_name)
    .bind(&a.presenting_author_affiliation)
    .bind(&a.main_body)
    .bind(doc.map(|d| d.file_name.as_str()))
    .bind(doc.map(|d| d.stored_name.as_str()))
    .bind(doc.map(|d| d.uploaded_at))
    .bind(a.is_finalized)
    .bind(a.status.as_str())
    .bind(&a.remarks)
    .bind(a.submitted_at)
    .bind(a.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Write back every mutable column.
pub async fn update(pool: &PgPool, a: &AbstractSubmission) -> Result<bool, sqlx::Error> {
    let doc = a.document.as_ref();
    let result = sqlx::query(
        "UPDATE abstracts SET title = $1, theme = $2, presenting_type = $3,
             first_author_name = $4, first_author_affiliation = $5, other_authors = $6,
             presenting_author_name = $7, presenting_author_affiliation = $8, main_body = $9,
             document_name = $10, document_stored_name = $11, document_uploaded_at = $12,
             is_finalized = $13, status = $14, remarks = $15, updated_at = $16
         WHERE abstract_code = $17",
    )
    .bind(&a.title)
    .bind(&a.theme)
    .bind(&a.presenting_type)
    .bind(&a.first_author_name)
    .bind(&a.first_author_affiliation)
    .bind(&a.other_authors)
    .bind(&a.presenting_author_name)
    .bind(&a.presenting_author_affiliation)
    .bind(&a.main_body)
    .bind(doc.map(|d| d.file_name.as_str()))
    .bind(doc.map(|d| d.stored_name.as_str()))
    .bind(doc.map(|d| d.uploaded_at))
    .bind(a.is_finalized)
    .bind(a.status.as_str())
    .bind(&a.remarks)
    .bind(a.updated_at)
    .bind(&a.abstract_code)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load every abstract. Rows with an unknown status are skipped.
pub async fn load_all(pool: &PgPool) -> Result<Vec<AbstractSubmission>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AbstractRow>(
        "SELECT abstract_code, user_id, title, theme, presenting_type, first_author_name,
             first_author_affiliation, other_authors, presenting_author_name,
             presenting_author_affiliation, main_body, document_name, document_stored_name,
             document_uploaded_at, is_finalized, status, remarks, submitted_at, updated_at
         FROM abstracts ORDER BY submitted_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(AbstractRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct AbstractRow {
    abstract_code: String,
    user_id: Uuid,
    title: String,
    theme: String,
    presenting_type: String,
    first_author_name: String,
    first_author_affiliation: String,
    other_authors: String,
    presenting_author_name: String,
    presenting_author_affiliation: String,
    main_body: String,
    document_name: Option<String>,
    document_stored_name: Option<String>,
    document_uploaded_at: Option<DateTime<Utc>>,
    is_finalized: bool,
    status: String,
    remarks: Option<String>,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AbstractRow {
    fn into_record(self) -> Option<AbstractSubmission> {
        let status = match AbstractStatus::parse(&self.status) {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(code = %self.abstract_code, status = %self.status, "unknown abstract status, skipping row");
                return None;
            }
        };
        Some(AbstractSubmission {
            abstract_code: self.abstract_code,
            user_id: self.user_id,
            title: self.title,
            theme: self.theme,
            presenting_type: self.presenting_type,
            first_author_name: self.first_author_name,
            first_author_affiliation: self.first_author_affiliation,
            other_authors: self.other_authors,
            presenting_author_name: self.presenting_author_name,
            presenting_author_affiliation: self.presenting_author_affiliation,
            main_body: self.main_body,
            document: document_from_columns(
                self.document_name,
                self.document_stored_name,
                self.document_uploaded_at,
            ),
            is_finalized: self.is_finalized,
            status,
            remarks: self.remarks,
            submitted_at: self.submitted_at,
            updated_at: self.updated_at,
        })
    }
}
