//! Paper persistence. The review is a JSONB column; the two documents are
//! nullable column triples.

use chrono::{DateTime, Utc};
use confreg_core::{Paper, PaperReview, PaperStatus, PaperType};
use sqlx::PgPool;
use uuid::Uuid;

use super::{document_from_columns, from_jsonb, to_jsonb};

/// Insert a new paper. Returns `false` when the abstract already has one.
pub async fn insert(pool: &PgPool, p: &Paper) -> Result<bool, sqlx::Error> {
    let review = to_jsonb("review", &p.review)?;
    let original = p.paper_file.as_ref();
    let revised = p.revised_file.as_ref();
    let result = sqlx::query(
        "INSERT INTO papers (paper_code, user_id, title, abstract_text, keywords, track,
             paper_type, first_author_name, presenting_author_name, other_authors,
             paper_file_name, paper_file_stored_name, paper_file_uploaded_at,
             revised_file_name, revised_file_stored_name, revised_file_uploaded_at,
             status, review, submitted_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
         ON CONFLICT (paper_code) DO NOTHING",
    )
    .bind(&p.paper_code)
    .bind(p.user_id)
    .bind(&p.title)
    .bind(&p.abstract_text)
    .bind(&p.keywords)
    .bind(&p.track)
    .bind(p.paper_type.as_str())
    .bind(&p.first_author_name)
    .bind(&p.presenting_author_name)
    .bind(&p.other_authors)
    .bind(original.map(|d| d.file_name.as_str()))
    .bind(original.map(|d| d.stored_name.as_str()))
    .bind(original.map(|d| d.uploaded_at))
    .bind(revised.map(|d| d.file_name.as_str()))
    .bind(revised.map(|d| d.stored_name.as_str()))
    .bind(revised.map(|d| d.uploaded_at))
    .bind(p.status.as_str())
    .bind(&review)
    .bind(p.submitted_at)
    .bind(p.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Write back documents, status and review.
pub async fn update(pool: &PgPool, p: &Paper) -> Result<bool, sqlx::Error> {
    let review = to_jsonb("review", &p.review)?;
    let original = p.paper_file.as_ref();
    let revised = p.revised_file.as_ref();
    let result = sqlx::query(
        "UPDATE papers SET paper_file_name = $1, paper_file_stored_name = $2,
             paper_file_uploaded_at = $3, revised_file_name = $4, revised_file_stored_name = $5,
             revised_file_uploaded_at = $6, status = $7, review = $8, updated_at = $9
         WHERE paper_code = $10",
    )
    .bind(original.map(|d| d.file_name.as_str()))
    .bind(original.map(|d| d.stored_name.as_str()))
    .bind(original.map(|d| d.uploaded_at))
    .bind(revised.map(|d| d.file_name.as_str()))
    .bind(revised.map(|d| d.stored_name.as_str()))
    .bind(revised.map(|d| d.uploaded_at))
    .bind(p.status.as_str())
    .bind(&review)
    .bind(p.updated_at)
    .bind(&p.paper_code)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns whether a row was deleted.
pub async fn delete(pool: &PgPool, paper_code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM papers WHERE paper_code = $1")
        .bind(paper_code)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load every paper. Rows with an unknown status or type are skipped.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Paper>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaperRow>(
        "SELECT paper_code, user_id, title, abstract_text, keywords, track, paper_type,
             first_author_name, presenting_author_name, other_authors, paper_file_name,
             paper_file_stored_name, paper_file_uploaded_at, revised_file_name,
             revised_file_stored_name, revised_file_uploaded_at, status, review,
             submitted_at, updated_at
         FROM papers ORDER BY submitted_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(PaperRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct PaperRow {
    paper_code: String,
    user_id: Uuid,
    title: String,
    abstract_text: String,
    keywords: Vec<String>,
    track: String,
    paper_type: String,
    first_author_name: String,
    presenting_author_name: String,
    other_authors: Vec<String>,
    paper_file_name: Option<String>,
    paper_file_stored_name: Option<String>,
    paper_file_uploaded_at: Option<DateTime<Utc>>,
    revised_file_name: Option<String>,
    revised_file_stored_name: Option<String>,
    revised_file_uploaded_at: Option<DateTime<Utc>>,
    status: String,
    review: Option<serde_json::Value>,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaperRow {
    fn into_record(self) -> Option<Paper> {
        let (status, paper_type) = match (
            PaperStatus::parse(&self.status),
            PaperType::parse(&self.paper_type),
        ) {
            (Ok(status), Ok(paper_type)) => (status, paper_type),
            _ => {
                tracing::warn!(
                    code = %self.paper_code,
                    status = %self.status,
                    paper_type = %self.paper_type,
                    "unknown paper status or type, skipping row"
                );
                return None;
            }
        };
        let review: Option<PaperReview> = self
            .review
            .and_then(|value| from_jsonb("review", value));
        Some(Paper {
            abstract_code: self.paper_code.clone(),
            paper_code: self.paper_code,
            user_id: self.user_id,
            title: self.title,
            abstract_text: self.abstract_text,
            keywords: self.keywords,
            track: self.track,
            paper_type,
            first_author_name: self.first_author_name,
            presenting_author_name: self.presenting_author_name,
            other_authors: self.other_authors,
            paper_file: document_from_columns(
                self.paper_file_name,
                self.paper_file_stored_name,
                self.paper_file_uploaded_at,
            ),
            revised_file: document_from_columns(
                self.revised_file_name,
                self.revised_file_stored_name,
                self.revised_file_uploaded_at,
            ),
            status,
            review,
            submitted_at: self.submitted_at,
            updated_at: self.updated_at,
        })
    }
}
