//! Download metadata persistence. One row per file type.

use chrono::{DateTime, Utc};
use confreg_core::{DownloadFile, FileType};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert or replace the active file for its type.
pub async fn upsert(pool: &PgPool, file: &DownloadFile) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO download_files (file_type, id, file_name, file_url, file_path, uploaded_at, uploaded_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (file_type) DO UPDATE
             SET id = EXCLUDED.id, file_name = EXCLUDED.file_name, file_url = EXCLUDED.file_url,
                 file_path = EXCLUDED.file_path, uploaded_at = EXCLUDED.uploaded_at,
                 uploaded_by = EXCLUDED.uploaded_by",
    )
    .bind(file.file_type.as_str())
    .bind(file.id)
    .bind(&file.file_name)
    .bind(&file.file_url)
    .bind(&file.file_path)
    .bind(file.uploaded_at)
    .bind(&file.uploaded_by)
    .execute(pool)
    .await?;

    Ok(())
}

/// Rows with an unrecognised file type are skipped.
pub async fn load_all(pool: &PgPool) -> Result<Vec<DownloadFile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DownloadFileRow>(
        "SELECT file_type, id, file_name, file_url, file_path, uploaded_at, uploaded_by
         FROM download_files",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(DownloadFileRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct DownloadFileRow {
    file_type: String,
    id: Uuid,
    file_name: String,
    file_url: String,
    file_path: String,
    uploaded_at: DateTime<Utc>,
    uploaded_by: String,
}

impl DownloadFileRow {
    fn into_record(self) -> Option<DownloadFile> {
        let file_type = match FileType::parse(&self.file_type) {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!(file_type = %self.file_type, "unknown file type in database, skipping row");
                return None;
            }
        };
        Some(DownloadFile {
            id: self.id,
            file_type,
            file_name: self.file_name,
            file_url: self.file_url,
            file_path: self.file_path,
            uploaded_at: self.uploaded_at,
            uploaded_by: self.uploaded_by,
        })
    }
}
