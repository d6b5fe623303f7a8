//! # Gated Downloads and the Allow-List
//!
//! Every download operation re-checks the allow-list from scratch; no
//! session carries trust between requests. Serving a file additionally
//! needs the token minted by OTP verification, bound to the same address.

use chrono::Utc;
use confreg_core::{
    normalize_email, stored_file_name, AllowList, AllowListError, DownloadFile, FileType,
};
use rand::RngCore;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::StorageError;

const STORED_NAME_RANDOM_BYTES: usize = 8;

/// Normalize `email` and require it to be on the allow-list.
pub fn ensure_allowed(state: &AppState, email: &str) -> Result<String, AppError> {
    let email = normalize_email(email)?;
    let allowed = state
        .allow_list
        .get()
        .is_some_and(|list| list.contains(&email));
    if !allowed {
        tracing::warn!(email = %email, "email not on the download allow-list");
        return Err(AppError::Forbidden("email is not authorized for downloads".into()));
    }
    Ok(email)
}

/// Active files, newest first.
pub fn list_files(state: &AppState) -> Vec<DownloadFile> {
    let mut files = state.download_files.list();
    files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    files
}

/// Where an allow-listed address can fetch a file.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DownloadLink {
    pub file_url: String,
    pub file_name: String,
}

pub fn download_link(state: &AppState, file_id: Uuid, email: &str) -> Result<DownloadLink, AppError> {
    ensure_allowed(state, email)?;
    let file = state
        .download_files
        .list()
        .into_iter()
        .find(|f| f.id == file_id)
        .ok_or_else(|| AppError::NotFound(format!("file {file_id} not found")))?;
    Ok(DownloadLink {
        file_url: file.file_url,
        file_name: file.file_name,
    })
}

/// An open file and the metadata needed to send it.
#[derive(Debug)]
pub struct ServedFile {
    pub file: DownloadFile,
    pub handle: tokio::fs::File,
    pub len: u64,
}

/// Read the active file of `file_type` for a verified, allow-listed address.
pub async fn serve(
    state: &AppState,
    file_type: FileType,
    email: &str,
    token: &str,
) -> Result<ServedFile, AppError> {
    let email = ensure_allowed(state, email)?;
    let now = Utc::now();
    let authorized = state
        .download_tokens
        .get(&token.trim().to_string())
        .is_some_and(|t| t.authorizes(&email, token.trim(), now));
    if !authorized {
        tracing::warn!(email = %email, file_type = %file_type, "download token rejected");
        return Err(AppError::Unauthorized("invalid or expired download token".into()));
    }

    let file = state
        .download_files
        .get(&file_type)
        .ok_or_else(|| AppError::NotFound(format!("no {file_type} has been uploaded")))?;
    let (handle, len) = match state.storage.open(&file.file_path).await {
        Ok(opened) => opened,
        Err(StorageError::NotFound(name)) => {
            tracing::error!(file_type = %file_type, path = %name, "metadata points at a missing file");
            return Err(AppError::NotFound(format!("{file_type} is not available")));
        }
        Err(e) => return Err(AppError::Internal(format!("failed to read {file_type}: {e}"))),
    };

    tracing::info!(email = %email, file_type = %file_type, size = len, "file served");
    Ok(ServedFile { file, handle, len })
}

/// Store a new file for `file_type`, superseding the previous one.
pub async fn upload(
    state: &AppState,
    uploaded_by: &str,
    file_type: FileType,
    file_name: &str,
    bytes: &[u8],
) -> Result<DownloadFile, AppError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(AppError::Validation("file_name is required".into()));
    }
    if bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".into()));
    }

    let now = Utc::now();
    let mut random = [0u8; STORED_NAME_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut random);
    let stored = stored_file_name(file_type, file_name, now.timestamp_millis(), &hex::encode(random));

    state
        .storage
        .save(&stored, bytes)
        .await
        .map_err(|e| AppError::Internal(format!("failed to store upload: {e}")))?;

    let record = DownloadFile {
        id: Uuid::new_v4(),
        file_type,
        file_name: file_name.to_string(),
        file_url: file_type.serve_url(),
        file_path: stored,
        uploaded_at: now,
        uploaded_by: uploaded_by.to_string(),
    };
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::download_files::upsert(pool, &record).await {
            tracing::error!(file_type = %file_type, error = %e, "failed to persist download metadata to database");
            super::documents::discard(state, &record.file_path).await;
            return Err(AppError::database("upload could not be persisted", e));
        }
    }
    let previous = state.download_files.insert(file_type, record.clone());

    if let Some(old) = previous.filter(|old| old.file_path != record.file_path) {
        match state.storage.delete(&old.file_path).await {
            Ok(_) => tracing::info!(path = %old.file_path, "superseded file removed"),
            Err(e) => tracing::warn!(path = %old.file_path, error = %e, "superseded file could not be removed"),
        }
    }

    tracing::info!(file_type = %file_type, size = bytes.len(), uploaded_by, "file uploaded");
    Ok(record)
}

// -- Allow-list administration ------------------------------------------------

pub fn allowed_emails(state: &AppState) -> Vec<String> {
    state.allow_list.get().map(|l| l.emails).unwrap_or_default()
}

/// Add `email`. Conflict if already present.
///
/// With a database attached the stored row is written first and mirrored on
/// success; a failed write leaves the in-memory list as it was.
pub async fn add_email(state: &AppState, email: &str) -> Result<AllowList, AppError> {
    let now = Utc::now();
    let Some(pool) = &state.db_pool else {
        let added = state
            .allow_list
            .update(|| AllowList::empty(now), |list| list.add(email, now).map(|e| (e, list.clone())));
        let (email, list) = added.map_err(already_present)?;
        tracing::info!(email = %email, "email added to allow-list");
        return Ok(list);
    };

    let email = normalize_email(email)?;
    if state.allow_list.get().is_some_and(|list| list.contains(&email)) {
        return Err(already_present(AllowListError::AlreadyPresent(email)));
    }
    let stored = crate::db::allowed_emails::add(pool, &email, now)
        .await
        .map_err(|e| {
            tracing::error!(email = %email, error = %e, "failed to persist allow-list to database");
            AppError::database("allow-list could not be persisted", e)
        })?;
    state.allow_list.set(stored.clone());

    tracing::info!(email = %email, "email added to allow-list");
    Ok(stored)
}

fn already_present(err: AllowListError) -> AppError {
    match err {
        AllowListError::AlreadyPresent(email) => {
            AppError::Conflict(format!("email already in allow-list: {email}"))
        }
        other => other.into(),
    }
}

/// Remove `email`. Succeeds whether or not it was present.
pub async fn remove_email(state: &AppState, email: &str) -> Result<AllowList, AppError> {
    let email = normalize_email(email)?;
    let now = Utc::now();

    if let Some(pool) = &state.db_pool {
        let stored = crate::db::allowed_emails::remove(pool, &email, now)
            .await
            .map_err(|e| {
                tracing::error!(email = %email, error = %e, "failed to persist allow-list to database");
                AppError::database("allow-list could not be persisted", e)
            })?;
        if let Some(stored) = stored {
            state.allow_list.set(stored.clone());
            tracing::info!(email = %email, "allow-list removal processed");
            return Ok(stored);
        }
    }

    let (removed, list) = state.allow_list.update(
        || AllowList::empty(now),
        |list| {
            let removed = list.remove(&email, now);
            (removed, list.clone())
        },
    );
    let removed = removed?;

    tracing::info!(email = %email, removed, "allow-list removal processed");
    Ok(list)
}
