//! # Submission Documents
//!
//! Files registrants attach to abstracts, papers and bank-transfer
//! receipts. They share the downloads directory with the gated files and
//! the same flat naming scheme, keyed by the owning record.

use chrono::{DateTime, Utc};
use confreg_core::{ensure_extension, flat_file_name, StoredDocument};
use rand::RngCore;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::StorageError;

const STORED_NAME_RANDOM_BYTES: usize = 8;

/// Validate and write an upload. `prefix` names the owning record.
pub async fn store(
    state: &AppState,
    prefix: &str,
    file_name: &str,
    bytes: &[u8],
    allowed_extensions: &[&str],
    now: DateTime<Utc>,
) -> Result<StoredDocument, AppError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(AppError::Validation("file_name is required".into()));
    }
    if bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".into()));
    }
    ensure_extension(file_name, allowed_extensions).map_err(|_| {
        AppError::Validation(format!(
            "unsupported file type {file_name:?}, expected one of: {}",
            allowed_extensions.join(", ")
        ))
    })?;

    let mut random = [0u8; STORED_NAME_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut random);
    let stored_name = flat_file_name(prefix, file_name, now.timestamp_millis(), &hex::encode(random));
    state
        .storage
        .save(&stored_name, bytes)
        .await
        .map_err(|e| AppError::Internal(format!("failed to store upload: {e}")))?;

    Ok(StoredDocument {
        file_name: file_name.to_string(),
        stored_name,
        uploaded_at: now,
    })
}

/// Remove a stored file. Failures are logged, never returned.
pub async fn discard(state: &AppState, stored_name: &str) {
    match state.storage.delete(stored_name).await {
        Ok(_) => tracing::debug!(path = %stored_name, "stored document removed"),
        Err(e) => tracing::warn!(path = %stored_name, error = %e, "stored document could not be removed"),
    }
}

/// An open document ready to stream.
#[derive(Debug)]
pub struct OpenDocument {
    pub file_name: String,
    pub handle: tokio::fs::File,
    pub len: u64,
}

/// Open `document`, which belongs to `owner` (used in messages and logs).
pub async fn open(
    state: &AppState,
    owner: &str,
    document: &StoredDocument,
) -> Result<OpenDocument, AppError> {
    open_stored(state, owner, &document.stored_name, &document.file_name).await
}

/// Open a stored file by its storage name.
pub async fn open_stored(
    state: &AppState,
    owner: &str,
    stored_name: &str,
    file_name: &str,
) -> Result<OpenDocument, AppError> {
    match state.storage.open(stored_name).await {
        Ok((handle, len)) => Ok(OpenDocument {
            file_name: file_name.to_string(),
            handle,
            len,
        }),
        Err(StorageError::NotFound(name)) => {
            tracing::error!(owner, path = %name, "record points at a missing document");
            Err(AppError::NotFound(format!("document for {owner} is not available")))
        }
        Err(StorageError::InvalidName(name)) => {
            Err(AppError::NotFound(format!("document {name:?} not found")))
        }
        Err(e) => Err(AppError::Internal(format!("failed to read document for {owner}: {e}"))),
    }
}
