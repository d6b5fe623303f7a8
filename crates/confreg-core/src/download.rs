//! # Gated Downloads
//!
//! Metadata for the files behind the allow-list. There is at most one active
//! file per [`FileType`]; a new upload supersedes the previous one.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Route prefix files are served from.
pub const SERVE_PREFIX: &str = "/v1/downloads/file";

/// Kinds of downloadable document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    /// The abstract booklet.
    AbstractBooklet,
    /// The collected papers.
    PapersBook,
}

impl FileType {
    /// All file types.
    pub const ALL: [FileType; 2] = [Self::AbstractBooklet, Self::PapersBook];

    /// Return the string representation of this file type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbstractBooklet => "abstract-booklet",
            Self::PapersBook => "papers-book",
        }
    }

    /// Parse the kebab-case name.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "file_type",
                value: s.to_string(),
            })
    }

    /// Public URL path the file is served at.
    pub fn serve_url(&self) -> String {
        format!("{SERVE_PREFIX}/{}", self.as_str())
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active file for one [`FileType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFile {
    /// Record id.
    pub id: Uuid,
    /// Kind of document.
    pub file_type: FileType,
    /// Display name shown to downloaders.
    pub file_name: String,
    /// Public URL path.
    pub file_url: String,
    /// Storage path relative to the downloads directory.
    pub file_path: String,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
    /// Admin subject that uploaded it.
    pub uploaded_by: String,
}

/// Content type for a stored file, by extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("zip") => "application/zip",
        Some("rar") => "application/x-rar-compressed",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Extensions accepted for abstract and paper documents.
pub const DOCUMENT_EXTENSIONS: [&str; 3] = ["pdf", "doc", "docx"];

/// Extensions accepted for bank-transfer receipts.
pub const RECEIPT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
}

/// Reject a file name whose extension is not in `allowed`.
pub fn ensure_extension(file_name: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    match extension_of(file_name) {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(()),
        _ => Err(ValidationError::InvalidValue {
            field: "file_name",
            value: file_name.to_string(),
        }),
    }
}

/// Storage name for an upload: `<file-type>-<millis>-<random hex><.ext>`.
///
/// Only the extension of the client-supplied name survives, so the stored
/// name never contains path separators.
pub fn stored_file_name(
    file_type: FileType,
    original_name: &str,
    unix_millis: i64,
    random_hex: &str,
) -> String {
    flat_file_name(file_type.as_str(), original_name, unix_millis, random_hex)
}

/// [`stored_file_name`] with an arbitrary prefix.
///
/// The prefix is reduced to ASCII alphanumerics, `-` and `_`.
pub fn flat_file_name(
    prefix: &str,
    original_name: &str,
    unix_millis: i64,
    random_hex: &str,
) -> String {
    let prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let ext = extension_of(original_name)
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{prefix}-{unix_millis}-{random_hex}{ext}")
}

/// A document a registrant attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Name the client uploaded it under.
    pub file_name: String,
    /// Flat storage name. Never serialized.
    #[serde(skip_serializing, default)]
    pub stored_name: String,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_names() {
        assert_eq!(FileType::parse("abstract-booklet").unwrap(), FileType::AbstractBooklet);
        assert_eq!(FileType::parse("papers-book").unwrap(), FileType::PapersBook);
        assert!(FileType::parse("slides").is_err());
        let json = serde_json::to_string(&FileType::PapersBook).unwrap();
        assert_eq!(json, "\"papers-book\"");
    }

    #[test]
    fn serve_url_uses_file_type() {
        assert_eq!(
            FileType::AbstractBooklet.serve_url(),
            "/v1/downloads/file/abstract-booklet"
        );
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("x.PDF"), "application/pdf");
        assert_eq!(content_type_for("x.docx"), "application/vnd.openxmlformats-officedocument.wordprocessingml.document");
        assert_eq!(content_type_for("x.rar"), "application/x-rar-compressed");
        assert_eq!(content_type_for("x"), "application/octet-stream");
        assert_eq!(content_type_for("x.exe"), "application/octet-stream");
    }

    #[test]
    fn stored_name_keeps_only_extension() {
        let name = stored_file_name(FileType::PapersBook, "../../etc/Book.PDF", 1700, "0a1b2c3d4e5f6a7b");
        assert_eq!(name, "papers-book-1700-0a1b2c3d4e5f6a7b.pdf");
        let bare = stored_file_name(FileType::AbstractBooklet, "noext", 1, "ff");
        assert_eq!(bare, "abstract-booklet-1-ff");
        let odd = flat_file_name("ABS/../_0001", "x.DocX", 2, "aa");
        assert_eq!(odd, "ABS_0001-2-aa.docx");
    }

    #[test]
    fn extension_allow_lists() {
        assert!(ensure_extension("Paper.PDF", &DOCUMENT_EXTENSIONS).is_ok());
        assert!(ensure_extension("paper.docx", &DOCUMENT_EXTENSIONS).is_ok());
        assert!(ensure_extension("paper.exe", &DOCUMENT_EXTENSIONS).is_err());
        assert!(ensure_extension("paper", &DOCUMENT_EXTENSIONS).is_err());
        assert!(ensure_extension("scan.jpeg", &RECEIPT_EXTENSIONS).is_ok());
        assert_eq!(content_type_for("scan.PNG"), "image/png");
    }
}
