//! # API Route Modules
//!
//! - `fees`: public fee quote.
//! - `users`: registration, login, profile and ledger reads.
//! - `payments`: gateway orders, checkout confirmation, bank transfers,
//!   failure notices, PhonePe.
//! - `webhooks`: the payment provider's signed event deliveries.
//! - `downloads`: allow-listed OTP flow and file serving.
//! - `admin`: file uploads and allow-list administration.
//! - `abstracts`: abstract submission, documents and review.
//! - `papers`: full papers, revisions and review.
//! - `invitations`: invitation-letter requests.
//! - `queries`: the public contact form.
//!
//! Each module exposes `public_router()` for routes mounted outside the
//! auth middleware and/or `router()` for routes that require a bearer token.

pub mod abstracts;
pub mod admin;
pub mod downloads;
pub mod fees;
pub mod invitations;
pub mod papers;
pub mod payments;
pub mod queries;
pub mod users;
pub mod webhooks;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use confreg_core::content_type_for;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use utoipa::IntoParams;

/// Query parameters of a raw-body document upload.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentParams {
    /// Original name; its extension picks the accepted type.
    pub file_name: String,
}

/// Stream a stored file as an attachment named `file_name`.
pub(crate) fn attachment(file_name: &str, handle: tokio::fs::File, len: u64) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name.replace(['"', '\\', '\r', '\n'], "_")
    );
    (
        [
            (header::CONTENT_TYPE, content_type_for(file_name).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(handle)),
    )
        .into_response()
}
