//! # Gated Downloads API
//!
//! Public, but every route that reveals or serves a file checks the
//! allow-list, and serving additionally needs the token from OTP
//! verification.
//!
//! - **GET `/v1/downloads/files`**: active files, newest first
//! - **GET `/v1/downloads/download`**: link to one file for an allow-listed email
//! - **POST `/v1/downloads/request-otp`**: mail a one-time code
//! - **POST `/v1/downloads/verify-otp`**: exchange the code for a download token
//! - **GET `/v1/downloads/file/:file_type`**: the file itself

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use confreg_core::{DownloadFile, FileType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, required, Validate};
use crate::services::downloads::{self, DownloadLink};
use crate::services::otp::{self, VerifiedOtp};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpRequest {
    pub email: String,
}

impl Validate for OtpRequest {
    fn validate(&self) -> Result<(), String> {
        required(&self.email, "email").map(|_| ())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpVerification {
    pub email: String,
    pub otp: String,
}

impl Validate for OtpVerification {
    fn validate(&self) -> Result<(), String> {
        required(&self.email, "email")?;
        required(&self.otp, "otp").map(|_| ())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LinkParams {
    pub file_id: Uuid,
    pub email: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServeParams {
    pub email: String,
    /// Token returned by `verify-otp`.
    pub token: String,
}

/// Listing entry. Storage paths stay server-side.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileSummary {
    pub id: Uuid,
    pub file_type: String,
    pub file_name: String,
    pub file_url: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

impl From<DownloadFile> for FileSummary {
    fn from(file: DownloadFile) -> Self {
        Self {
            id: file.id,
            file_type: file.file_type.as_str().to_string(),
            file_name: file.file_name,
            file_url: file.file_url,
            uploaded_at: file.uploaded_at,
        }
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/v1/downloads/files", get(list_files))
        .route("/v1/downloads/download", get(download_link))
        .route("/v1/downloads/request-otp", post(request_otp))
        .route("/v1/downloads/verify-otp", post(verify_otp))
        .route("/v1/downloads/file/:file_type", get(serve_file))
}

/// GET /v1/downloads/files: Active files, newest first.
#[utoipa::path(
    get,
    path = "/v1/downloads/files",
    responses((status = 200, description = "Active files", body = Vec<FileSummary>)),
    tag = "downloads"
)]
async fn list_files(State(state): State<AppState>) -> Json<Vec<FileSummary>> {
    Json(
        downloads::list_files(&state)
            .into_iter()
            .map(FileSummary::from)
            .collect(),
    )
}

/// GET /v1/downloads/download: Link to a file for an allow-listed email.
#[utoipa::path(
    get,
    path = "/v1/downloads/download",
    params(LinkParams),
    responses(
        (status = 200, description = "Download link", body = DownloadLink),
        (status = 403, description = "Email not on the allow-list", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown file", body = crate::error::ErrorBody),
    ),
    tag = "downloads"
)]
async fn download_link(
    State(state): State<AppState>,
    params: Result<Query<LinkParams>, QueryRejection>,
) -> Result<Json<DownloadLink>, AppError> {
    let params = extract_query(params)?;
    Ok(Json(downloads::download_link(&state, params.file_id, &params.email)?))
}

/// POST /v1/downloads/request-otp: Mail a one-time code to an allow-listed email.
#[utoipa::path(
    post,
    path = "/v1/downloads/request-otp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 403, description = "Email not on the allow-list", body = crate::error::ErrorBody),
        (status = 429, description = "Too many code requests", body = crate::error::ErrorBody),
        (status = 502, description = "Mail delivery failed", body = crate::error::ErrorBody),
    ),
    tag = "downloads"
)]
async fn request_otp(
    State(state): State<AppState>,
    body: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = extract_validated_json(body)?;
    otp::request_otp(&state, &req.email).await?;
    Ok(Json(MessageResponse {
        message: "OTP sent to your email".to_string(),
    }))
}

/// POST /v1/downloads/verify-otp: Exchange a code for a download token.
#[utoipa::path(
    post,
    path = "/v1/downloads/verify-otp",
    request_body = OtpVerification,
    responses(
        (status = 200, description = "Code accepted", body = VerifiedOtp),
        (status = 400, description = "Invalid, expired or used code", body = crate::error::ErrorBody),
        (status = 403, description = "Email not on the allow-list", body = crate::error::ErrorBody),
    ),
    tag = "downloads"
)]
async fn verify_otp(
    State(state): State<AppState>,
    body: Result<Json<OtpVerification>, JsonRejection>,
) -> Result<Json<VerifiedOtp>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(otp::verify_otp(&state, &req.email, &req.otp).await?))
}

/// GET /v1/downloads/file/:file_type: Send the active file as an attachment.
#[utoipa::path(
    get,
    path = "/v1/downloads/file/{file_type}",
    params(
        ("file_type" = String, Path, description = "abstract-booklet or papers-book"),
        ServeParams,
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 401, description = "Missing or invalid download token", body = crate::error::ErrorBody),
        (status = 403, description = "Email not on the allow-list", body = crate::error::ErrorBody),
        (status = 404, description = "Nothing uploaded for this type", body = crate::error::ErrorBody),
    ),
    tag = "downloads"
)]
async fn serve_file(
    State(state): State<AppState>,
    Path(file_type): Path<String>,
    params: Result<Query<ServeParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let file_type = FileType::parse(&file_type)?;
    let params = extract_query(params)?;
    let served = downloads::serve(&state, file_type, &params.email, &params.token).await?;

    Ok(super::attachment(&served.file.file_name, served.handle, served.len))
}
