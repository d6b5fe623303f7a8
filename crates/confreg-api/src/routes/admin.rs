//! # Download Administration API
//!
//! Admin role required on every route.
//!
//! - **POST `/v1/downloads/admin/upload?file_type&file_name`**: raw body upload
//! - **GET `/v1/downloads/admin/allowed-emails`**
//! - **POST `/v1/downloads/admin/add-email`**: 201, or 409 if already listed
//! - **POST `/v1/downloads/admin/remove-email`**: 200 whether or not it was listed

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use confreg_core::{AllowList, FileType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, required, Validate};
use crate::routes::downloads::FileSummary;
use crate::services::downloads;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    /// `abstract-booklet` or `papers-book`.
    pub file_type: String,
    /// Name shown to downloaders; its extension picks the content type.
    pub file_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

impl Validate for EmailRequest {
    fn validate(&self) -> Result<(), String> {
        required(&self.email, "email").map(|_| ())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AllowListResponse {
    pub emails: Vec<String>,
    pub count: usize,
}

impl From<AllowList> for AllowListResponse {
    fn from(list: AllowList) -> Self {
        Self {
            count: list.emails.len(),
            emails: list.emails,
        }
    }
}

/// Build the admin router. Uploads may be up to `max_upload_bytes`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/downloads/admin/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/v1/downloads/admin/allowed-emails", get(allowed_emails))
        .route("/v1/downloads/admin/add-email", post(add_email))
        .route("/v1/downloads/admin/remove-email", post(remove_email))
}

/// POST /v1/downloads/admin/upload: Store a file, superseding the previous one of its type.
#[utoipa::path(
    post,
    path = "/v1/downloads/admin/upload",
    params(UploadParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "File stored", body = FileSummary),
        (status = 400, description = "Unknown file type or empty body", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 413, description = "File too large"),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn upload(
    State(state): State<AppState>,
    caller: CallerIdentity,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<FileSummary>), AppError> {
    require_role(&caller, Role::Admin)?;
    let params = extract_query(params)?;
    let file_type = FileType::parse(&params.file_type)?;
    let file = downloads::upload(&state, &caller.email, file_type, &params.file_name, &body).await?;
    Ok((StatusCode::CREATED, Json(file.into())))
}

/// GET /v1/downloads/admin/allowed-emails: The allow-list.
#[utoipa::path(
    get,
    path = "/v1/downloads/admin/allowed-emails",
    responses(
        (status = 200, description = "Allow-listed emails", body = AllowListResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn allowed_emails(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<AllowListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let emails = downloads::allowed_emails(&state);
    Ok(Json(AllowListResponse {
        count: emails.len(),
        emails,
    }))
}

/// POST /v1/downloads/admin/add-email: Allow an email to request codes.
#[utoipa::path(
    post,
    path = "/v1/downloads/admin/add-email",
    request_body = EmailRequest,
    responses(
        (status = 201, description = "Email added", body = AllowListResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorBody),
        (status = 409, description = "Already on the allow-list", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn add_email(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AllowListResponse>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let list = downloads::add_email(&state, &req.email).await?;
    Ok((StatusCode::CREATED, Json(list.into())))
}

/// POST /v1/downloads/admin/remove-email: Revoke an email. Idempotent.
#[utoipa::path(
    post,
    path = "/v1/downloads/admin/remove-email",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Email absent from the allow-list", body = AllowListResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn remove_email(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<AllowListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    Ok(Json(downloads::remove_email(&state, &req.email).await?.into()))
}
