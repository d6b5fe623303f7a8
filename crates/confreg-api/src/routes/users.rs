//! # Registrant API
//!
//! Public:
//! - **POST `/v1/users/register`**: create a registrant
//! - **POST `/v1/users/login`**: registrant bearer token
//! - **POST `/v1/admin/login`**: admin bearer token
//! - **POST `/v1/users/check-email`**: whether an email is registered
//! - **POST `/v1/users/password-reset/request`**: mail a reset code
//! - **POST `/v1/users/password-reset/confirm`**: set a new password with the code
//!
//! Authenticated:
//! - **GET `/v1/users`**: all registrants (admin)
//! - **GET `/v1/users/:uid`**: one registrant (owner or admin)
//! - **PATCH `/v1/users/:uid`**: whitelisted profile edit (owner or admin)
//! - **GET `/v1/users/:uid/payments`**: the payment ledger (owner or admin)

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use confreg_core::{NewRegistrant, PaymentRecord, ProfileUpdate, Registrant};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, required, Validate};
use crate::routes::downloads::{MessageResponse, OtpRequest};
use crate::services::users::{self, Session};
use crate::state::AppState;

/// Credentials for either login endpoint.
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        required(&self.email, "email")?;
        if self.password.is_empty() {
            return Err("password must not be empty".to_string());
        }
        Ok(())
    }
}

/// A reset code and the password it unlocks.
#[derive(Deserialize, ToSchema)]
pub struct PasswordResetConfirmation {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

impl std::fmt::Debug for PasswordResetConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordResetConfirmation")
            .field("email", &self.email)
            .field("otp", &"[REDACTED]")
            .field("new_password", &"[REDACTED]")
            .finish()
    }
}

impl Validate for PasswordResetConfirmation {
    fn validate(&self) -> Result<(), String> {
        required(&self.email, "email")?;
        required(&self.otp, "otp")?;
        if self.new_password.is_empty() {
            return Err("new_password must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmailCheck {
    pub registered: bool,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/v1/users/register", post(register))
        .route("/v1/users/login", post(login))
        .route("/v1/admin/login", post(admin_login))
        .route("/v1/users/check-email", post(check_email))
        .route("/v1/users/password-reset/request", post(request_password_reset))
        .route("/v1/users/password-reset/confirm", post(confirm_password_reset))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", get(list_users))
        .route("/v1/users/:uid", get(get_user).patch(update_user))
        .route("/v1/users/:uid/payments", get(list_payments))
}

/// POST /v1/users/register: Create a registrant.
#[utoipa::path(
    post,
    path = "/v1/users/register",
    request_body(content = Object, description = "Sign-up fields: email, password, phone, names, country, affiliation"),
    responses(
        (status = 201, description = "Registrant created"),
        (status = 400, description = "Missing or invalid field", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn register(
    State(state): State<AppState>,
    body: Result<Json<NewRegistrant>, JsonRejection>,
) -> Result<(StatusCode, Json<Registrant>), AppError> {
    let signup = extract_json(body)?;
    let registrant = users::register(&state, signup).await?;
    Ok((StatusCode::CREATED, Json(registrant)))
}

/// POST /v1/users/login: Exchange registrant credentials for a token.
#[utoipa::path(
    post,
    path = "/v1/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = Session),
        (status = 401, description = "Invalid email or password", body = crate::error::ErrorBody),
        (status = 503, description = "Token issuance not configured", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Session>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(users::login(&state, &req.email, &req.password).await?))
}

/// POST /v1/admin/login: Exchange the configured admin credentials for a token.
#[utoipa::path(
    post,
    path = "/v1/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Admin session issued", body = Session),
        (status = 401, description = "Invalid email or password", body = crate::error::ErrorBody),
        (status = 503, description = "Admin login not configured", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn admin_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Session>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(users::admin_login(&state, &req.email, &req.password).await?))
}

/// POST /v1/users/check-email: Whether the email belongs to a registrant.
#[utoipa::path(
    post,
    path = "/v1/users/check-email",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Lookup result", body = EmailCheck),
        (status = 400, description = "Invalid email", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn check_email(
    State(state): State<AppState>,
    body: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<EmailCheck>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(EmailCheck {
        registered: users::email_registered(&state, &req.email)?,
    }))
}

/// POST /v1/users/password-reset/request: Mail a reset code.
///
/// Answers the same whether or not the email is registered.
#[utoipa::path(
    post,
    path = "/v1/users/password-reset/request",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Code sent if the email is registered", body = MessageResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorBody),
        (status = 429, description = "Too many codes requested", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn request_password_reset(
    State(state): State<AppState>,
    body: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = extract_validated_json(body)?;
    users::request_password_reset(&state, &req.email)?;
    Ok(Json(MessageResponse {
        message: "If the email is registered, a reset code has been sent".to_string(),
    }))
}

/// POST /v1/users/password-reset/confirm: Spend a reset code on a new password.
#[utoipa::path(
    post,
    path = "/v1/users/password-reset/confirm",
    request_body = PasswordResetConfirmation,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid, expired or used code, or weak password", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn confirm_password_reset(
    State(state): State<AppState>,
    body: Result<Json<PasswordResetConfirmation>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = extract_validated_json(body)?;
    users::confirm_password_reset(&state, &req.email, &req.otp, &req.new_password).await?;
    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// GET /v1/users: All registrants, oldest first.
#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "Registrant list"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<Registrant>>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(users::list(&state)))
}

/// GET /v1/users/:uid: One registrant.
#[utoipa::path(
    get,
    path = "/v1/users/{uid}",
    params(("uid" = Uuid, Path, description = "Registrant id")),
    responses(
        (status = 200, description = "Registrant found"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Registrant not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
async fn get_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(uid): Path<Uuid>,
) -> Result<Json<Registrant>, AppError> {
    Ok(Json(users::get(&state, &caller, uid)?))
}

/// PATCH /v1/users/:uid: Whitelisted profile edit.
///
/// Unknown keys, including `payments`, are rejected with 400.
#[utoipa::path(
    patch,
    path = "/v1/users/{uid}",
    params(("uid" = Uuid, Path, description = "Registrant id")),
    request_body(content = Object, description = "Editable profile fields only"),
    responses(
        (status = 200, description = "Updated registrant"),
        (status = 400, description = "Unknown or invalid field", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Registrant not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
async fn update_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(uid): Path<Uuid>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<Registrant>, AppError> {
    let update = extract_json(body)?;
    Ok(Json(users::update_profile(&state, &caller, uid, update).await?))
}

/// GET /v1/users/:uid/payments: The registrant's ledger, in recording order.
#[utoipa::path(
    get,
    path = "/v1/users/{uid}/payments",
    params(("uid" = Uuid, Path, description = "Registrant id")),
    responses(
        (status = 200, description = "Payment ledger"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Registrant not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
async fn list_payments(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(uid): Path<Uuid>,
) -> Result<Json<Vec<PaymentRecord>>, AppError> {
    Ok(Json(users::payments(&state, &caller, uid)?))
}
