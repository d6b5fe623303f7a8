//! # Invitation Letter API
//!
//! Owner or admin on every route.
//!
//! - **GET `/v1/users/:uid/invitation`**: the saved request, 404 if none
//! - **PUT `/v1/users/:uid/invitation`**: create or replace
//! - **GET `/v1/users/:uid/invitation/abstract-title`**: title the letter cites

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use confreg_core::{InvitationDetails, InvitationRequest};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::services::invitations::{self, AbstractTitle};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users/:uid/invitation", get(get_invitation).put(save_invitation))
        .route("/v1/users/:uid/invitation/abstract-title", get(abstract_title))
}

/// GET /v1/users/:uid/invitation
#[utoipa::path(
    get,
    path = "/v1/users/{uid}/invitation",
    params(("uid" = Uuid, Path, description = "Registrant id")),
    responses(
        (status = 200, description = "Saved request"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "No request saved", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "invitations"
)]
async fn get_invitation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(uid): Path<Uuid>,
) -> Result<Json<InvitationRequest>, AppError> {
    Ok(Json(invitations::get(&state, &caller, uid)?))
}

/// PUT /v1/users/:uid/invitation: Save the passport and address details.
#[utoipa::path(
    put,
    path = "/v1/users/{uid}/invitation",
    params(("uid" = Uuid, Path, description = "Registrant id")),
    request_body(content = Object, description = "name, address, passport_number, passport_expiry, country, nationality, date_of_birth"),
    responses(
        (status = 200, description = "Request saved"),
        (status = 400, description = "Missing field or expired passport", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "invitations"
)]
async fn save_invitation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(uid): Path<Uuid>,
    body: Result<Json<InvitationDetails>, JsonRejection>,
) -> Result<Json<InvitationRequest>, AppError> {
    let details = extract_json(body)?;
    Ok(Json(invitations::save(&state, &caller, uid, details).await?))
}

/// GET /v1/users/:uid/invitation/abstract-title
#[utoipa::path(
    get,
    path = "/v1/users/{uid}/invitation/abstract-title",
    params(("uid" = Uuid, Path, description = "Registrant id")),
    responses(
        (status = 200, description = "Earliest abstract title, empty if none", body = AbstractTitle),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "invitations"
)]
async fn abstract_title(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(uid): Path<Uuid>,
) -> Result<Json<AbstractTitle>, AppError> {
    Ok(Json(invitations::abstract_title(&state, &caller, uid)?))
}
