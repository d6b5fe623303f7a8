//! Invitation-letter requests, one per registrant.

use chrono::Utc;
use confreg_core::{InvitationDetails, InvitationRequest};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

fn ensure_access(caller: &CallerIdentity, uid: Uuid) -> Result<(), AppError> {
    if caller.can_access_user(uid) {
        Ok(())
    } else {
        Err(AppError::Forbidden("cannot access another registrant's invitation".into()))
    }
}

pub fn get(state: &AppState, caller: &CallerIdentity, uid: Uuid) -> Result<InvitationRequest, AppError> {
    ensure_access(caller, uid)?;
    state
        .invitations
        .get(&uid)
        .ok_or_else(|| AppError::NotFound(format!("no invitation request for {uid}")))
}

/// Create or replace the request for `uid`.
pub async fn save(
    state: &AppState,
    caller: &CallerIdentity,
    uid: Uuid,
    details: InvitationDetails,
) -> Result<InvitationRequest, AppError> {
    ensure_access(caller, uid)?;
    let now = Utc::now();
    details.validate(now.date_naive())?;
    if !state.users.contains(&uid) {
        return Err(AppError::NotFound(format!("registrant {uid} not found")));
    }

    let existing = state.invitations.get(&uid);
    let request = InvitationRequest::upsert(existing.as_ref(), uid, &details, now);
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::invitations::upsert(pool, &request).await {
            tracing::error!(user_id = %uid, error = %e, "failed to persist invitation request to database");
            return Err(AppError::database("invitation request could not be persisted", e));
        }
    }
    state.invitations.insert(uid, request.clone());

    tracing::info!(user_id = %uid, replaced = existing.is_some(), "invitation request saved");
    Ok(request)
}

/// Title an invitation letter cites.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AbstractTitle {
    /// Empty when the registrant has not submitted an abstract.
    pub title: String,
}

/// The registrant's earliest abstract title, for the letter.
pub fn abstract_title(state: &AppState, caller: &CallerIdentity, uid: Uuid) -> Result<AbstractTitle, AppError> {
    ensure_access(caller, uid)?;
    let title = crate::services::abstracts::first_title(state, uid).unwrap_or_default();
    Ok(AbstractTitle { title })
}
