//! Registration, login, profile maintenance and password reset.

use chrono::Utc;
use confreg_core::{
    normalize_email, NewRegistrant, OtpError, OtpRecord, PaymentRecord, ProfileUpdate, Registrant,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::auth::{self, CallerIdentity, Claims, Role, ADMIN_TOKEN_TTL_SECS, ATTENDEE_TOKEN_TTL_SECS};
use crate::effects::SideEffect;
use crate::error::AppError;
use crate::mailer::OutgoingMail;
use crate::sheets::SheetRow;
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "invalid email or password";

/// A bearer token handed out at login.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
    pub role: Role,
    /// Registrant id. Absent for admin sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

/// Create a registrant.
///
/// The email index entry is reserved under its write lock before anything
/// else is stored, so two concurrent sign-ups with one address cannot both
/// succeed.
pub async fn register(state: &AppState, signup: NewRegistrant) -> Result<Registrant, AppError> {
    signup.validate()?;
    let email = normalize_email(&signup.email)?;
    if state.user_emails.contains(&email) {
        return Err(AppError::Conflict(format!("email already registered: {email}")));
    }

    let password = Zeroizing::new(signup.password.clone());
    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))??;

    let uid = Uuid::new_v4();
    let registrant = Registrant::new(uid, &signup, password_hash, Utc::now())?;

    let reserved = state.user_emails.with_entry(&email, |slot| {
        if slot.is_some() {
            return false;
        }
        *slot = Some(uid);
        true
    });
    if !reserved {
        return Err(AppError::Conflict(format!("email already registered: {email}")));
    }
    state.users.insert(uid, registrant.clone());

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::insert(pool, &registrant).await {
            state.users.remove(&uid);
            state.user_emails.remove(&email);
            if crate::db::users::is_unique_violation(&e) {
                return Err(AppError::Conflict(format!("email already registered: {email}")));
            }
            tracing::error!(user_id = %uid, error = %e, "failed to persist registrant to database");
            return Err(AppError::database("registration could not be persisted", e));
        }
    }

    tracing::info!(user_id = %uid, email = %email, "registrant created");

    let event = &state.config.event_name;
    state.effects.enqueue(SideEffect::AppendRegistrationRow {
        email: email.clone(),
        row: SheetRow::registration(&registrant),
    });
    state
        .effects
        .enqueue(SideEffect::SendEmail(OutgoingMail::welcome(event, &registrant)));
    if let Some(admin) = &state.config.admin_notify_email {
        state.effects.enqueue(SideEffect::SendEmail(OutgoingMail::new_registration(
            event,
            admin,
            &registrant,
        )));
    }

    Ok(registrant)
}

async fn password_matches(password: &str, hash: String) -> Result<bool, AppError> {
    let password = Zeroizing::new(password.to_string());
    tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))
}

fn jwt_secret(state: &AppState) -> Result<&str, AppError> {
    state
        .config
        .jwt_secret
        .as_ref()
        .map(|s| s.as_str())
        .ok_or_else(|| AppError::ServiceUnavailable("token issuance is not configured".into()))
}

/// Exchange a registrant's credentials for a bearer token.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<Session, AppError> {
    let secret = jwt_secret(state)?;
    let email = normalize_email(email).map_err(|_| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;
    let registrant = state
        .find_user_by_email(&email)
        .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;

    if !password_matches(password, registrant.password_hash.clone()).await? {
        tracing::warn!(email = %email, "login rejected");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let token = auth::issue_token(secret, &Claims::attendee(registrant.uid, &email))?;
    Ok(Session {
        token,
        token_type: "Bearer".into(),
        expires_in: ATTENDEE_TOKEN_TTL_SECS,
        role: Role::Attendee,
        user_id: Some(registrant.uid),
    })
}

/// Exchange the configured admin credentials for an admin token.
pub async fn admin_login(state: &AppState, email: &str, password: &str) -> Result<Session, AppError> {
    let secret = jwt_secret(state)?;
    let admin = state
        .config
        .admin
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("admin login is not configured".into()))?;

    let email = normalize_email(email).map_err(|_| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;
    let email_matches = email == admin.email.trim().to_lowercase();
    // Always verified: response time must not depend on whether the email matched.
    let password_ok = password_matches(password, admin.password_hash.clone()).await?;
    if !(email_matches && password_ok) {
        tracing::warn!(email = %email, "admin login rejected");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let token = auth::issue_token(secret, &Claims::admin(&email))?;
    tracing::info!(email = %email, "admin session issued");
    Ok(Session {
        token,
        token_type: "Bearer".into(),
        expires_in: ADMIN_TOKEN_TTL_SECS,
        role: Role::Admin,
        user_id: None,
    })
}

fn ensure_access(caller: &CallerIdentity, uid: Uuid) -> Result<(), AppError> {
    if caller.can_access_user(uid) {
        Ok(())
    } else {
        Err(AppError::Forbidden("cannot access another registrant".into()))
    }
}

pub fn get(state: &AppState, caller: &CallerIdentity, uid: Uuid) -> Result<Registrant, AppError> {
    ensure_access(caller, uid)?;
    state
        .users
        .get(&uid)
        .ok_or_else(|| AppError::NotFound(format!("registrant {uid} not found")))
}

/// All registrants, oldest first.
pub fn list(state: &AppState) -> Vec<Registrant> {
    let mut users = state.users.list();
    users.sort_by_key(|u| u.created_at);
    users
}

pub fn payments(
    state: &AppState,
    caller: &CallerIdentity,
    uid: Uuid,
) -> Result<Vec<PaymentRecord>, AppError> {
    Ok(get(state, caller, uid)?.payments.records().to_vec())
}

/// Apply a whitelisted profile edit.
pub async fn update_profile(
    state: &AppState,
    caller: &CallerIdentity,
    uid: Uuid,
    update: ProfileUpdate,
) -> Result<Registrant, AppError> {
    ensure_access(caller, uid)?;
    update.validate()?;
    if update.is_empty() {
        return Err(AppError::Validation("no updatable fields supplied".into()));
    }

    let now = Utc::now();
    let Some(pool) = &state.db_pool else {
        let updated = state
            .users
            .update(&uid, |r| update.apply(r, now))
            .ok_or_else(|| AppError::NotFound(format!("registrant {uid} not found")))?;
        tracing::info!(user_id = %uid, "profile updated");
        return Ok(updated);
    };

    let mut updated = state
        .users
        .get(&uid)
        .ok_or_else(|| AppError::NotFound(format!("registrant {uid} not found")))?;
    update.apply(&mut updated, now);
    if let Err(e) = crate::db::users::update(pool, &updated).await {
        tracing::error!(user_id = %uid, error = %e, "failed to persist profile update to database");
        return Err(AppError::database("profile update could not be persisted", e));
    }
    // Payments recorded since the snapshot must survive.
    let updated = state
        .users
        .update(&uid, |r| update.apply(r, now))
        .ok_or_else(|| AppError::NotFound(format!("registrant {uid} not found")))?;

    tracing::info!(user_id = %uid, "profile updated");
    Ok(updated)
}

/// Whether `email` belongs to a registrant.
pub fn email_registered(state: &AppState, email: &str) -> Result<bool, AppError> {
    let email = normalize_email(email)?;
    Ok(state.user_emails.contains(&email))
}

/// Mail a reset code to `email` if it belongs to a registrant.
///
/// The outcome does not reveal whether the address is registered: the
/// per-address budget is charged first and the mail is queued.
pub fn request_password_reset(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = normalize_email(email)?;
    let limit = state.otp_limiter.config().max_otp_requests;
    if !state.otp_limiter.check(&format!("reset-email:{email}"), limit) {
        tracing::warn!(email = %email, "password reset budget exhausted for address");
        return Err(AppError::RateLimited("too many reset codes requested for this email".into()));
    }
    if !state.user_emails.contains(&email) {
        tracing::debug!(email = %email, "password reset for unknown address ignored");
        return Ok(());
    }

    let record = OtpRecord::issue(email.clone(), Utc::now());
    let mail = OutgoingMail::password_reset(&state.config.event_name, &email, &record.code);
    state.password_resets.insert(email.clone(), record);
    state.effects.enqueue(SideEffect::SendEmail(mail));
    tracing::info!(email = %email, "password reset code issued");
    Ok(())
}

/// Set a new password with a reset code. The code is spent on success.
pub async fn confirm_password_reset(
    state: &AppState,
    email: &str,
    code: &str,
    new_password: &str,
) -> Result<(), AppError> {
    NewRegistrant::validate_password(new_password)?;
    let email = normalize_email(email)?;
    let now = Utc::now();
    let verified = state.password_resets.with_entry(&email, |slot| {
        let record = slot.as_mut().ok_or(OtpError::NotFound)?;
        let result = record.verify(code, now);
        if result.is_ok() || result == Err(OtpError::Expired) {
            *slot = None;
        }
        result
    });
    if let Err(e) = verified {
        tracing::warn!(email = %email, reason = %e, "password reset code rejected");
        return Err(e.into());
    }

    let uid = state
        .user_emails
        .get(&email)
        .ok_or_else(|| AppError::NotFound(format!("registrant {email} not found")))?;
    let password = Zeroizing::new(new_password.to_string());
    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))??;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::update_password(pool, uid, &password_hash, now).await {
            tracing::error!(user_id = %uid, error = %e, "failed to persist password reset to database");
            return Err(AppError::database("password could not be persisted", e));
        }
    }
    state
        .users
        .update(&uid, |r| {
            r.password_hash = password_hash;
            r.updated_at = now;
        })
        .ok_or_else(|| AppError::NotFound(format!("registrant {uid} not found")))?;

    tracing::info!(user_id = %uid, "password reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::time::Duration;

    fn signup(email: &str) -> NewRegistrant {
        serde_json::from_value(serde_json::json!({
            "email": email,
            "password": "correct horse battery",
            "phone": "99999",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "country": "India",
            "affiliation": "IISc"
        }))
        .unwrap()
    }

    fn state_with_secret() -> AppState {
        let config = AppConfig {
            jwt_secret: Some(Zeroizing::new("s3cret".into())),
            admin_notify_email: Some("office@conf.example".into()),
            ..AppConfig::default()
        };
        AppState::with_config(config).unwrap()
    }

    fn attendee(uid: Uuid) -> CallerIdentity {
        CallerIdentity {
            role: Role::Attendee,
            user_id: Some(uid),
            email: "ada@x.org".into(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let state = state_with_secret();
        let registrant = register(&state, signup(" Ada@X.org ")).await.unwrap();
        assert_eq!(registrant.email, "ada@x.org");
        assert_ne!(registrant.password_hash, "correct horse battery");

        let session = login(&state, "ada@x.org", "correct horse battery").await.unwrap();
        assert_eq!(session.user_id, Some(registrant.uid));
        let caller = auth::decode_token("s3cret", &session.token).unwrap();
        assert_eq!(caller.user_id, Some(registrant.uid));

        let err = login(&state, "ada@x.org", "wrong password").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let state = state_with_secret();
        register(&state, signup("ada@x.org")).await.unwrap();
        let err = register(&state, signup("ADA@x.org")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.users.len(), 1);
    }

    #[tokio::test]
    async fn registration_queues_welcome_and_admin_notice() {
        let state = state_with_secret();
        register(&state, signup("ada@x.org")).await.unwrap();

        let mut sent = Vec::new();
        for _ in 0..100 {
            sent = state.mailer.sent();
            if sent.len() == 2 && !state.sheets.rows().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let recipients: Vec<_> = sent.iter().map(|m| m.to.as_str()).collect();
        assert!(recipients.contains(&"ada@x.org"));
        assert!(recipients.contains(&"office@conf.example"));
        assert_eq!(state.sheets.rows().len(), 1);
    }

    #[tokio::test]
    async fn login_without_secret_is_unavailable() {
        let state = AppState::new();
        let err = login(&state, "ada@x.org", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn profile_update_is_scoped_to_owner() {
        let state = state_with_secret();
        let registrant = register(&state, signup("ada@x.org")).await.unwrap();

        let update = ProfileUpdate {
            dietary_preference: Some("Other".into()),
            other_dietary_preference: Some("Jain".into()),
            ..ProfileUpdate::default()
        };
        let updated = update_profile(&state, &attendee(registrant.uid), registrant.uid, update.clone())
            .await
            .unwrap();
        assert_eq!(updated.dietary_preference.as_deref(), Some("Jain"));

        let stranger = attendee(Uuid::new_v4());
        let err = update_profile(&state, &stranger, registrant.uid, update)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = update_profile(
            &state,
            &attendee(registrant.uid),
            registrant.uid,
            ProfileUpdate::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    fn reset_code(state: &AppState) -> Option<String> {
        state.password_resets.get(&"ada@x.org".to_string()).map(|r| r.code)
    }

    #[tokio::test]
    async fn password_reset_sets_new_password_once() {
        let state = state_with_secret();
        register(&state, signup("ada@x.org")).await.unwrap();

        request_password_reset(&state, "stranger@x.org").unwrap();
        assert!(state.password_resets.is_empty());

        request_password_reset(&state, "ADA@x.org").unwrap();
        let code = reset_code(&state).unwrap();
        let err = confirm_password_reset(&state, "ada@x.org", "000000", "brand new password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        confirm_password_reset(&state, "ada@x.org", &code, "brand new password")
            .await
            .unwrap();
        assert!(login(&state, "ada@x.org", "brand new password").await.is_ok());
        assert!(login(&state, "ada@x.org", "correct horse battery").await.is_err());

        let reused = confirm_password_reset(&state, "ada@x.org", &code, "another password")
            .await
            .unwrap_err();
        assert!(matches!(reused, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn password_reset_enforces_password_rules() {
        let state = state_with_secret();
        register(&state, signup("ada@x.org")).await.unwrap();
        request_password_reset(&state, "ada@x.org").unwrap();
        let code = reset_code(&state).unwrap();

        let err = confirm_password_reset(&state, "ada@x.org", &code, "short").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(reset_code(&state).is_some());
    }

    #[tokio::test]
    async fn email_lookup_normalizes() {
        let state = state_with_secret();
        register(&state, signup("ada@x.org")).await.unwrap();
        assert!(email_registered(&state, " ADA@x.org").unwrap());
        assert!(!email_registered(&state, "bob@x.org").unwrap());
        assert!(email_registered(&state, "not-an-email").is_err());
    }

    #[tokio::test]
    async fn failed_profile_persist_leaves_profile_unchanged() {
        let state = state_with_secret();
        let registrant = register(&state, signup("ada@x.org")).await.unwrap();
        let state = state.with_db_pool(Some(crate::db::unreachable_pool()));

        let update = ProfileUpdate {
            phone: Some("12345".into()),
            ..ProfileUpdate::default()
        };
        let err = update_profile(&state, &attendee(registrant.uid), registrant.uid, update)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(state.users.get(&registrant.uid).unwrap().phone, "99999");
    }
}
