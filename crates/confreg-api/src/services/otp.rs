//! # One-Time Codes
//!
//! Codes gate the downloads. Issue is fail-closed: an address that is not on
//! the allow-list never gets a record and never gets mail. There is at most
//! one outstanding code per address; issuing a new one replaces the old, so
//! a stale code cannot verify.
//!
//! A successful verification mints a [`DownloadToken`] bound to the address.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use confreg_core::{normalize_email, DownloadToken, OtpError, OtpRecord};
use serde::Serialize;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::mailer::OutgoingMail;
use crate::services::downloads::ensure_allowed;
use crate::services::payments::prune_orders;
use crate::state::AppState;

/// How often expired codes, tokens and stale orders are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How long a swept code is still reported as expired rather than unknown.
pub const EXPIRED_CODE_MEMORY_SECS: i64 = 24 * 3600;

/// Returned on successful verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifiedOtp {
    /// Present with `email` when downloading.
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

/// Issue a code to `email` and mail it.
///
/// The mail is sent before returning. If delivery fails the code is withdrawn
/// so the caller can retry cleanly.
pub async fn request_otp(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = ensure_allowed(state, email)?;
    let limit = state.otp_limiter.config().max_otp_requests;
    if !state.otp_limiter.check(&format!("otp-email:{email}"), limit) {
        tracing::warn!(email = %email, "OTP issuance budget exhausted for address");
        return Err(AppError::RateLimited("too many codes requested for this email".into()));
    }

    let record = OtpRecord::issue(email.clone(), Utc::now());
    let record_id = record.id;
    let code = record.code.clone();
    if state.otps.insert(email.clone(), record).is_some() {
        tracing::debug!(email = %email, "previous code replaced");
    }
    state.expired_otps.remove(&email);

    let mail = OutgoingMail::otp(&state.config.event_name, &email, &code);
    if let Err(e) = state.mailer.send(mail).await {
        state.otps.with_entry(&email, |slot| {
            if slot.as_ref().is_some_and(|r| r.id == record_id) {
                *slot = None;
            }
        });
        tracing::error!(email = %email, error = %e, "OTP mail could not be delivered");
        return Err(AppError::upstream("OTP mail delivery failed", e));
    }

    tracing::info!(email = %email, "OTP issued");
    Ok(())
}

/// Check `code` for `email` and mint a download token on success.
///
/// The allow-list is re-checked: removal revokes codes already issued.
pub async fn verify_otp(state: &AppState, email: &str, code: &str) -> Result<VerifiedOtp, AppError> {
    let email = ensure_allowed(state, email)?;
    let now = Utc::now();

    let result = state.otps.with_entry(&email, |slot| {
        let Some(record) = slot.as_mut() else {
            if state.expired_otps.contains(&email) {
                return Err(OtpError::Expired);
            }
            return Err(OtpError::NotFound);
        };
        let verified = record.verify(code, now);
        if verified == Err(OtpError::Expired) {
            state.expired_otps.insert(email.clone(), record.expires_at);
            *slot = None;
        }
        verified
    });

    if let Err(e) = result {
        tracing::warn!(email = %email, reason = %e, "OTP verification failed");
        return Err(e.into());
    }

    let token = DownloadToken::issue(email.clone(), now);
    let verified = VerifiedOtp {
        token: token.token.clone(),
        expires_in: token.expires_in(),
    };
    state.download_tokens.insert(token.token.clone(), token);
    tracing::info!(email = %email, "OTP verified, download token issued");
    Ok(verified)
}

/// Drop expired codes (download and password-reset) and tokens. Returns how
/// many codes and how many tokens were removed.
///
/// Each dropped code leaves a marker so a late verification still reads as
/// expired. Markers older than [`EXPIRED_CODE_MEMORY_SECS`] are forgotten.
pub fn sweep_expired(state: &AppState, now: DateTime<Utc>) -> (usize, usize) {
    let mut swept = Vec::new();
    let codes = state.otps.retain(|email, r| {
        let expired = r.is_expired(now);
        if expired {
            swept.push((email.clone(), r.expires_at));
        }
        !expired
    });
    for (email, expired_at) in swept {
        state.expired_otps.insert(email, expired_at);
    }
    let memory = ChronoDuration::seconds(EXPIRED_CODE_MEMORY_SECS);
    state.expired_otps.retain(|_, expired_at| now - *expired_at < memory);

    let resets = state.password_resets.retain(|_, r| !r.is_expired(now));
    let tokens = state.download_tokens.retain(|_, t| !t.is_expired(now));
    (codes + resets, tokens)
}

/// Run [`sweep_expired`] and [`prune_orders`] every `interval` until the
/// runtime shuts down.
pub fn spawn_sweeper(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let (codes, tokens) = sweep_expired(&state, Utc::now());
            if codes + tokens > 0 {
                tracing::debug!(codes, tokens, "expired codes and tokens swept");
            }
            prune_orders(&state, Utc::now());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use confreg_core::OTP_TTL_SECS;

    async fn state_with(email: &str) -> AppState {
        let state = AppState::new();
        crate::services::downloads::add_email(&state, email).await.unwrap();
        state
    }

    fn last_code(state: &AppState) -> String {
        let mail = state.mailer.sent().pop().unwrap();
        mail.body
            .split_whitespace()
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn unlisted_email_gets_nothing() {
        let state = AppState::new();
        let err = request_otp(&state, "stranger@x.org").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(state.otps.is_empty());
        assert!(state.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn code_verifies_once() {
        let state = state_with("ada@x.org").await;
        request_otp(&state, "Ada@X.org").await.unwrap();
        let code = last_code(&state);

        let ok = verify_otp(&state, "ada@x.org", &code).await.unwrap();
        assert_eq!(ok.token.len(), 64);
        assert_eq!(ok.expires_in, 3600);
        assert!(state.download_tokens.contains(&ok.token));

        let err = verify_otp(&state, "ada@x.org", &code).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("already been used")));
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let state = state_with("ada@x.org").await;
        request_otp(&state, "ada@x.org").await.unwrap();
        let first = last_code(&state);
        request_otp(&state, "ada@x.org").await.unwrap();
        let second = last_code(&state);
        assert_eq!(state.otps.len(), 1);

        if first != second {
            assert!(verify_otp(&state, "ada@x.org", &first).await.is_err());
        }
        assert!(verify_otp(&state, "ada@x.org", &second).await.is_ok());
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_discarded() {
        let state = state_with("ada@x.org").await;
        request_otp(&state, "ada@x.org").await.unwrap();
        let code = last_code(&state);
        state.otps.update(&"ada@x.org".to_string(), |r| {
            r.expires_at = Utc::now() - ChronoDuration::seconds(1);
        });

        let err = verify_otp(&state, "ada@x.org", &code).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("expired")));
        assert!(state.otps.is_empty());
    }

    #[tokio::test]
    async fn missing_code_is_not_found() {
        let state = state_with("ada@x.org").await;
        let err = verify_otp(&state, "ada@x.org", "123456").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn removal_from_allow_list_revokes_codes() {
        let state = state_with("ada@x.org").await;
        request_otp(&state, "ada@x.org").await.unwrap();
        let code = last_code(&state);
        crate::services::downloads::remove_email(&state, "ada@x.org").await.unwrap();
        let err = verify_otp(&state, "ada@x.org", &code).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn sweep_drops_expired_entries() {
        let state = state_with("ada@x.org").await;
        request_otp(&state, "ada@x.org").await.unwrap();
        let later = Utc::now() + ChronoDuration::seconds(OTP_TTL_SECS + 1);
        assert_eq!(sweep_expired(&state, later), (1, 0));
        assert!(state.otps.is_empty());
        assert!(state.expired_otps.contains(&"ada@x.org".to_string()));

        let forgotten = later + ChronoDuration::seconds(EXPIRED_CODE_MEMORY_SECS);
        sweep_expired(&state, forgotten);
        assert!(state.expired_otps.is_empty());
    }

    #[tokio::test]
    async fn swept_code_still_reads_as_expired() {
        let state = state_with("ada@x.org").await;
        request_otp(&state, "ada@x.org").await.unwrap();
        let code = last_code(&state);
        state.otps.update(&"ada@x.org".to_string(), |r| {
            r.expires_at = Utc::now() - ChronoDuration::seconds(1);
        });
        assert_eq!(sweep_expired(&state, Utc::now()), (1, 0));

        let err = verify_otp(&state, "ada@x.org", &code).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("expired")));

        // A fresh code clears the marker.
        request_otp(&state, "ada@x.org").await.unwrap();
        assert!(state.expired_otps.is_empty());
        let fresh = last_code(&state);
        assert!(verify_otp(&state, "ada@x.org", &fresh).await.is_ok());
    }

    #[tokio::test]
    async fn issuance_is_budgeted_per_address() {
        let state = state_with("ada@x.org").await;
        crate::services::downloads::add_email(&state, "bob@x.org").await.unwrap();
        let limit = state.otp_limiter.config().max_otp_requests;
        for _ in 0..limit {
            request_otp(&state, "ada@x.org").await.unwrap();
        }
        let err = request_otp(&state, " ADA@x.org ").await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited(_)));
        assert_eq!(state.mailer.sent().len() as u64, limit);

        request_otp(&state, "bob@x.org").await.unwrap();
    }
}
