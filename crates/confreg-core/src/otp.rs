//! # One-Time Codes
//!
//! Six-digit codes mailed to allow-listed addresses, and the download tokens
//! a successful verification yields.
//!
//! At most one code is outstanding per email: issuing a new one replaces the
//! previous record, so a stale code can never validate. Verification checks
//! run in a fixed order (expiry, reuse, code) so an expired record is always
//! reported as expired even when the code matches.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::OtpError;

/// Lifetime of an issued code.
pub const OTP_TTL_SECS: i64 = 600;

/// Lifetime of a download token.
pub const DOWNLOAD_TOKEN_TTL_SECS: i64 = 3600;

const DOWNLOAD_TOKEN_BYTES: usize = 32;

/// Constant-time string equality.
fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// An issued one-time code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// Record id.
    pub id: Uuid,
    /// Normalized email the code was sent to.
    pub email: String,
    /// Six-digit code.
    pub code: String,
    /// Exclusive end of the validity window.
    pub expires_at: DateTime<Utc>,
    /// Set once the code has been consumed.
    pub verified: bool,
    /// Inclusive start of the validity window.
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for OtpRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("code", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("verified", &self.verified)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl OtpRecord {
    /// Issue a fresh code for `email`, uniformly drawn from `[100000, 999999]`.
    pub fn issue(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        let code = rand::thread_rng().gen_range(100_000u32..=999_999);
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            code: code.to_string(),
            expires_at: now + Duration::seconds(OTP_TTL_SECS),
            verified: false,
            created_at: now,
        }
    }

    /// Whether the validity window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Consume the code.
    ///
    /// On [`OtpError::Expired`] the caller must discard the record.
    pub fn verify(&mut self, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        if self.is_expired(now) {
            return Err(OtpError::Expired);
        }
        if self.verified {
            return Err(OtpError::AlreadyUsed);
        }
        if !ct_eq(&self.code, code.trim()) {
            return Err(OtpError::Mismatch);
        }
        self.verified = true;
        Ok(())
    }
}

/// Short-lived bearer proof that `email` passed OTP verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadToken {
    /// 64 hex characters.
    pub token: String,
    /// Email the token is bound to.
    pub email: String,
    /// Exclusive end of validity.
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for DownloadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadToken")
            .field("token", &"[REDACTED]")
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl DownloadToken {
    /// Mint a token for `email` from 32 random bytes.
    pub fn issue(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; DOWNLOAD_TOKEN_BYTES];
        rand::thread_rng().fill(&mut bytes);
        Self {
            token: hex::encode(bytes),
            email: email.into(),
            expires_at: now + Duration::seconds(DOWNLOAD_TOKEN_TTL_SECS),
        }
    }

    /// Seconds of validity granted at issue.
    pub fn expires_in(&self) -> i64 {
        DOWNLOAD_TOKEN_TTL_SECS
    }

    /// Whether the token is still inside its window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `presented` matches this token for `email` at `now`.
    pub fn authorizes(&self, email: &str, presented: &str, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.email == email && ct_eq(&self.token, presented)
    }
}
