//! # Invitation Letters
//!
//! One invitation request per registrant, holding the travel-document
//! details an invitation letter needs. Saving again replaces the details.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::registrant::{bounded, required};

/// A registrant's invitation request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRequest {
    /// Registrant the letter is for.
    pub user_id: Uuid,
    /// Name as printed in the passport.
    pub name: String,
    /// Postal address for the letter.
    pub address: String,
    /// Passport number.
    pub passport_number: String,
    /// Passport expiry.
    pub passport_expiry: Option<NaiveDate>,
    /// Issuing country.
    pub country: String,
    /// Nationality, when different from the issuing country.
    pub nationality: Option<String>,
    /// Date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// First save.
    pub created_at: DateTime<Utc>,
    /// Last save.
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for InvitationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvitationRequest")
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("passport_number", &"[REDACTED]")
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

impl InvitationRequest {
    /// Create or replace the request for `user_id`, keeping the original
    /// creation time.
    pub fn upsert(
        existing: Option<&InvitationRequest>,
        user_id: Uuid,
        details: &InvitationDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            name: details.name.trim().to_string(),
            address: details.address.trim().to_string(),
            passport_number: details.passport_number.trim().to_string(),
            passport_expiry: details.passport_expiry,
            country: details.country.trim().to_string(),
            nationality: details
                .nationality
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            date_of_birth: details.date_of_birth,
            created_at: existing.map_or(now, |e| e.created_at),
            updated_at: now,
        }
    }
}

/// Client-supplied invitation details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvitationDetails {
    /// Name as printed in the passport.
    pub name: String,
    /// Postal address.
    pub address: String,
    /// Passport number.
    pub passport_number: String,
    /// Passport expiry, `YYYY-MM-DD`.
    #[serde(default)]
    pub passport_expiry: Option<NaiveDate>,
    /// Issuing country.
    pub country: String,
    /// Nationality.
    #[serde(default)]
    pub nationality: Option<String>,
    /// Date of birth, `YYYY-MM-DD`.
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

impl std::fmt::Debug for InvitationDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvitationDetails")
            .field("name", &self.name)
            .field("passport_number", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl InvitationDetails {
    /// Require identity fields; the birth date must precede `today` and
    /// the passport must not be expired on `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        required(&self.name, "name")?;
        required(&self.address, "address")?;
        required(&self.passport_number, "passport_number")?;
        required(&self.country, "country")?;
        if let Some(nationality) = &self.nationality {
            bounded(nationality, "nationality")?;
        }
        if let Some(expiry) = self.passport_expiry {
            if expiry < today {
                return Err(ValidationError::InvalidValue {
                    field: "passport_expiry",
                    value: expiry.to_string(),
                });
            }
        }
        if let Some(dob) = self.date_of_birth {
            if dob >= today {
                return Err(ValidationError::InvalidValue {
                    field: "date_of_birth",
                    value: dob.to_string(),
                });
            }
        }
        Ok(())
    }
}
