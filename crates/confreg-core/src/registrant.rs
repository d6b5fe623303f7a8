//! # Registrants
//!
//! The registrant aggregate owns the profile and the payment ledger. Profile
//! edits go through [`ProfileUpdate`], an explicit whitelist: fields outside
//! it (payments, category summary, credentials, identifiers) cannot be set
//! by a client, and unknown keys are rejected at deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allowlist::normalize_email;
use crate::error::ValidationError;
use crate::fee::FeeLine;
use crate::payment::{PaymentLedger, PaymentRecord, RecordOutcome};

const MAX_TEXT_LEN: usize = 500;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_ACCOMPANYING: usize = 10;

/// Dietary preference value that defers to a free-text alternative.
pub const OTHER_DIETARY_PREFERENCE: &str = "Other";

pub(crate) fn required(value: &str, field: &'static str) -> Result<(), ValidationError> {
    required_within(value, field, MAX_TEXT_LEN)
}

pub(crate) fn bounded(value: &str, field: &'static str) -> Result<(), ValidationError> {
    bounded_within(value, field, MAX_TEXT_LEN)
}

pub(crate) fn required_within(
    value: &str,
    field: &'static str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    bounded_within(value, field, max)
}

pub(crate) fn bounded_within(
    value: &str,
    field: &'static str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// A person attending alongside the registrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccompanyingPerson {
    /// Given name.
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// Relation to the registrant.
    #[serde(default)]
    pub relation: String,
    /// Dietary preference.
    #[serde(default)]
    pub dietary_preference: String,
    /// Citizenship.
    #[serde(default)]
    pub citizenship: String,
}

impl AccompanyingPerson {
    fn validate(&self) -> Result<(), ValidationError> {
        required(&self.first_name, "accompanying_persons.first_name")?;
        bounded(&self.last_name, "accompanying_persons.last_name")?;
        bounded(&self.relation, "accompanying_persons.relation")?;
        bounded(&self.dietary_preference, "accompanying_persons.dietary_preference")?;
        bounded(&self.citizenship, "accompanying_persons.citizenship")
    }
}

/// A registered conference participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    /// Stable identifier.
    pub uid: Uuid,
    /// Normalized email, unique across registrants.
    pub email: String,
    /// Password hash in PHC string format. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Phone number.
    pub phone: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: Option<String>,
    /// Full display name.
    pub full_name: String,
    /// Country of residence.
    pub country: String,
    /// Institution.
    pub affiliation: String,
    /// Honorific.
    pub title: Option<String>,
    /// Self-declared registrant category.
    pub category1: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Postal code.
    pub zipcode: Option<String>,
    /// Dietary preference.
    pub dietary_preference: Option<String>,
    /// People attending with the registrant.
    #[serde(default)]
    pub accompanying_persons: Vec<AccompanyingPerson>,
    /// Category summary of the most recent accepted payment.
    pub selected_category: Option<String>,
    /// Fee breakdown of the most recent accepted payment.
    #[serde(default)]
    pub selected_category_details: Vec<FeeLine>,
    /// Payment ledger.
    #[serde(default)]
    pub payments: PaymentLedger,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl Registrant {
    /// Build a registrant from a validated sign-up.
    pub fn new(
        uid: Uuid,
        signup: &NewRegistrant,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let email = normalize_email(&signup.email)?;
        let family_name = signup
            .family_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let full_name = match signup.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match &family_name {
                Some(family) => format!("{} {family}", signup.given_name.trim()),
                None => signup.given_name.trim().to_string(),
            },
        };
        Ok(Self {
            uid,
            email,
            password_hash,
            phone: signup.phone.trim().to_string(),
            given_name: signup.given_name.trim().to_string(),
            family_name,
            full_name,
            country: signup.country.trim().to_string(),
            affiliation: signup.affiliation.trim().to_string(),
            title: None,
            category1: None,
            address: None,
            zipcode: None,
            dietary_preference: None,
            accompanying_persons: Vec::new(),
            selected_category: None,
            selected_category_details: Vec::new(),
            payments: PaymentLedger::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Append a payment and refresh the category summary, as one step.
    ///
    /// A duplicate payment id leaves the registrant untouched.
    pub fn apply_payment(&mut self, record: PaymentRecord, now: DateTime<Utc>) -> RecordOutcome {
        let category = record.category.clone();
        let details = record.fee_details.clone();
        let outcome = self.payments.record(record);
        if outcome.accepted() {
            self.selected_category = Some(category);
            self.selected_category_details = details;
            self.updated_at = now;
        }
        outcome
    }

    /// Whether the registrant resides in India. Selects INR for bank transfers.
    pub fn is_national(&self) -> bool {
        self.country.trim().eq_ignore_ascii_case("india")
    }
}

/// Sign-up request.
#[derive(Clone, Deserialize)]
pub struct NewRegistrant {
    /// Email address.
    pub email: String,
    /// Plain-text password. Hashed before storage.
    pub password: String,
    /// Phone number.
    pub phone: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    #[serde(default)]
    pub family_name: Option<String>,
    /// Full display name; derived from the name parts when absent.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Country of residence.
    pub country: String,
    /// Institution.
    pub affiliation: String,
}

impl std::fmt::Debug for NewRegistrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewRegistrant")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("given_name", &self.given_name)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

impl NewRegistrant {
    /// Password rules shared by sign-up and password reset.
    pub fn validate_password(password: &str) -> Result<(), ValidationError> {
        if password.is_empty() {
            return Err(ValidationError::MissingField("password"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::InvalidValue {
                field: "password",
                value: format!("shorter than {MIN_PASSWORD_LEN} characters"),
            });
        }
        Ok(())
    }

    /// Check required fields and limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        normalize_email(&self.email)?;
        Self::validate_password(&self.password)?;
        required(&self.phone, "phone")?;
        required(&self.given_name, "given_name")?;
        required(&self.country, "country")?;
        required(&self.affiliation, "affiliation")?;
        if let Some(family) = &self.family_name {
            bounded(family, "family_name")?;
        }
        if let Some(full) = &self.full_name {
            bounded(full, "full_name")?;
        }
        Ok(())
    }
}

/// Whitelisted profile edit. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    /// Honorific.
    pub title: Option<String>,
    /// Self-declared registrant category.
    pub category1: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Postal code.
    pub zipcode: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Country of residence.
    pub country: Option<String>,
    /// Institution.
    pub affiliation: Option<String>,
    /// Dietary preference. `"Other"` defers to `other_dietary_preference`.
    pub dietary_preference: Option<String>,
    /// Free-text dietary preference.
    pub other_dietary_preference: Option<String>,
    /// Replaces the whole accompanying-person list.
    pub accompanying_persons: Option<Vec<AccompanyingPerson>>,
}

impl ProfileUpdate {
    /// Check limits on every present field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let optional = [
            (&self.title, "title"),
            (&self.category1, "category1"),
            (&self.address, "address"),
            (&self.zipcode, "zipcode"),
            (&self.dietary_preference, "dietary_preference"),
            (&self.other_dietary_preference, "other_dietary_preference"),
        ];
        for (value, field) in optional {
            if let Some(v) = value {
                bounded(v, field)?;
            }
        }
        for (value, field) in [
            (&self.phone, "phone"),
            (&self.country, "country"),
            (&self.affiliation, "affiliation"),
        ] {
            if let Some(v) = value {
                required(v, field)?;
            }
        }
        if let Some(persons) = &self.accompanying_persons {
            if persons.len() > MAX_ACCOMPANYING {
                return Err(ValidationError::InvalidValue {
                    field: "accompanying_persons",
                    value: format!("{} entries (max {MAX_ACCOMPANYING})", persons.len()),
                });
            }
            for p in persons {
                p.validate()?;
            }
        }
        Ok(())
    }

    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Dietary preference after substituting the free-text value for `"Other"`.
    fn resolved_dietary_preference(&self) -> Option<String> {
        let pref = self.dietary_preference.as_deref()?.trim();
        if pref == OTHER_DIETARY_PREFERENCE {
            match self.other_dietary_preference.as_deref().map(str::trim) {
                Some(other) if !other.is_empty() => return Some(other.to_string()),
                _ => {}
            }
        }
        Some(pref.to_string())
    }

    /// Merge into `registrant`.
    pub fn apply(&self, registrant: &mut Registrant, now: DateTime<Utc>) {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                *target = Some(v.trim().to_string());
            }
        }
        set(&mut registrant.title, &self.title);
        set(&mut registrant.category1, &self.category1);
        set(&mut registrant.address, &self.address);
        set(&mut registrant.zipcode, &self.zipcode);
        if let Some(phone) = &self.phone {
            registrant.phone = phone.trim().to_string();
        }
        if let Some(country) = &self.country {
            registrant.country = country.trim().to_string();
        }
        if let Some(affiliation) = &self.affiliation {
            registrant.affiliation = affiliation.trim().to_string();
        }
        if let Some(pref) = self.resolved_dietary_preference() {
            registrant.dietary_preference = Some(pref);
        }
        if let Some(persons) = &self.accompanying_persons {
            registrant.accompanying_persons = persons.clone();
        }
        registrant.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::PaymentStatus;

    fn signup() -> NewRegistrant {
        NewRegistrant {
            email: " Ada@Example.org ".into(),
            password: "correct horse".into(),
            phone: "+91 99999 00000".into(),
            given_name: "Ada".into(),
            family_name: Some("Lovelace".into()),
            full_name: None,
            country: "India".into(),
            affiliation: "IISc".into(),
        }
    }

    fn registrant() -> Registrant {
        Registrant::new(Uuid::new_v4(), &signup(), "$argon2id$stub".into(), Utc::now()).unwrap()
    }

    fn payment(id: &str, category: &str) -> PaymentRecord {
        PaymentRecord {
            payment_id: id.into(),
            order_id: "order_1".into(),
            signature: "sig".into(),
            category: category.into(),
            currency: "INR".into(),
            amount_minor: 100,
            status: PaymentStatus::Paid,
            fee_details: Vec::new(),
            receipt_url: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_registrant_normalizes_email_and_derives_full_name() {
        let r = registrant();
        assert_eq!(r.email, "ada@example.org");
        assert_eq!(r.full_name, "Ada Lovelace");
        assert!(r.is_national());
        assert!(r.payments.is_empty());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let v = serde_json::to_value(registrant()).unwrap();
        assert!(v.get("password_hash").is_none());
    }

    #[test]
    fn signup_validation() {
        assert!(signup().validate().is_ok());
        let mut s = signup();
        s.password = "short".into();
        assert!(matches!(s.validate(), Err(ValidationError::InvalidValue { field: "password", .. })));
        let mut s = signup();
        s.affiliation = "  ".into();
        assert_eq!(s.validate(), Err(ValidationError::MissingField("affiliation")));
        let mut s = signup();
        s.email = "nope".into();
        assert!(matches!(s.validate(), Err(ValidationError::InvalidEmail(_))));
    }

    #[test]
    fn signup_debug_hides_password() {
        assert!(!format!("{:?}", signup()).contains("correct horse"));
    }

    #[test]
    fn apply_payment_updates_summary_once() {
        let mut r = registrant();
        assert!(r.apply_payment(payment("pay_1", "Multi"), Utc::now()).accepted());
        assert_eq!(r.selected_category.as_deref(), Some("Multi"));
        let dup = r.apply_payment(payment("pay_1", "Other"), Utc::now());
        assert_eq!(dup, RecordOutcome::Duplicate);
        assert_eq!(r.selected_category.as_deref(), Some("Multi"));
        assert_eq!(r.payments.len(), 1);
    }

    #[test]
    fn profile_update_rejects_unknown_fields() {
        let err = serde_json::from_str::<ProfileUpdate>(r#"{"payments":[]}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<ProfileUpdate>(r#"{"email":"x@y.z"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn profile_update_substitutes_other_dietary_preference() {
        let mut r = registrant();
        let update: ProfileUpdate = serde_json::from_str(
            r#"{"dietary_preference":"Other","other_dietary_preference":"Jain","zipcode":"560012"}"#,
        )
        .unwrap();
        update.validate().unwrap();
        update.apply(&mut r, Utc::now());
        assert_eq!(r.dietary_preference.as_deref(), Some("Jain"));
        assert_eq!(r.zipcode.as_deref(), Some("560012"));
        assert_eq!(r.phone, "+91 99999 00000");
    }

    #[test]
    fn profile_update_other_without_text_keeps_other() {
        let mut r = registrant();
        let update = ProfileUpdate {
            dietary_preference: Some("Other".into()),
            ..Default::default()
        };
        update.apply(&mut r, Utc::now());
        assert_eq!(r.dietary_preference.as_deref(), Some("Other"));
    }

    #[test]
    fn profile_update_validation() {
        let blank_phone = ProfileUpdate {
            phone: Some(" ".into()),
            ..Default::default()
        };
        assert_eq!(blank_phone.validate(), Err(ValidationError::MissingField("phone")));
        let too_many = ProfileUpdate {
            accompanying_persons: Some(vec![
                AccompanyingPerson {
                    first_name: "A".into(),
                    last_name: String::new(),
                    relation: String::new(),
                    dietary_preference: String::new(),
                    citizenship: String::new(),
                };
                11
            ]),
            ..Default::default()
        };
        assert!(too_many.validate().is_err());
        assert!(ProfileUpdate::default().is_empty());
    }
}
