//! # Download Allow-List
//!
//! A single document of normalized email addresses permitted to request
//! codes and download gated files. Every membership check normalizes its
//! input the same way the stored entries were normalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AllowListError, ValidationError};

const MAX_EMAIL_LEN: usize = 254;

/// Trim and lower-case an email address, rejecting obviously unusable input.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::MissingField("email"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong {
            field: "email",
            max: MAX_EMAIL_LEN,
        });
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(ValidationError::InvalidEmail(raw.trim().to_string())),
    }
}

/// The allow-list singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    /// Normalized addresses in insertion order.
    pub emails: Vec<String>,
    /// When the document was first materialised.
    pub created_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl AllowList {
    /// An empty list, as created lazily on first access.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            emails: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Membership check. Input is normalized first; unusable input is never a member.
    pub fn contains(&self, email: &str) -> bool {
        match normalize_email(email) {
            Ok(email) => self.emails.iter().any(|e| *e == email),
            Err(_) => false,
        }
    }

    /// Add an address. Returns the normalized form.
    pub fn add(&mut self, email: &str, now: DateTime<Utc>) -> Result<String, AllowListError> {
        let email = normalize_email(email)?;
        if self.emails.contains(&email) {
            return Err(AllowListError::AlreadyPresent(email));
        }
        self.emails.push(email.clone());
        self.updated_at = now;
        Ok(email)
    }

    /// Remove an address. Absent addresses are not an error; returns whether
    /// anything was removed.
    pub fn remove(&mut self, email: &str, now: DateTime<Utc>) -> Result<bool, ValidationError> {
        let email = normalize_email(email)?;
        let before = self.emails.len();
        self.emails.retain(|e| *e != email);
        let removed = self.emails.len() != before;
        if removed {
            self.updated_at = now;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.ORG ").unwrap(), "alice@example.org");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize_email("   "), Err(ValidationError::MissingField("email")));
        assert!(matches!(normalize_email("no-at-sign"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(normalize_email("@x.org"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(normalize_email("a@"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(normalize_email("a b@x.org"), Err(ValidationError::InvalidEmail(_))));
        assert!(matches!(normalize_email("a@b@c"), Err(ValidationError::InvalidEmail(_))));
    }

    #[test]
    fn membership_is_case_and_whitespace_insensitive() {
        let now = Utc::now();
        let mut list = AllowList::empty(now);
        list.add("Reviewer@Uni.edu", now).unwrap();
        assert!(list.contains(" reviewer@uni.EDU "));
        assert!(!list.contains("other@uni.edu"));
        assert!(!list.contains("not an email"));
    }

    #[test]
    fn add_twice_conflicts() {
        let now = Utc::now();
        let mut list = AllowList::empty(now);
        list.add("a@x.org", now).unwrap();
        let err = list.add("A@X.ORG", now).unwrap_err();
        assert_eq!(err, AllowListError::AlreadyPresent("a@x.org".into()));
        assert_eq!(list.emails.len(), 1);
    }

    #[test]
    fn removing_absent_email_leaves_list_unchanged() {
        let now = Utc::now();
        let mut list = AllowList::empty(now);
        list.add("a@x.org", now).unwrap();
        let snapshot = list.clone();
        let later = now + chrono::Duration::seconds(5);
        assert_eq!(list.remove("ghost@x.org", later), Ok(false));
        assert_eq!(list, snapshot);
    }

    #[test]
    fn remove_present_email() {
        let now = Utc::now();
        let mut list = AllowList::empty(now);
        list.add("a@x.org", now).unwrap();
        list.add("b@x.org", now).unwrap();
        assert_eq!(list.remove(" A@x.org", now), Ok(true));
        assert_eq!(list.emails, vec!["b@x.org".to_string()]);
    }
}
