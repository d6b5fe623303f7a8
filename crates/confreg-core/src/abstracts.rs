//! # Abstract Submissions
//!
//! A registrant submits an abstract as structured text, may attach a
//! document, and finalizes it once. A finalized abstract is read-only for
//! its author; only an admin review changes it afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::download::StoredDocument;
use crate::error::{SubmissionError, ValidationError};
use crate::registrant::{bounded, bounded_within, required, required_within};

/// Prefix of every abstract code.
pub const ABSTRACT_CODE_PREFIX: &str = "ABS";

/// Upper bound on the abstract body.
pub const MAX_BODY_LEN: usize = 10_000;

/// Abstract code for a serial number, e.g. `ABS_004217`.
pub fn abstract_code(serial: u32) -> String {
    format!("{ABSTRACT_CODE_PREFIX}_{:06}", serial % 1_000_000)
}

/// Review outcome of an abstract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AbstractStatus {
    /// Not reviewed yet.
    #[default]
    Pending,
    /// Accepted for presentation.
    Approved,
    /// Declined.
    Rejected,
}

impl AbstractStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AbstractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted abstract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractSubmission {
    /// Public code, unique across abstracts.
    pub abstract_code: String,
    /// Author registrant.
    pub user_id: Uuid,
    /// Title.
    pub title: String,
    /// Conference theme the abstract targets.
    pub theme: String,
    /// Oral or poster.
    pub presenting_type: String,
    /// First author name.
    pub first_author_name: String,
    /// First author institution.
    pub first_author_affiliation: String,
    /// Remaining authors, free text.
    pub other_authors: String,
    /// Presenting author name.
    pub presenting_author_name: String,
    /// Presenting author institution.
    pub presenting_author_affiliation: String,
    /// Abstract text.
    pub main_body: String,
    /// Attached document, if any.
    pub document: Option<StoredDocument>,
    /// Set once by the author; blocks further edits.
    pub is_finalized: bool,
    /// Review outcome.
    pub status: AbstractStatus,
    /// Reviewer remarks.
    pub remarks: Option<String>,
    /// First submission.
    pub submitted_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl AbstractSubmission {
    /// Build a pending, unfinalized abstract.
    pub fn new(code: String, user_id: Uuid, input: &NewAbstract, now: DateTime<Utc>) -> Self {
        Self {
            abstract_code: code,
            user_id,
            title: input.title.trim().to_string(),
            theme: input.theme.trim().to_string(),
            presenting_type: input.presenting_type.trim().to_string(),
            first_author_name: input.first_author_name.trim().to_string(),
            first_author_affiliation: input.first_author_affiliation.trim().to_string(),
            other_authors: input.other_authors.trim().to_string(),
            presenting_author_name: input.presenting_author_name.trim().to_string(),
            presenting_author_affiliation: input.presenting_author_affiliation.trim().to_string(),
            main_body: input.main_body.trim().to_string(),
            document: None,
            is_finalized: false,
            status: AbstractStatus::Pending,
            remarks: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    fn ensure_editable(&self) -> Result<(), SubmissionError> {
        if self.is_finalized {
            return Err(SubmissionError::Finalized(self.abstract_code.clone()));
        }
        Ok(())
    }

    /// Attach or replace the document. Returns the superseded one.
    pub fn attach(
        &mut self,
        document: StoredDocument,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredDocument>, SubmissionError> {
        self.ensure_editable()?;
        self.updated_at = now;
        Ok(self.document.replace(document))
    }

    /// Drop the document. Returns it so its storage can be released.
    pub fn detach(&mut self, now: DateTime<Utc>) -> Result<Option<StoredDocument>, SubmissionError> {
        self.ensure_editable()?;
        let previous = self.document.take();
        if previous.is_some() {
            self.updated_at = now;
        }
        Ok(previous)
    }

    /// Lock the abstract. Requires an attached document; repeating is a no-op.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<(), SubmissionError> {
        if self.is_finalized {
            return Ok(());
        }
        if self.document.is_none() {
            return Err(SubmissionError::MissingDocument(self.abstract_code.clone()));
        }
        self.is_finalized = true;
        self.updated_at = now;
        Ok(())
    }

    /// Record an admin decision.
    pub fn review(&mut self, review: &AbstractReview, now: DateTime<Utc>) {
        self.status = review.status;
        self.remarks = review
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        self.updated_at = now;
    }
}

/// Fields of a new abstract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAbstract {
    /// Title.
    pub title: String,
    /// Conference theme.
    pub theme: String,
    /// Oral or poster.
    pub presenting_type: String,
    /// First author name.
    pub first_author_name: String,
    /// First author institution.
    pub first_author_affiliation: String,
    /// Remaining authors.
    #[serde(default)]
    pub other_authors: String,
    /// Presenting author name.
    pub presenting_author_name: String,
    /// Presenting author institution.
    pub presenting_author_affiliation: String,
    /// Abstract text.
    pub main_body: String,
}

impl NewAbstract {
    /// Check required fields and lengths.
    pub fn validate(&self) -> Result<(), ValidationError> {
        required(&self.title, "title")?;
        required(&self.theme, "theme")?;
        required(&self.presenting_type, "presenting_type")?;
        required(&self.first_author_name, "first_author_name")?;
        required(&self.first_author_affiliation, "first_author_affiliation")?;
        bounded_within(&self.other_authors, "other_authors", MAX_BODY_LEN)?;
        required(&self.presenting_author_name, "presenting_author_name")?;
        required(&self.presenting_author_affiliation, "presenting_author_affiliation")?;
        required_within(&self.main_body, "main_body", MAX_BODY_LEN)
    }
}

/// Author edit of an unfinalized abstract. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbstractUpdate {
    #[allow(missing_docs)]
    pub title: Option<String>,
    #[allow(missing_docs)]
    pub theme: Option<String>,
    #[allow(missing_docs)]
    pub presenting_type: Option<String>,
    #[allow(missing_docs)]
    pub first_author_name: Option<String>,
    #[allow(missing_docs)]
    pub first_author_affiliation: Option<String>,
    #[allow(missing_docs)]
    pub other_authors: Option<String>,
    #[allow(missing_docs)]
    pub presenting_author_name: Option<String>,
    #[allow(missing_docs)]
    pub presenting_author_affiliation: Option<String>,
    #[allow(missing_docs)]
    pub main_body: Option<String>,
}

impl AbstractUpdate {
    /// Present fields follow the same rules as [`NewAbstract`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            (&self.title, "title"),
            (&self.theme, "theme"),
            (&self.presenting_type, "presenting_type"),
            (&self.first_author_name, "first_author_name"),
            (&self.first_author_affiliation, "first_author_affiliation"),
            (&self.presenting_author_name, "presenting_author_name"),
            (&self.presenting_author_affiliation, "presenting_author_affiliation"),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                required(value, field)?;
            }
        }
        if let Some(other) = &self.other_authors {
            bounded_within(other, "other_authors", MAX_BODY_LEN)?;
        }
        if let Some(body) = &self.main_body {
            required_within(body, "main_body", MAX_BODY_LEN)?;
        }
        Ok(())
    }

    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to an unfinalized abstract.
    pub fn apply(
        &self,
        target: &mut AbstractSubmission,
        now: DateTime<Utc>,
    ) -> Result<(), SubmissionError> {
        target.ensure_editable()?;
        let pairs = [
            (&mut target.title, &self.title),
            (&mut target.theme, &self.theme),
            (&mut target.presenting_type, &self.presenting_type),
            (&mut target.first_author_name, &self.first_author_name),
            (&mut target.first_author_affiliation, &self.first_author_affiliation),
            (&mut target.other_authors, &self.other_authors),
            (&mut target.presenting_author_name, &self.presenting_author_name),
            (&mut target.presenting_author_affiliation, &self.presenting_author_affiliation),
            (&mut target.main_body, &self.main_body),
        ];
        for (slot, value) in pairs {
            if let Some(value) = value {
                *slot = value.trim().to_string();
            }
        }
        target.updated_at = now;
        Ok(())
    }
}

/// Admin decision on an abstract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbstractReview {
    /// `Approved` or `Rejected`.
    pub status: AbstractStatus,
    /// Optional remarks shown to the author.
    #[serde(default)]
    pub remarks: Option<String>,
}

impl AbstractReview {
    /// A review must decide; `Pending` is not a decision.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.status == AbstractStatus::Pending {
            return Err(ValidationError::InvalidValue {
                field: "status",
                value: self.status.to_string(),
            });
        }
        if let Some(remarks) = &self.remarks {
            bounded(remarks, "remarks")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewAbstract {
        NewAbstract {
            title: " Soil carbon ".into(),
            theme: "Climate".into(),
            presenting_type: "Oral".into(),
            first_author_name: "Ada".into(),
            first_author_affiliation: "IISc".into(),
            other_authors: String::new(),
            presenting_author_name: "Ada".into(),
            presenting_author_affiliation: "IISc".into(),
            main_body: "We measure.".into(),
        }
    }

    fn document(name: &str) -> StoredDocument {
        StoredDocument {
            file_name: name.into(),
            stored_name: format!("ABS_000001-1-aa-{name}"),
            uploaded_at: Utc::now(),
        }
    }

    fn submission() -> AbstractSubmission {
        AbstractSubmission::new(abstract_code(1), Uuid::new_v4(), &input(), Utc::now())
    }

    #[test]
    fn codes_are_zero_padded() {
        assert_eq!(abstract_code(42), "ABS_000042");
        assert_eq!(abstract_code(1_000_007), "ABS_000007");
    }

    #[test]
    fn new_abstract_trims_and_starts_pending() {
        let a = submission();
        assert_eq!(a.title, "Soil carbon");
        assert_eq!(a.status, AbstractStatus::Pending);
        assert!(!a.is_finalized && a.document.is_none());
    }

    #[test]
    fn new_abstract_requires_body() {
        let mut i = input();
        i.main_body = "  ".into();
        assert_eq!(i.validate(), Err(ValidationError::MissingField("main_body")));
        i.main_body = "x".repeat(MAX_BODY_LEN + 1);
        assert!(matches!(i.validate(), Err(ValidationError::TooLong { .. })));
    }

    #[test]
    fn finalize_needs_document_and_locks_edits() {
        let mut a = submission();
        assert!(matches!(a.finalize(Utc::now()), Err(SubmissionError::MissingDocument(_))));

        assert!(a.attach(document("a.pdf"), Utc::now()).unwrap().is_none());
        let previous = a.attach(document("b.pdf"), Utc::now()).unwrap();
        assert_eq!(previous.unwrap().file_name, "a.pdf");

        a.finalize(Utc::now()).unwrap();
        a.finalize(Utc::now()).unwrap();
        assert!(matches!(a.detach(Utc::now()), Err(SubmissionError::Finalized(_))));

        let update = AbstractUpdate {
            title: Some("New".into()),
            ..Default::default()
        };
        assert!(update.apply(&mut a, Utc::now()).is_err());
        assert_eq!(a.title, "Soil carbon");
    }

    #[test]
    fn update_touches_only_present_fields() {
        let mut a = submission();
        let update: AbstractUpdate = serde_json::from_str(r#"{"theme":" Water "}"#).unwrap();
        update.apply(&mut a, Utc::now()).unwrap();
        assert_eq!(a.theme, "Water");
        assert_eq!(a.title, "Soil carbon");

        assert!(serde_json::from_str::<AbstractUpdate>(r#"{"status":"Approved"}"#).is_err());
        let blank = AbstractUpdate {
            title: Some(" ".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
        assert!(AbstractUpdate::default().is_empty());
    }

    #[test]
    fn review_must_decide() {
        let pending = AbstractReview {
            status: AbstractStatus::Pending,
            remarks: None,
        };
        assert!(pending.validate().is_err());

        let mut a = submission();
        let review = AbstractReview {
            status: AbstractStatus::Approved,
            remarks: Some("  ".into()),
        };
        review.validate().unwrap();
        a.review(&review, Utc::now());
        assert_eq!(a.status, AbstractStatus::Approved);
        assert!(a.remarks.is_none());
    }
}
