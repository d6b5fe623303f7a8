//! # Full Papers
//!
//! A paper follows an abstract: its code is the abstract's code, so each
//! abstract has at most one paper. Status moves with the review
//! recommendation; a revision upload moves it to `Revision Submitted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::abstracts::MAX_BODY_LEN;
use crate::download::StoredDocument;
use crate::error::{SubmissionError, ValidationError};
use crate::registrant::{bounded, bounded_within, required, required_within};

const MAX_SCORE: f64 = 10.0;
const MAX_KEYWORDS: usize = 20;

/// Where a paper is in review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperStatus {
    /// Received, not yet reviewed.
    #[default]
    Submitted,
    /// A reviewer has it.
    #[serde(rename = "Under Review")]
    UnderReview,
    /// Review written, decision pending.
    #[serde(rename = "Review Completed")]
    ReviewCompleted,
    /// Accepted.
    Accepted,
    /// Declined. Terminal.
    Rejected,
    /// The author must upload a revision.
    #[serde(rename = "Revision Required")]
    RevisionRequired,
    /// A revision was uploaded.
    #[serde(rename = "Revision Submitted")]
    RevisionSubmitted,
}

impl PaperStatus {
    const ALL: [PaperStatus; 7] = [
        Self::Submitted,
        Self::UnderReview,
        Self::ReviewCompleted,
        Self::Accepted,
        Self::Rejected,
        Self::RevisionRequired,
        Self::RevisionSubmitted,
    ];

    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "Under Review",
            Self::ReviewCompleted => "Review Completed",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::RevisionRequired => "Revision Required",
            Self::RevisionSubmitted => "Revision Submitted",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "status",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of manuscript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperType {
    #[allow(missing_docs)]
    #[default]
    #[serde(rename = "FULL PAPER")]
    FullPaper,
    #[allow(missing_docs)]
    #[serde(rename = "EXTENDED ABSTRACT")]
    ExtendedAbstract,
}

impl PaperType {
    /// Return the string representation of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullPaper => "FULL PAPER",
            Self::ExtendedAbstract => "EXTENDED ABSTRACT",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "FULL PAPER" => Ok(Self::FullPaper),
            "EXTENDED ABSTRACT" => Ok(Self::ExtendedAbstract),
            other => Err(ValidationError::InvalidValue {
                field: "paper_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Reviewer recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[allow(missing_docs)]
    Accept,
    #[allow(missing_docs)]
    #[serde(rename = "Accept with Minor Revisions")]
    AcceptWithMinorRevisions,
    #[allow(missing_docs)]
    #[serde(rename = "Major Revisions Required")]
    MajorRevisionsRequired,
    #[allow(missing_docs)]
    Reject,
}

impl Recommendation {
    /// Status a paper takes when reviewed with this recommendation.
    pub fn outcome(&self) -> PaperStatus {
        match self {
            Self::Accept | Self::AcceptWithMinorRevisions => PaperStatus::Accepted,
            Self::MajorRevisionsRequired => PaperStatus::RevisionRequired,
            Self::Reject => PaperStatus::Rejected,
        }
    }
}

/// A completed review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperReview {
    /// Reviewer display name.
    pub reviewer_name: String,
    /// Comments for the author.
    #[serde(default)]
    pub reviewer_comments: String,
    /// Technical score, 0 to 10.
    pub technical_score: Option<f64>,
    /// Presentation score, 0 to 10.
    pub presentation_score: Option<f64>,
    /// Overall score, 0 to 10.
    pub overall_score: Option<f64>,
    /// Decision driving the paper status.
    pub recommendation: Recommendation,
    /// Set when the review is recorded.
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl PaperReview {
    /// Require a reviewer and keep scores within range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        required(&self.reviewer_name, "reviewer_name")?;
        bounded_within(&self.reviewer_comments, "reviewer_comments", MAX_BODY_LEN)?;
        let scores = [
            (self.technical_score, "technical_score"),
            (self.presentation_score, "presentation_score"),
            (self.overall_score, "overall_score"),
        ];
        for (score, field) in scores {
            if let Some(score) = score {
                if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
                    return Err(ValidationError::InvalidValue {
                        field,
                        value: score.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A submitted paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Same as the abstract code.
    pub paper_code: String,
    /// Abstract the paper extends.
    pub abstract_code: String,
    /// Author registrant.
    pub user_id: Uuid,
    /// Title.
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Keywords.
    pub keywords: Vec<String>,
    /// Conference track.
    pub track: String,
    /// Kind of manuscript.
    pub paper_type: PaperType,
    /// First author name.
    pub first_author_name: String,
    /// Presenting author name.
    pub presenting_author_name: String,
    /// Remaining authors.
    pub other_authors: Vec<String>,
    /// Manuscript as first submitted.
    pub paper_file: Option<StoredDocument>,
    /// Latest revision.
    pub revised_file: Option<StoredDocument>,
    /// Review state.
    pub status: PaperStatus,
    /// Latest review.
    pub review: Option<PaperReview>,
    /// First submission.
    pub submitted_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl Paper {
    /// Build a paper for the abstract `abstract_code`.
    pub fn new(abstract_code: &str, user_id: Uuid, input: &NewPaper, now: DateTime<Utc>) -> Self {
        Self {
            paper_code: abstract_code.to_string(),
            abstract_code: abstract_code.to_string(),
            user_id,
            title: input.title.trim().to_string(),
            abstract_text: input.abstract_text.trim().to_string(),
            keywords: input
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            track: input.track.trim().to_string(),
            paper_type: input.paper_type,
            first_author_name: input.first_author_name.trim().to_string(),
            presenting_author_name: input.presenting_author_name.trim().to_string(),
            other_authors: input.other_authors.iter().map(|a| a.trim().to_string()).collect(),
            paper_file: None,
            revised_file: None,
            status: PaperStatus::Submitted,
            review: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    fn wrong_state(&self) -> SubmissionError {
        SubmissionError::WrongState {
            code: self.paper_code.clone(),
            status: self.status.as_str(),
        }
    }

    /// Attach or replace the manuscript. Only before review starts.
    pub fn attach(
        &mut self,
        document: StoredDocument,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredDocument>, SubmissionError> {
        if self.status != PaperStatus::Submitted {
            return Err(self.wrong_state());
        }
        self.updated_at = now;
        Ok(self.paper_file.replace(document))
    }

    /// Upload a revision. Refused for rejected papers and papers without a
    /// manuscript. Returns the superseded revision.
    pub fn submit_revision(
        &mut self,
        document: StoredDocument,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredDocument>, SubmissionError> {
        if self.status == PaperStatus::Rejected || self.paper_file.is_none() {
            return Err(self.wrong_state());
        }
        self.status = PaperStatus::RevisionSubmitted;
        self.updated_at = now;
        Ok(self.revised_file.replace(document))
    }

    /// The document a reader should see: the revision when there is one.
    pub fn current_document(&self) -> Option<&StoredDocument> {
        self.revised_file.as_ref().or(self.paper_file.as_ref())
    }

    /// Record a review; the recommendation sets the status.
    pub fn record_review(&mut self, mut review: PaperReview, now: DateTime<Utc>) {
        review.reviewed_at = Some(now);
        self.status = review.recommendation.outcome();
        self.review = Some(review);
        self.updated_at = now;
    }
}

/// Fields of a new paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPaper {
    /// The caller's abstract this paper extends.
    pub abstract_code: String,
    /// Title.
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Conference track.
    pub track: String,
    /// Kind of manuscript.
    #[serde(default)]
    pub paper_type: PaperType,
    /// First author name.
    pub first_author_name: String,
    /// Presenting author name.
    pub presenting_author_name: String,
    /// Remaining authors.
    #[serde(default)]
    pub other_authors: Vec<String>,
}

impl NewPaper {
    /// Check required fields and lengths.
    pub fn validate(&self) -> Result<(), ValidationError> {
        required(&self.abstract_code, "abstract_code")?;
        required(&self.title, "title")?;
        required_within(&self.abstract_text, "abstract", MAX_BODY_LEN)?;
        required(&self.track, "track")?;
        required(&self.first_author_name, "first_author_name")?;
        required(&self.presenting_author_name, "presenting_author_name")?;
        if self.keywords.len() > MAX_KEYWORDS {
            return Err(ValidationError::InvalidValue {
                field: "keywords",
                value: format!("{} entries", self.keywords.len()),
            });
        }
        for keyword in &self.keywords {
            bounded(keyword, "keywords")?;
        }
        for author in &self.other_authors {
            required(author, "other_authors")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewPaper {
        serde_json::from_value(serde_json::json!({
            "abstract_code": "ABS_000001",
            "title": "Soil carbon at depth",
            "abstract": "We measure.",
            "keywords": ["soil", " ", "carbon "],
            "track": "Climate",
            "first_author_name": "Ada",
            "presenting_author_name": "Ada"
        }))
        .unwrap()
    }

    fn document(name: &str) -> StoredDocument {
        StoredDocument {
            file_name: name.into(),
            stored_name: name.into(),
            uploaded_at: Utc::now(),
        }
    }

    fn review(recommendation: Recommendation) -> PaperReview {
        PaperReview {
            reviewer_name: "Grace".into(),
            reviewer_comments: String::new(),
            technical_score: Some(8.5),
            presentation_score: None,
            overall_score: Some(8.0),
            recommendation,
            reviewed_at: None,
        }
    }

    #[test]
    fn paper_takes_abstract_code_and_defaults() {
        let input = input();
        input.validate().unwrap();
        let paper = Paper::new(&input.abstract_code, Uuid::new_v4(), &input, Utc::now());
        assert_eq!(paper.paper_code, "ABS_000001");
        assert_eq!(paper.paper_type, PaperType::FullPaper);
        assert_eq!(paper.keywords, vec!["soil", "carbon"]);
        assert_eq!(paper.status, PaperStatus::Submitted);
    }

    #[test]
    fn status_names_match_wire_form() {
        let json = serde_json::to_string(&PaperStatus::RevisionRequired).unwrap();
        assert_eq!(json, "\"Revision Required\"");
        assert_eq!(PaperStatus::parse("Under Review").unwrap(), PaperStatus::UnderReview);
        assert!(PaperStatus::parse("Lost").is_err());
        assert_eq!(PaperType::parse("EXTENDED ABSTRACT").unwrap(), PaperType::ExtendedAbstract);
    }

    #[test]
    fn recommendations_drive_status() {
        let input = input();
        let mut paper = Paper::new("ABS_000001", Uuid::new_v4(), &input, Utc::now());
        paper.attach(document("v1.pdf"), Utc::now()).unwrap();

        paper.record_review(review(Recommendation::MajorRevisionsRequired), Utc::now());
        assert_eq!(paper.status, PaperStatus::RevisionRequired);
        assert!(paper.review.as_ref().unwrap().reviewed_at.is_some());

        assert!(paper.attach(document("v1b.pdf"), Utc::now()).is_err());
        paper.submit_revision(document("v2.pdf"), Utc::now()).unwrap();
        assert_eq!(paper.status, PaperStatus::RevisionSubmitted);
        assert_eq!(paper.current_document().unwrap().file_name, "v2.pdf");

        paper.record_review(review(Recommendation::AcceptWithMinorRevisions), Utc::now());
        assert_eq!(paper.status, PaperStatus::Accepted);

        paper.record_review(review(Recommendation::Reject), Utc::now());
        assert!(matches!(
            paper.submit_revision(document("v3.pdf"), Utc::now()),
            Err(SubmissionError::WrongState { status: "Rejected", .. })
        ));
    }

    #[test]
    fn revision_needs_a_manuscript() {
        let input = input();
        let mut paper = Paper::new("ABS_000001", Uuid::new_v4(), &input, Utc::now());
        assert!(paper.submit_revision(document("v2.pdf"), Utc::now()).is_err());
        assert!(paper.current_document().is_none());
    }

    #[test]
    fn review_scores_are_bounded() {
        let mut r = review(Recommendation::Accept);
        r.validate().unwrap();
        r.overall_score = Some(11.0);
        assert!(r.validate().is_err());
        r.overall_score = Some(f64::NAN);
        assert!(r.validate().is_err());
        r.overall_score = None;
        r.reviewer_name = " ".into();
        assert_eq!(r.validate(), Err(ValidationError::MissingField("reviewer_name")));
    }
}
