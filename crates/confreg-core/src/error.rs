//! # Error Hierarchy
//!
//! Structured error types for the domain layer, built with `thiserror`.
//! The API crate maps each of these onto an HTTP status.

use thiserror::Error;

/// Input failed a domain validation rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// An email address was syntactically unusable.
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    /// A value was outside the set the field accepts.
    #[error("invalid {field}: {value:?}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// A free-text field exceeded its length limit.
    #[error("{field} must not exceed {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Order state machine violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid order transition from {from} to {to}")]
pub struct TransitionError {
    /// State the order was in.
    pub from: &'static str,
    /// State that was requested.
    pub to: &'static str,
}

/// Reasons a one-time code fails verification.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpError {
    /// No outstanding code exists for the email.
    #[error("invalid or expired OTP")]
    NotFound,

    /// The code is past its expiry. The record is discarded.
    #[error("OTP has expired, please request a new one")]
    Expired,

    /// The code was already consumed.
    #[error("OTP has already been used")]
    AlreadyUsed,

    /// The submitted code does not match.
    #[error("invalid OTP code")]
    Mismatch,
}

/// Allow-list mutation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllowListError {
    /// The address is already on the list.
    #[error("email already present: {0}")]
    AlreadyPresent(String),

    /// The address could not be normalized into a usable form.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Submission lifecycle violations for abstracts and papers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// The submission was finalized and no longer accepts edits.
    #[error("{0} is finalized and can no longer be edited")]
    Finalized(String),

    /// A finalize was requested before any document was attached.
    #[error("{0} has no document attached")]
    MissingDocument(String),

    /// The paper is in a state that does not accept the requested change.
    #[error("paper {code} cannot accept this change while {status}")]
    WrongState {
        /// Paper code.
        code: String,
        /// Current paper status.
        status: &'static str,
    },

    /// The input failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_messages_are_user_facing() {
        assert_eq!(OtpError::AlreadyUsed.to_string(), "OTP has already been used");
        assert!(OtpError::Expired.to_string().contains("expired"));
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = TransitionError {
            from: "PAID",
            to: "PENDING",
        };
        let msg = err.to_string();
        assert!(msg.contains("PAID") && msg.contains("PENDING"));
    }

    #[test]
    fn validation_error_wraps_into_allow_list_error() {
        let err: AllowListError = ValidationError::InvalidEmail("nope".into()).into();
        assert!(matches!(err, AllowListError::Invalid(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn submission_errors_name_the_code() {
        let err = SubmissionError::WrongState {
            code: "ABS_000123".into(),
            status: "Rejected",
        };
        assert!(err.to_string().contains("ABS_000123"));
        assert!(SubmissionError::Finalized("ABS_1".into()).to_string().contains("finalized"));
    }
}
