#![deny(missing_docs)]

//! # confreg-core -- Domain Types for Conference Registration
//!
//! Pure domain logic with no I/O. Every crate in the workspace builds on
//! these types; the API crate wires them to storage, mail, and the payment
//! provider.
//!
//! ## Modules
//!
//! - [`fee`]: period selection and the national/international fee tables.
//! - [`payment`]: ledger entries, the append-only per-user ledger, and the
//!   order state machine (`Created → Pending → {Paid, Failed}`).
//! - [`otp`]: one-time codes and the download tokens they unlock.
//! - [`allowlist`]: the download allow-list document and email normalization.
//! - [`download`]: gated file metadata and storage naming.
//! - [`registrant`]: the registrant aggregate and its whitelisted profile update.
//! - [`abstracts`]: abstract submissions, finalization, and admin review.
//! - [`paper`]: full papers, revisions, and review recommendations.
//! - [`invitation`]: invitation-letter requests.
//!
//! ## Crate Policy
//!
//! - Deterministic: functions that depend on "now" take it as a parameter.
//! - Structured errors with `thiserror`; no `.unwrap()` outside tests.

pub mod abstracts;
pub mod allowlist;
pub mod download;
pub mod error;
pub mod fee;
pub mod invitation;
pub mod otp;
pub mod paper;
pub mod payment;
pub mod registrant;

pub use abstracts::{
    abstract_code, AbstractReview, AbstractStatus, AbstractSubmission, AbstractUpdate, NewAbstract,
};
pub use allowlist::{normalize_email, AllowList};
pub use download::{
    content_type_for, ensure_extension, flat_file_name, stored_file_name, DownloadFile, FileType,
    StoredDocument, DOCUMENT_EXTENSIONS, RECEIPT_EXTENSIONS,
};
pub use error::{AllowListError, OtpError, SubmissionError, TransitionError, ValidationError};
pub use fee::{
    compute_fee, quote, CategorySelection, Currency, FeeCategory, FeeComponents, FeeLine,
    FeePeriod, FeeQuote, PaymentMode,
};
pub use invitation::{InvitationDetails, InvitationRequest};
pub use otp::{DownloadToken, OtpRecord, DOWNLOAD_TOKEN_TTL_SECS, OTP_TTL_SECS};
pub use paper::{NewPaper, Paper, PaperReview, PaperStatus, PaperType, Recommendation};
pub use payment::{
    format_amount, OrderRecord, OrderState, PaymentLedger, PaymentRecord, PaymentStatus,
    RecordOutcome,
};
pub use registrant::{AccompanyingPerson, NewRegistrant, ProfileUpdate, Registrant};
