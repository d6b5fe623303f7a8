//! # Transactional Mail
//!
//! Plain-text messages sent over an SMTP relay with `lettre`. When no relay
//! is configured, messages land in an in-memory outbox and are logged, so
//! development and tests run without a mail server.

use std::sync::Arc;

use confreg_core::{format_amount, AbstractSubmission, Paper, PaymentRecord, Registrant};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::SmtpConfig;

/// Mail delivery failures.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("message could not be built: {0}")]
    Build(String),

    #[error("smtp transport failed: {0}")]
    Transport(String),
}

/// A message ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// The one-time code for gated downloads.
    pub fn otp(event: &str, to: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Your OTP for {event} Downloads"),
            body: format!(
                "Your one-time password is: {code}\n\n\
                 It expires in 10 minutes. If you did not request it, ignore this message.\n\n\
                 {event} Team"
            ),
        }
    }

    /// Receipt for an accepted payment, itemised by category.
    pub fn payment_confirmation(event: &str, registrant: &Registrant, record: &PaymentRecord) -> Self {
        let mut lines = String::new();
        for line in &record.fee_details {
            lines.push_str(&format!(
                "  - {} ({}): base {}, GST {}, platform {}, total {}\n",
                line.category,
                line.currency,
                line.base_fee,
                line.gst,
                line.platform,
                line.total_amount
            ));
        }
        Self {
            to: registrant.email.clone(),
            subject: format!("Payment Confirmation - {event}"),
            body: format!(
                "Dear {name},\n\n\
                 We have received your payment.\n\n\
                 Payment ID: {payment_id}\n\
                 Order ID: {order_id}\n\
                 Amount: {amount}\n\
                 Categories:\n{lines}\n\
                 Thank you for registering.\n\n\
                 {event} Team",
                name = registrant.full_name,
                payment_id = record.payment_id,
                order_id = record.order_id,
                amount = format_amount(record.amount_minor, &record.currency),
            ),
        }
    }

    /// A bank transfer receipt awaiting manual verification.
    pub fn bank_transfer_received(event: &str, registrant: &Registrant, transaction_id: &str) -> Self {
        Self {
            to: registrant.email.clone(),
            subject: format!("Bank Transfer Receipt Received - {event}"),
            body: format!(
                "Dear {},\n\n\
                 We have received your bank transfer receipt for transaction {transaction_id}.\n\
                 Our team will verify it and update your registration.\n\n\
                 {event} Team",
                registrant.full_name
            ),
        }
    }

    /// Notice that a payment attempt failed.
    pub fn payment_failed(event: &str, to: &str, reason: Option<&str>) -> Self {
        let reason = reason
            .map(|r| format!("Reason reported by the payment provider: {r}\n\n"))
            .unwrap_or_default();
        Self {
            to: to.to_string(),
            subject: format!("Payment Failed - {event}"),
            body: format!(
                "Your recent payment attempt did not go through.\n\n\
                 {reason}\
                 No amount has been recorded against your registration. You can retry from your dashboard.\n\n\
                 {event} Team"
            ),
        }
    }

    /// Welcome message after registration.
    pub fn welcome(event: &str, registrant: &Registrant) -> Self {
        Self {
            to: registrant.email.clone(),
            subject: format!("Registration Successful - {event}"),
            body: format!(
                "Dear {},\n\n\
                 Your account has been created. You can now log in, complete your profile and pay the registration fee.\n\n\
                 {event} Team",
                registrant.full_name
            ),
        }
    }

    /// Copy of a new registration for the organisers.
    pub fn new_registration(event: &str, to: &str, registrant: &Registrant) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("New Registration - {event}"),
            body: format!(
                "Name: {}\nEmail: {}\nPhone: {}\nCountry: {}\nAffiliation: {}\n",
                registrant.full_name,
                registrant.email,
                registrant.phone,
                registrant.country,
                registrant.affiliation
            ),
        }
    }

    /// Code that authorizes a password change.
    pub fn password_reset(event: &str, to: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Password Reset - {event}"),
            body: format!(
                "Use this code to set a new password: {code}\n\n\
                 It expires in 10 minutes. If you did not ask to reset your password, ignore this message.\n\n\
                 {event} Team"
            ),
        }
    }

    /// Acknowledgement of a new abstract.
    pub fn abstract_submitted(event: &str, to: &str, submission: &AbstractSubmission) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Abstract Received ({}) - {event}", submission.abstract_code),
            body: format!(
                "We have received your abstract \"{title}\".\n\n\
                 Abstract code: {code}\n\
                 Theme: {theme}\n\
                 Presentation: {presenting}\n\n\
                 Attach your document and finalize the abstract from your dashboard.\n\n\
                 {event} Team",
                title = submission.title,
                code = submission.abstract_code,
                theme = submission.theme,
                presenting = submission.presenting_type,
            ),
        }
    }

    /// The review decision on an abstract.
    pub fn abstract_reviewed(event: &str, to: &str, submission: &AbstractSubmission) -> Self {
        let remarks = submission
            .remarks
            .as_deref()
            .map(|r| format!("Remarks: {r}\n\n"))
            .unwrap_or_default();
        Self {
            to: to.to_string(),
            subject: format!("Abstract {} {} - {event}", submission.abstract_code, submission.status),
            body: format!(
                "Your abstract \"{title}\" ({code}) has been {status}.\n\n\
                 {remarks}\
                 {event} Team",
                title = submission.title,
                code = submission.abstract_code,
                status = submission.status.as_str().to_lowercase(),
            ),
        }
    }

    /// Acknowledgement of a paper or a revision.
    pub fn paper_received(event: &str, to: &str, paper: &Paper) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Paper {} {} - {event}", paper.paper_code, paper.status),
            body: format!(
                "We have received your {kind} \"{title}\".\n\n\
                 Paper code: {code}\n\
                 Status: {status}\n\n\
                 {event} Team",
                kind = paper.paper_type.as_str().to_lowercase(),
                title = paper.title,
                code = paper.paper_code,
                status = paper.status,
            ),
        }
    }

    /// The review outcome for a paper.
    pub fn paper_reviewed(event: &str, to: &str, paper: &Paper) -> Self {
        let comments = paper
            .review
            .as_ref()
            .map(|r| r.reviewer_comments.trim())
            .filter(|c| !c.is_empty())
            .map(|c| format!("Reviewer comments:\n{c}\n\n"))
            .unwrap_or_default();
        Self {
            to: to.to_string(),
            subject: format!("Paper Review: {} - {event}", paper.paper_code),
            body: format!(
                "The review of \"{title}\" is complete.\n\n\
                 Status: {status}\n\n\
                 {comments}\
                 {event} Team",
                title = paper.title,
                status = paper.status,
            ),
        }
    }

    /// A visitor's question, forwarded to the organisers.
    pub fn query_received(event: &str, to: &str, name: &str, from: &str, message: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("New Query - {event}"),
            body: format!("Name: {name}\nEmail: {from}\n\n{message}\n"),
        }
    }

    /// Confirmation to the visitor that their question arrived.
    pub fn query_acknowledged(event: &str, to: &str, name: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("We received your query - {event}"),
            body: format!(
                "Dear {name},\n\n\
                 Thank you for writing to us. The organising committee will reply shortly.\n\n\
                 {event} Team"
            ),
        }
    }
}

/// Where mail goes.
#[derive(Clone)]
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Outbox(Arc<Mutex<Vec<OutgoingMail>>>),
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Smtp { from, .. } => f.debug_struct("Smtp").field("from", &from.to_string()).finish(),
            Self::Outbox(outbox) => f.debug_tuple("Outbox").field(&outbox.lock().len()).finish(),
        }
    }
}

impl Mailer {
    /// An in-memory outbox.
    pub fn outbox() -> Self {
        Self::Outbox(Arc::new(Mutex::new(Vec::new())))
    }

    /// SMTP when configured, the outbox otherwise.
    pub fn from_config(config: Option<&SmtpConfig>) -> Result<Self, MailError> {
        let Some(config) = config else {
            tracing::warn!("SMTP not configured: mail will be kept in memory and logged");
            return Ok(Self::outbox());
        };

        let from: Mailbox = config.from.parse().map_err(|e| MailError::Address {
            address: config.from.clone(),
            reason: format!("{e}"),
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.as_str().to_string(),
            ));
        }

        tracing::info!(host = %config.host, port = config.port, "SMTP mailer configured");
        Ok(Self::Smtp {
            transport: builder.build::<Tokio1Executor>(),
            from,
        })
    }

    /// Messages captured by the outbox. Always empty for SMTP.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self {
            Self::Outbox(outbox) => outbox.lock().clone(),
            Self::Smtp { .. } => Vec::new(),
        }
    }

    /// Deliver one message.
    pub async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        match self {
            Self::Outbox(outbox) => {
                tracing::info!(to = %mail.to, subject = %mail.subject, "mail captured in outbox");
                outbox.lock().push(mail);
                Ok(())
            }
            Self::Smtp { transport, from } => {
                let to: Mailbox = mail.to.parse().map_err(|e| MailError::Address {
                    address: mail.to.clone(),
                    reason: format!("{e}"),
                })?;
                let message = Message::builder()
                    .from(from.clone())
                    .to(to)
                    .subject(mail.subject.as_str())
                    .header(ContentType::TEXT_PLAIN)
                    .body(mail.body)
                    .map_err(|e| MailError::Build(e.to_string()))?;

                let response = transport
                    .send(message)
                    .await
                    .map_err(|e| MailError::Transport(e.to_string()))?;
                if !response.is_positive() {
                    return Err(MailError::Transport(format!(
                        "relay answered {}",
                        response.code()
                    )));
                }
                tracing::info!(to = %mail.to, subject = %mail.subject, "mail sent");
                Ok(())
            }
        }
    }
}
