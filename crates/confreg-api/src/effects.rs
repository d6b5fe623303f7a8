//! # Background Side Effects
//!
//! Mail and spreadsheet rows that follow a committed write are queued here
//! and delivered by a detached Tokio worker. The request that queued them
//! never waits for delivery and never learns whether it succeeded: failures
//! are logged and dropped, with no retry.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::mailer::{Mailer, OutgoingMail};
use crate::sheets::{SheetRow, SheetSink};

/// Work queued after a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    SendEmail(OutgoingMail),
    AppendPaymentRow { payment_id: String, row: SheetRow },
    AppendRegistrationRow { email: String, row: SheetRow },
    /// Abstract or paper row, keyed by its code.
    AppendSubmissionRow { code: String, row: SheetRow },
}

impl SideEffect {
    fn kind(&self) -> &'static str {
        match self {
            Self::SendEmail(_) => "send_email",
            Self::AppendPaymentRow { .. } => "append_payment_row",
            Self::AppendRegistrationRow { .. } => "append_registration_row",
            Self::AppendSubmissionRow { .. } => "append_submission_row",
        }
    }
}

/// Sending half of the side-effect queue.
#[derive(Debug, Clone)]
pub struct EffectQueue {
    tx: mpsc::UnboundedSender<SideEffect>,
}

impl EffectQueue {
    /// Start the worker on the current runtime.
    pub fn spawn(mailer: Mailer, sheets: SheetSink) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(rx, mailer, sheets));
        (Self { tx }, handle)
    }

    /// Start the worker if a runtime is available; otherwise effects are
    /// logged and discarded.
    pub fn start(mailer: Mailer, sheets: SheetSink) -> Self {
        match tokio::runtime::Handle::try_current() {
            Ok(_) => Self::spawn(mailer, sheets).0,
            Err(_) => {
                tracing::warn!("no async runtime: side effects will be discarded");
                let (tx, _rx) = mpsc::unbounded_channel();
                Self { tx }
            }
        }
    }

    /// Queue an effect. Never blocks and never fails the caller.
    pub fn enqueue(&self, effect: SideEffect) {
        let kind = effect.kind();
        if self.tx.send(effect).is_err() {
            tracing::warn!(kind, "side-effect worker is gone, effect dropped");
        }
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<SideEffect>, mailer: Mailer, sheets: SheetSink) {
    tracing::debug!("side-effect worker started");
    while let Some(effect) = rx.recv().await {
        apply(&mailer, &sheets, effect).await;
    }
    tracing::debug!("side-effect worker stopped");
}

async fn apply(mailer: &Mailer, sheets: &SheetSink, effect: SideEffect) {
    match effect {
        SideEffect::SendEmail(mail) => {
            let to = mail.to.clone();
            let subject = mail.subject.clone();
            if let Err(e) = mailer.send(mail).await {
                tracing::warn!(to = %to, subject = %subject, error = %e, "background mail failed");
            }
        }
        SideEffect::AppendPaymentRow { payment_id, row } => {
            if let Err(e) = sheets.append(row).await {
                tracing::warn!(payment_id = %payment_id, error = %e, "payment row append failed");
            }
        }
        SideEffect::AppendRegistrationRow { email, row } => {
            if let Err(e) = sheets.append(row).await {
                tracing::warn!(email = %email, error = %e, "registration row append failed");
            }
        }
        SideEffect::AppendSubmissionRow { code, row } => {
            if let Err(e) = sheets.append(row).await {
                tracing::warn!(code = %code, error = %e, "submission row append failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::PAYMENTS_SHEET;
    use std::time::Duration;

    #[tokio::test]
    async fn worker_delivers_in_order() {
        let mailer = Mailer::outbox();
        let sheets = SheetSink::outbox();
        let (queue, handle) = EffectQueue::spawn(mailer.clone(), sheets.clone());

        queue.enqueue(SideEffect::SendEmail(OutgoingMail {
            to: "a@x.org".into(),
            subject: "one".into(),
            body: String::new(),
        }));
        queue.enqueue(SideEffect::AppendPaymentRow {
            payment_id: "pay_1".into(),
            row: SheetRow {
                sheet: PAYMENTS_SHEET,
                values: vec!["pay_1".into()],
            },
        });
        drop(queue);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(sheets.rows()[0].values, vec!["pay_1".to_string()]);
    }

    #[tokio::test]
    async fn failing_effect_does_not_stop_worker() {
        // An unparsable recipient fails only on the SMTP path, so use a sheet
        // sink pointed at a closed port to force an error.
        let sheets = SheetSink::from_config(Some(&crate::config::SheetsConfig {
            api_url: "http://127.0.0.1:9".parse().unwrap(),
            spreadsheet_id: "s".into(),
            access_token: zeroize::Zeroizing::new("t".into()),
        }))
        .unwrap();
        let mailer = Mailer::outbox();
        let (queue, handle) = EffectQueue::spawn(mailer.clone(), sheets);

        queue.enqueue(SideEffect::AppendRegistrationRow {
            email: "a@x.org".into(),
            row: SheetRow {
                sheet: PAYMENTS_SHEET,
                values: vec![],
            },
        });
        queue.enqueue(SideEffect::SendEmail(OutgoingMail {
            to: "a@x.org".into(),
            subject: "after".into(),
            body: String::new(),
        }));
        drop(queue);
        tokio::time::timeout(Duration::from_secs(35), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(mailer.sent()[0].subject, "after");
    }
}
