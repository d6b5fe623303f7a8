//! # Spreadsheet Sync
//!
//! Appends one row per accepted payment, registration, abstract and paper
//! event to a Google
//! Sheets spreadsheet through the `values:append` REST endpoint. Without a
//! configured spreadsheet the rows are kept in an in-memory outbox.

use std::sync::Arc;
use std::time::Duration;

use confreg_core::{format_amount, AbstractSubmission, Paper, PaymentRecord, Registrant};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::SheetsConfig;

/// Tab payment rows are appended to.
pub const PAYMENTS_SHEET: &str = "Payments";
/// Tab registration rows are appended to.
pub const REGISTRATIONS_SHEET: &str = "Registrations";
/// Tab abstract rows are appended to.
pub const ABSTRACTS_SHEET: &str = "Abstracts";
/// Tab paper rows are appended to.
pub const PAPERS_SHEET: &str = "Papers";

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("sheets client could not be built: {0}")]
    Client(String),

    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheets API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetRow {
    pub sheet: &'static str,
    pub values: Vec<String>,
}

impl SheetRow {
    /// Timestamp, name, email, phone, country, payment id, order id, category, amount, status.
    pub fn payment(registrant: &Registrant, record: &PaymentRecord) -> Self {
        Self {
            sheet: PAYMENTS_SHEET,
            values: vec![
                record.timestamp.to_rfc3339(),
                registrant.full_name.clone(),
                registrant.email.clone(),
                registrant.phone.clone(),
                registrant.country.clone(),
                record.payment_id.clone(),
                record.order_id.clone(),
                record.category.clone(),
                format_amount(record.amount_minor, &record.currency),
                record.status.as_str().to_string(),
            ],
        }
    }

    /// Timestamp, uid, name, email, phone, country, affiliation.
    pub fn registration(registrant: &Registrant) -> Self {
        Self {
            sheet: REGISTRATIONS_SHEET,
            values: vec![
                registrant.created_at.to_rfc3339(),
                registrant.uid.to_string(),
                registrant.full_name.clone(),
                registrant.email.clone(),
                registrant.phone.clone(),
                registrant.country.clone(),
                registrant.affiliation.clone(),
            ],
        }
    }

    /// Timestamp, code, uid, title, theme, presenting type, presenting author, status, finalized.
    pub fn abstract_submission(submission: &AbstractSubmission) -> Self {
        Self {
            sheet: ABSTRACTS_SHEET,
            values: vec![
                submission.updated_at.to_rfc3339(),
                submission.abstract_code.clone(),
                submission.user_id.to_string(),
                submission.title.clone(),
                submission.theme.clone(),
                submission.presenting_type.clone(),
                submission.presenting_author_name.clone(),
                submission.status.as_str().to_string(),
                submission.is_finalized.to_string(),
            ],
        }
    }

    /// Timestamp, code, uid, title, track, type, status, overall score.
    pub fn paper(paper: &Paper) -> Self {
        let overall = paper
            .review
            .as_ref()
            .and_then(|r| r.overall_score)
            .map(|s| s.to_string())
            .unwrap_or_default();
        Self {
            sheet: PAPERS_SHEET,
            values: vec![
                paper.updated_at.to_rfc3339(),
                paper.paper_code.clone(),
                paper.user_id.to_string(),
                paper.title.clone(),
                paper.track.clone(),
                paper.paper_type.as_str().to_string(),
                paper.status.as_str().to_string(),
                overall,
            ],
        }
    }
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: [&'a [String]; 1],
}

/// Where rows go.
#[derive(Clone)]
pub enum SheetSink {
    Http {
        http: reqwest::Client,
        config: SheetsConfig,
    },
    Outbox(Arc<Mutex<Vec<SheetRow>>>),
}

impl std::fmt::Debug for SheetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { config, .. } => f.debug_struct("Http").field("config", config).finish(),
            Self::Outbox(rows) => f.debug_tuple("Outbox").field(&rows.lock().len()).finish(),
        }
    }
}

impl SheetSink {
    /// An in-memory outbox.
    pub fn outbox() -> Self {
        Self::Outbox(Arc::new(Mutex::new(Vec::new())))
    }

    /// The Sheets API when configured, the outbox otherwise.
    pub fn from_config(config: Option<&SheetsConfig>) -> Result<Self, SheetsError> {
        let Some(config) = config else {
            tracing::warn!("spreadsheet sync not configured: rows will be kept in memory");
            return Ok(Self::outbox());
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SheetsError::Client(e.to_string()))?;
        Ok(Self::Http {
            http,
            config: config.clone(),
        })
    }

    /// Rows captured by the outbox. Always empty for the HTTP sink.
    pub fn rows(&self) -> Vec<SheetRow> {
        match self {
            Self::Outbox(rows) => rows.lock().clone(),
            Self::Http { .. } => Vec::new(),
        }
    }

    /// Append a row.
    ///
    /// Calls `POST {api_url}/v4/spreadsheets/{id}/values/{sheet}!A1:append`.
    pub async fn append(&self, row: SheetRow) -> Result<(), SheetsError> {
        let (http, config) = match self {
            Self::Outbox(rows) => {
                tracing::debug!(sheet = row.sheet, "row captured in outbox");
                rows.lock().push(row);
                return Ok(());
            }
            Self::Http { http, config } => (http, config),
        };

        let range = format!("{}!A1:append", row.sheet);
        let mut url = config.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::Client("api_url cannot be a base".into()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                config.spreadsheet_id.as_str(),
                "values",
                range.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let resp = http
            .post(url)
            .bearer_auth(config.access_token.as_str())
            .json(&AppendBody {
                values: [&row.values],
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(SheetsError::Api { status, body });
        }
        tracing::debug!(sheet = row.sheet, "row appended");
        Ok(())
    }
}
