//! # Service Configuration
//!
//! Every setting comes from the environment and is read once at start-up.
//! Optional integrations are disabled when their variables are absent:
//!
//! | Integration | Enabled by | Absent means |
//! |-------------|-----------|--------------|
//! | Bearer auth | `JWT_SECRET` | dev mode, every caller is admin |
//! | Admin login | `ADMIN_EMAIL` + `ADMIN_PASSWORD_HASH` | admin login returns 503 |
//! | Razorpay | `RAZORPAY_KEY_ID` + `RAZORPAY_KEY_SECRET` | order endpoints return 503 |
//! | Webhooks | `RAZORPAY_WEBHOOK_SECRET` | every delivery is rejected |
//! | PhonePe | `PHONEPE_MERCHANT_ID` + `PHONEPE_SALT_KEY` | PhonePe endpoints return 503 |
//! | SMTP | `SMTP_HOST` | mail goes to the in-memory outbox |
//! | Sheets | `SHEETS_SPREADSHEET_ID` | rows go to the in-memory outbox |
//!
//! Secrets are held in [`Zeroizing`] buffers and redacted from `Debug`.

use std::path::PathBuf;

use confreg_gateway::{GatewayConfig, PhonePeConfig};
use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

/// Largest accepted admin upload.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com";

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable required by an enabled integration is absent.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A variable is present but unusable.
    #[error("{var} is invalid: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Parse failure.
        reason: String,
    },

    /// Payment provider configuration failed.
    #[error(transparent)]
    Gateway(#[from] confreg_gateway::ConfigError),
}

/// Outbound SMTP relay.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    /// `From:` mailbox, e.g. `Conference <noreply@conf.example>`.
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .finish()
    }
}

/// Spreadsheet the payment and registration rows are appended to.
#[derive(Clone)]
pub struct SheetsConfig {
    pub api_url: Url,
    pub spreadsheet_id: String,
    pub access_token: Zeroizing<String>,
}

impl std::fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("api_url", &self.api_url.as_str())
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Credentials the admin logs in with. The password is stored as an argon2
/// PHC string, never in plain text.
#[derive(Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password_hash: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// HS256 secret for bearer tokens. `None` disables authentication.
    pub jwt_secret: Option<Zeroizing<String>>,
    pub admin: Option<AdminCredentials>,
    /// Shared secret for `x-razorpay-signature`.
    pub webhook_secret: Option<Zeroizing<String>>,
    /// Event name used in mail subjects.
    pub event_name: String,
    /// Receives a copy of every new registration.
    pub admin_notify_email: Option<String>,
    /// Where gated downloads are stored.
    pub downloads_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub gateway: Option<GatewayConfig>,
    pub phonepe: Option<PhonePeConfig>,
    pub smtp: Option<SmtpConfig>,
    pub sheets: Option<SheetsConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("admin", &self.admin)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("event_name", &self.event_name)
            .field("admin_notify_email", &self.admin_notify_email)
            .field("downloads_dir", &self.downloads_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("gateway", &self.gateway)
            .field("phonepe", &self.phonepe)
            .field("smtp", &self.smtp)
            .field("sheets", &self.sheets)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            jwt_secret: None,
            admin: None,
            webhook_secret: None,
            event_name: "Conference".to_string(),
            admin_notify_email: None,
            downloads_dir: PathBuf::from("./public/downloads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            gateway: None,
            phonepe: None,
            smtp: None,
            sheets: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: format!("{e}"),
            })?,
            None => defaults.port,
        };

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD_HASH")) {
            (Some(email), Some(password_hash)) => Some(AdminCredentials {
                email: email.trim().to_ascii_lowercase(),
                password_hash,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD_HASH")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: match get("SMTP_PORT") {
                    Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                        var: "SMTP_PORT",
                        reason: format!("{e}"),
                    })?,
                    None => DEFAULT_SMTP_PORT,
                },
                username: get("SMTP_USERNAME"),
                password: get("SMTP_PASSWORD").map(Zeroizing::new),
                from: get("MAIL_FROM").ok_or(ConfigError::Missing("MAIL_FROM"))?,
            }),
            None => None,
        };

        let sheets = match get("SHEETS_SPREADSHEET_ID") {
            Some(spreadsheet_id) => {
                let raw = get("SHEETS_API_URL").unwrap_or_else(|| DEFAULT_SHEETS_API_URL.into());
                let api_url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    var: "SHEETS_API_URL",
                    reason: e.to_string(),
                })?;
                Some(SheetsConfig {
                    api_url,
                    spreadsheet_id,
                    access_token: Zeroizing::new(
                        get("SHEETS_ACCESS_TOKEN").ok_or(ConfigError::Missing("SHEETS_ACCESS_TOKEN"))?,
                    ),
                })
            }
            None => None,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "MAX_UPLOAD_BYTES",
                reason: format!("{e}"),
            })?,
            None => defaults.max_upload_bytes,
        };

        Ok(Self {
            port,
            jwt_secret: get("JWT_SECRET").map(Zeroizing::new),
            admin,
            webhook_secret: get("RAZORPAY_WEBHOOK_SECRET").map(Zeroizing::new),
            event_name: get("EVENT_NAME").unwrap_or(defaults.event_name),
            admin_notify_email: get("ADMIN_NOTIFY_EMAIL"),
            downloads_dir: get("DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            max_upload_bytes,
            gateway: GatewayConfig::from_lookup(&get)?,
            phonepe: PhonePeConfig::from_lookup(&get)?,
            smtp,
            sheets,
        })
    }
}
