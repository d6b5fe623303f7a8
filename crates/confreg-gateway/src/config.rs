//! Payment provider configuration.
//!
//! Both providers are optional. `from_env` returns `Ok(None)` when the
//! provider's credentials are absent so the service can start without it;
//! a half-configured provider is an error.

use url::Url;
use zeroize::Zeroizing;

const DEFAULT_RAZORPAY_API_URL: &str = "https://api.razorpay.com";
const DEFAULT_PHONEPE_API_BASE: &str = "https://api.phonepe.com/apis/hermes";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Razorpay credentials and endpoint.
///
/// Custom `Debug` implementation redacts the key secret.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Base URL of the orders API. Default: <https://api.razorpay.com>
    pub api_url: Url,
    /// Public key id, also handed to the checkout widget.
    pub key_id: String,
    /// Key secret. Signs checkout confirmations and authenticates API calls.
    pub key_secret: Zeroizing<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_url", &self.api_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    ///
    /// Variables:
    /// - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET` (both or neither)
    /// - `RAZORPAY_API_URL` (default: `https://api.razorpay.com`)
    /// - `GATEWAY_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let key_id = non_empty(lookup("RAZORPAY_KEY_ID"));
        let key_secret = non_empty(lookup("RAZORPAY_KEY_SECRET"));
        let (key_id, key_secret) = match (key_id, key_secret) {
            (None, None) => return Ok(None),
            (Some(id), Some(secret)) => (id, secret),
            (None, Some(_)) => return Err(ConfigError::Missing("RAZORPAY_KEY_ID")),
            (Some(_), None) => return Err(ConfigError::Missing("RAZORPAY_KEY_SECRET")),
        };
        Ok(Some(Self {
            api_url: lookup_url(&lookup, "RAZORPAY_API_URL", DEFAULT_RAZORPAY_API_URL)?,
            key_id,
            key_secret: Zeroizing::new(key_secret),
            timeout_secs: timeout(&lookup),
        }))
    }

    /// A configuration pointing at a local mock server.
    pub fn local_mock(base_url: &str, key_id: &str, key_secret: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_url("base_url", base_url)?,
            key_id: key_id.to_string(),
            key_secret: Zeroizing::new(key_secret.to_string()),
            timeout_secs: 5,
        })
    }
}

/// PhonePe merchant credentials and endpoint.
///
/// Custom `Debug` implementation redacts the salt key.
#[derive(Clone)]
pub struct PhonePeConfig {
    /// Base URL of the PG API, up to and excluding `/pg/v1`.
    pub api_base: Url,
    /// Merchant id.
    pub merchant_id: String,
    /// Salt key used in the `X-VERIFY` checksum.
    pub salt_key: Zeroizing<String>,
    /// Salt key index appended to the checksum.
    pub salt_index: String,
    /// Where the pay page sends the browser after payment.
    pub redirect_url: String,
    /// Server-to-server callback URL.
    pub callback_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PhonePeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhonePeConfig")
            .field("api_base", &self.api_base)
            .field("merchant_id", &self.merchant_id)
            .field("salt_key", &"[REDACTED]")
            .field("salt_index", &self.salt_index)
            .field("redirect_url", &self.redirect_url)
            .field("callback_url", &self.callback_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PhonePeConfig {
    /// Load from the process environment.
    ///
    /// Variables:
    /// - `PHONEPE_MERCHANT_ID`, `PHONEPE_SALT_KEY` (both or neither)
    /// - `PHONEPE_SALT_INDEX` (default: `1`)
    /// - `PHONEPE_API_BASE` (default: `https://api.phonepe.com/apis/hermes`)
    /// - `PHONEPE_REDIRECT_URL`, `PHONEPE_CALLBACK_URL` (default: empty)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let merchant_id = non_empty(lookup("PHONEPE_MERCHANT_ID"));
        let salt_key = non_empty(lookup("PHONEPE_SALT_KEY"));
        let (merchant_id, salt_key) = match (merchant_id, salt_key) {
            (None, None) => return Ok(None),
            (Some(m), Some(s)) => (m, s),
            (None, Some(_)) => return Err(ConfigError::Missing("PHONEPE_MERCHANT_ID")),
            (Some(_), None) => return Err(ConfigError::Missing("PHONEPE_SALT_KEY")),
        };
        Ok(Some(Self {
            api_base: lookup_url(&lookup, "PHONEPE_API_BASE", DEFAULT_PHONEPE_API_BASE)?,
            merchant_id,
            salt_key: Zeroizing::new(salt_key),
            salt_index: non_empty(lookup("PHONEPE_SALT_INDEX")).unwrap_or_else(|| "1".into()),
            redirect_url: lookup("PHONEPE_REDIRECT_URL").unwrap_or_default(),
            callback_url: lookup("PHONEPE_CALLBACK_URL").unwrap_or_default(),
            timeout_secs: timeout(&lookup),
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn timeout(lookup: &impl Fn(&str) -> Option<String>) -> u64 {
    lookup("GATEWAY_TIMEOUT_SECS")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn lookup_url(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: &str,
) -> Result<Url, ConfigError> {
    let raw = non_empty(lookup(var)).unwrap_or_else(|| default.to_string());
    parse_url(var, &raw)
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One half of a credential pair is set without the other.
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    /// A URL variable did not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
