//! Payment provider client error types.

/// Errors from provider API calls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        /// Endpoint label, e.g. `POST /v1/orders`.
        endpoint: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The provider returned a non-2xx status.
    #[error("payment provider {endpoint} returned {status}: {body}")]
    ApiError {
        /// Endpoint label.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        /// Endpoint label.
        endpoint: String,
        /// Underlying decode error.
        source: reqwest::Error,
    },
    /// The response parsed but lacked a field the flow depends on.
    #[error("unexpected response from {endpoint}: {detail}")]
    UnexpectedResponse {
        /// Endpoint label.
        endpoint: String,
        /// What was missing.
        detail: String,
    },
    /// An amount could not be represented in minor units.
    #[error("amount {0} overflows minor units")]
    AmountOverflow(u64),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}
