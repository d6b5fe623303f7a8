//! HMAC-SHA256 signatures used by the payment provider.
//!
//! Two signatures exist:
//!
//! - **Webhook**: hex HMAC of the raw request body under the webhook secret,
//!   sent in `X-Razorpay-Signature`. It must be checked against the exact
//!   bytes received; a re-serialized body does not reproduce them.
//! - **Checkout**: hex HMAC of `"{order_id}|{payment_id}"` under the key
//!   secret, returned to the browser after a successful checkout.
//!
//! Comparison goes through `Mac::verify_slice`, which is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Signature check failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No signature was presented.
    #[error("signature missing")]
    Missing,
    /// The signature was not valid hex, or the secret was unusable.
    #[error("signature malformed")]
    Malformed,
    /// The signature does not match the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Hex HMAC-SHA256 of `message` under `secret`.
pub fn sign(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn verify(secret: &[u8], message: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Malformed)?;
    mac.update(message);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Verify a webhook signature over the raw, unparsed request body.
pub fn verify_webhook_signature(
    webhook_secret: &[u8],
    raw_body: &[u8],
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    verify(webhook_secret, raw_body, signature)
}

/// Verify the signature the checkout widget returns for a completed payment.
pub fn verify_checkout_signature(
    key_secret: &[u8],
    order_id: &str,
    payment_id: &str,
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    let message = format!("{order_id}|{payment_id}");
    verify(key_secret, message.as_bytes(), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";

    #[test]
    fn sign_matches_known_vector() {
        // RFC 4231 test case 2.
        let sig = sign(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn webhook_signature_round_trip() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign(SECRET, body);
        assert_eq!(verify_webhook_signature(SECRET, body, Some(&sig)), Ok(()));
    }

    #[test]
    fn reformatted_body_does_not_verify() {
        let body = br#"{"event":"payment.captured","x":1}"#;
        let sig = sign(SECRET, body);
        let reformatted = br#"{"x":1,"event":"payment.captured"}"#;
        assert_eq!(
            verify_webhook_signature(SECRET, reformatted, Some(&sig)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_mismatch() {
        let body = b"{}";
        let sig = sign(b"other", body);
        assert_eq!(
            verify_webhook_signature(SECRET, body, Some(&sig)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn missing_and_malformed_signatures() {
        assert_eq!(verify_webhook_signature(SECRET, b"{}", None), Err(SignatureError::Missing));
        assert_eq!(verify_webhook_signature(SECRET, b"{}", Some("  ")), Err(SignatureError::Missing));
        assert_eq!(
            verify_webhook_signature(SECRET, b"{}", Some("zz-not-hex")),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn checkout_signature_binds_order_and_payment() {
        let sig = sign(b"key_secret", b"order_1|pay_1");
        assert_eq!(verify_checkout_signature(b"key_secret", "order_1", "pay_1", Some(&sig)), Ok(()));
        assert_eq!(
            verify_checkout_signature(b"key_secret", "order_1", "pay_2", Some(&sig)),
            Err(SignatureError::Mismatch)
        );
    }
}
