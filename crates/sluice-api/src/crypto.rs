//! Webhook signature verification.
//!
//! HMAC-SHA256 over the raw request body, compared in constant time.
//! Accepts the `sha256=<hex>` prefixed form and bare 64-character hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signature verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Signature header was absent or empty.
    #[error("signature missing")]
    Missing,
    /// Signature is not in a recognized format.
    #[error("malformed signature: {0}")]
    Malformed(String),
    /// Signature does not match the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies an HMAC-SHA256 signature over the raw payload.
pub fn verify_signature(
    payload: &[u8],
    signature: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    if signature.is_empty() {
        return Err(SignatureError::Missing);
    }

    let provided = parse_signature(signature)?;
    let expected = sign_payload(payload, secret)?;

    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Computes the lowercase hex HMAC-SHA256 of a payload.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::Malformed(format!("invalid secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_signature(signature: &str) -> Result<String, SignatureError> {
    let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);

    if hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex_part.to_ascii_lowercase())
    } else {
        Err(SignatureError::Malformed(format!(
            "expected 'sha256=<hex>' or 64 hex characters, got {} characters",
            hex_part.len()
        )))
    }
}

/// Byte comparison that does not short-circuit on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_signature_verifies() {
        let payload = br#"{"event_type":"user.created","event_id":"evt_1"}"#;
        let secret = "whsec_users";

        let signature = format!("sha256={}", sign_payload(payload, secret).unwrap());
        assert_eq!(verify_signature(payload, &signature, secret), Ok(()));
    }

    #[test]
    fn raw_hex_signature_verifies() {
        let payload = b"payload";
        let secret = "secret";

        let signature = sign_payload(payload, secret).unwrap();
        assert_eq!(verify_signature(payload, &signature, secret), Ok(()));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let payload = b"payload";
        let secret = "secret";

        let signature = sign_payload(payload, secret).unwrap().to_ascii_uppercase();
        assert_eq!(verify_signature(payload, &signature, secret), Ok(()));
    }

    #[test]
    fn wrong_secret_is_a_mismatch() {
        let payload = b"payload";
        let signature = sign_payload(payload, "right_secret").unwrap();
        assert_eq!(
            verify_signature(payload, &signature, "wrong_secret"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn tampered_payload_is_a_mismatch() {
        let secret = "secret";
        let signature = sign_payload(b"original", secret).unwrap();
        assert_eq!(verify_signature(b"tampered", &signature, secret), Err(SignatureError::Mismatch));
    }

    #[test]
    fn empty_signature_is_missing() {
        assert_eq!(verify_signature(b"payload", "", "secret"), Err(SignatureError::Missing));
    }

    #[test]
    fn garbage_signature_is_malformed() {
        assert!(matches!(
            verify_signature(b"payload", "not-a-signature", "secret"),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign_payload(b"payload", "secret").unwrap();
        let b = sign_payload(b"payload", "secret").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
