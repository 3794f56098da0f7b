//! App-proxy signature verification.
//!
//! The storefront proxy signs every request with HMAC-SHA-256 over a
//! canonical serialization of the query string plus the raw body. The
//! signature arrives either in the `X-Shopify-Hmac-Sha256` header or in
//! a `signature`/`hmac` query parameter, hex-encoded. Comparison is
//! constant-time. Neither the signature nor the secret is ever logged;
//! callers log [`VerifyError::reason_code`] only.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew for the optional `timestamp` parameter.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Query keys that carry the signature itself and are excluded from the
/// signed message.
const SIGNATURE_KEYS: [&str; 3] = ["signature", "hmac", "shopify_hmac"];

/// Why verification failed. The HTTP layer maps every variant except
/// `Internal` to 401 with no body detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    MissingSignature,
    InvalidTimestamp,
    TimestampOutOfRange,
    HmacMismatch,
    Internal,
}

impl VerifyError {
    /// Stable reason code for structured logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            VerifyError::MissingSignature => "missing_signature",
            VerifyError::InvalidTimestamp => "invalid_timestamp",
            VerifyError::TimestampOutOfRange => "timestamp_out_of_range",
            VerifyError::HmacMismatch => "hmac_mismatch",
            VerifyError::Internal => "internal_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            VerifyError::Internal => 500,
            _ => 401,
        }
    }
}

/// A cryptographically accepted request. The signature is carried onward
/// so the router can run the replay check against the session actor.
#[derive(Debug)]
pub struct VerifiedRequest {
    pub signature: String,
}

/// Verify a proxied request.
///
/// `query` is the decoded query string in arrival order (multi-values
/// preserved); `header_signature` is the `X-Shopify-Hmac-Sha256` value
/// when present; `now_secs` is the current unix time.
pub fn verify(
    secret: &str,
    query: &[(String, String)],
    header_signature: Option<&str>,
    body: &[u8],
    now_secs: i64,
) -> Result<VerifiedRequest, VerifyError> {
    if secret.is_empty() {
        return Err(VerifyError::Internal);
    }

    let provided = header_signature
        .map(str::to_owned)
        .or_else(|| {
            query
                .iter()
                .find(|(k, _)| k == "signature" || k == "hmac")
                .map(|(_, v)| v.clone())
        })
        .filter(|s| !s.is_empty())
        .ok_or(VerifyError::MissingSignature)?;

    if let Some((_, ts)) = query.iter().find(|(k, _)| k == "timestamp") {
        let ts: i64 = ts.parse().map_err(|_| VerifyError::InvalidTimestamp)?;
        if (now_secs - ts).abs() > TIMESTAMP_TOLERANCE_SECS {
            return Err(VerifyError::TimestampOutOfRange);
        }
    }

    let message = canonical_message(query, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerifyError::Internal)?;
    mac.update(&message);
    let expected = hex::encode(mac.finalize().into_bytes());

    let provided = provided.to_ascii_lowercase();
    if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() != 1 {
        return Err(VerifyError::HmacMismatch);
    }

    Ok(VerifiedRequest {
        signature: provided,
    })
}

/// Build the signed message: query parameters minus the signature keys,
/// grouped by key (multi-values joined with commas, arrival order kept),
/// keys sorted, serialized as `k=v` joined with `&`, then the raw body
/// bytes appended.
pub fn canonical_message(query: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, value) in query {
        if SIGNATURE_KEYS.contains(&key.as_str()) {
            continue;
        }
        grouped.entry(key.as_str()).or_default().push(value.as_str());
    }

    let serialized = grouped
        .iter()
        .map(|(key, values)| format!("{key}={}", values.join(",")))
        .collect::<Vec<_>>()
        .join("&");

    let mut message = serialized.into_bytes();
    message.extend_from_slice(body);
    message
}

/// Sign a message the way the proxy does. Shared with tests and the dev
/// tooling; hex output.
pub fn sign(secret: &str, query: &[(String, String)], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(&canonical_message(query, body));
    hex::encode(mac.finalize().into_bytes())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "shpss_test_secret";

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn canonical_message_sorts_and_groups() {
        let query = q(&[("b", "2"), ("a", "1"), ("signature", "xxx"), ("a", "3")]);
        let message = canonical_message(&query, b"body");
        assert_eq!(message, b"a=1,3&b=2body");
    }

    #[test]
    fn canonical_message_excludes_all_signature_keys() {
        let query = q(&[("hmac", "x"), ("shopify_hmac", "y"), ("shop", "s.myshopify.com")]);
        let message = canonical_message(&query, b"");
        assert_eq!(message, b"shop=s.myshopify.com");
    }

    #[test]
    fn verify_accepts_query_signature() {
        let mut query = q(&[("shop", "s.myshopify.com"), ("path_prefix", "/apps/assistant")]);
        let body = br#"{"message":"hej"}"#;
        let sig = sign(SECRET, &query, body);
        query.push(("signature".into(), sig.clone()));

        let verified = verify(SECRET, &query, None, body, 1_700_000_000).unwrap();
        assert_eq!(verified.signature, sig);
    }

    #[test]
    fn verify_accepts_header_signature() {
        let query = q(&[("shop", "s.myshopify.com")]);
        let body = b"{}";
        let sig = sign(SECRET, &query, body);

        assert!(verify(SECRET, &query, Some(&sig), body, 0).is_ok());
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let query = q(&[("shop", "s.myshopify.com")]);
        let sig = sign(SECRET, &query, b"").to_ascii_uppercase();
        assert!(verify(SECRET, &query, Some(&sig), b"", 0).is_ok());
    }

    #[test]
    fn verify_rejects_missing_signature() {
        let query = q(&[("shop", "s.myshopify.com")]);
        let err = verify(SECRET, &query, None, b"", 0).unwrap_err();
        assert_eq!(err, VerifyError::MissingSignature);
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let query = q(&[("shop", "s.myshopify.com")]);
        let sig = sign(SECRET, &query, b"original");
        let err = verify(SECRET, &query, Some(&sig), b"tampered", 0).unwrap_err();
        assert_eq!(err, VerifyError::HmacMismatch);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let query = q(&[("shop", "s.myshopify.com")]);
        let sig = sign("other_secret", &query, b"x");
        let err = verify(SECRET, &query, Some(&sig), b"x", 0).unwrap_err();
        assert_eq!(err, VerifyError::HmacMismatch);
    }

    #[test]
    fn timestamp_301_seconds_old_is_rejected() {
        let now = 1_700_000_000;
        let mut query = q(&[("shop", "s.myshopify.com")]);
        query.push(("timestamp".into(), (now - 301).to_string()));
        let sig = sign(SECRET, &query, b"");
        let err = verify(SECRET, &query, Some(&sig), b"", now).unwrap_err();
        assert_eq!(err, VerifyError::TimestampOutOfRange);
    }

    #[test]
    fn timestamp_299_seconds_old_is_accepted() {
        let now = 1_700_000_000;
        let mut query = q(&[("shop", "s.myshopify.com")]);
        query.push(("timestamp".into(), (now - 299).to_string()));
        let sig = sign(SECRET, &query, b"");
        assert!(verify(SECRET, &query, Some(&sig), b"", now).is_ok());
    }

    #[test]
    fn timestamp_in_the_future_is_bounded_too() {
        let now = 1_700_000_000;
        let mut query = q(&[("shop", "s.myshopify.com")]);
        query.push(("timestamp".into(), (now + 301).to_string()));
        let sig = sign(SECRET, &query, b"");
        assert_eq!(
            verify(SECRET, &query, Some(&sig), b"", now).unwrap_err(),
            VerifyError::TimestampOutOfRange
        );
    }

    #[test]
    fn garbled_timestamp_is_invalid() {
        let mut query = q(&[("shop", "s.myshopify.com")]);
        query.push(("timestamp".into(), "yesterday".into()));
        let sig = sign(SECRET, &query, b"");
        assert_eq!(
            verify(SECRET, &query, Some(&sig), b"", 0).unwrap_err(),
            VerifyError::InvalidTimestamp
        );
    }

    #[test]
    fn empty_secret_is_internal_error() {
        let err = verify("", &[], Some("sig"), b"", 0).unwrap_err();
        assert_eq!(err, VerifyError::Internal);
        assert_eq!(err.http_status(), 500);
    }
}
