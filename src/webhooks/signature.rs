//! GitHub webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs the raw request body with the shared webhook secret and sends
//! the digest in `X-Hub-Signature-256` as `sha256=<hex>`. Nothing in the body
//! is trusted until [`verify_signature`] succeeds.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is not a sha256=<hex> digest")]
    Malformed,

    #[error("signature does not match the payload")]
    Mismatch,
}

/// Parses a `sha256=<hex>` header into raw digest bytes.
///
/// Returns `None` for a missing prefix, another algorithm, or bad hex.
///
/// ```
/// use webhook_workers::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.trim().strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 of a payload.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never takes the empty branch.
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Formats a digest as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Signs a payload the way GitHub does.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> String {
    format_signature_header(&compute_signature(payload, secret))
}

/// Verifies `X-Hub-Signature-256` against the raw body.
///
/// The comparison is constant-time.
///
/// ```
/// use webhook_workers::webhooks::{sign_payload, verify_signature};
///
/// let header = sign_payload(b"{}", b"shh");
/// assert!(verify_signature(b"{}", &header, b"shh").is_ok());
/// assert!(verify_signature(b"{}", &header, b"wrong").is_err());
/// ```
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let expected = parse_signature_header(signature_header).ok_or(SignatureError::Malformed)?;
    if expected.len() != 32 {
        return Err(SignatureError::Malformed);
    }

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Mismatch)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_headers() {
        assert_eq!(
            parse_signature_header("sha256=1234abcd"),
            Some(vec![0x12, 0x34, 0xab, 0xcd])
        );
        assert_eq!(
            parse_signature_header("sha256=ABCD1234"),
            Some(vec![0xab, 0xcd, 0x12, 0x34])
        );
        assert_eq!(parse_signature_header(""), None);
        assert_eq!(parse_signature_header("sha256=abc"), None);
        assert_eq!(parse_signature_header("sha1=1234abcd"), None);
    }

    /// Test vector from GitHub's "Validating webhook deliveries" guide.
    #[test]
    fn github_documentation_vector() {
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert_eq!(
            verify_signature(b"Hello, World!", header, b"It's a Secret to Everybody"),
            Ok(())
        );
        assert_eq!(
            sign_payload(b"Hello, World!", b"It's a Secret to Everybody"),
            header
        );
    }

    #[test]
    fn wrong_secret_or_body_is_mismatch() {
        let header = sign_payload(b"original", b"secret");
        assert_eq!(
            verify_signature(b"original", &header, b"other"),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(b"modified", &header, b"secret"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["", "sha256=", "sha256=zz", "sha1=abc123", "not-a-header", "sha256=abcd"] {
            assert_eq!(
                verify_signature(b"x", header, b"secret"),
                Err(SignatureError::Malformed),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let header = format!(" {} ", sign_payload(b"body", b"s"));
        assert_eq!(verify_signature(b"body", &header, b"s"), Ok(()));
    }

    proptest! {
        #[test]
        fn sign_then_verify(payload: Vec<u8>, secret: Vec<u8>) {
            let header = sign_payload(&payload, &secret);
            prop_assert_eq!(verify_signature(&payload, &header, &secret), Ok(()));
        }

        #[test]
        fn different_secret_fails(
            payload in any::<Vec<u8>>(),
            (a, b) in (1usize..64).prop_flat_map(|n| (
                prop::collection::vec(any::<u8>(), n),
                prop::collection::vec(any::<u8>(), n),
            ))
        ) {
            prop_assume!(a != b);
            let header = sign_payload(&payload, &a);
            prop_assert_eq!(
                verify_signature(&payload, &header, &b),
                Err(SignatureError::Mismatch)
            );
        }

        #[test]
        fn modified_payload_fails(original: Vec<u8>, modified: Vec<u8>, secret: Vec<u8>) {
            prop_assume!(original != modified);
            let header = sign_payload(&original, &secret);
            prop_assert!(verify_signature(&modified, &header, &secret).is_err());
        }

        #[test]
        fn arbitrary_headers_never_panic(header: String, payload: Vec<u8>) {
            let _ = verify_signature(&payload, &header, b"secret");
        }
    }
}
