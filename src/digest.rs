//! SOAP envelope digest.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Computes the `SOAPEnvelope=` part of a cache key from the body bytes.
pub trait EnvelopeDigest: Send + Sync {
    fn digest(&self, body: &[u8]) -> String;
}

/// SHA-256, base64 encoded. The default digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Base64;

impl EnvelopeDigest for Sha256Base64 {
    fn digest(&self, body: &[u8]) -> String {
        envelope_digest(body)
    }
}

/// Base64 (standard alphabet, padded) SHA-256 of the exact body bytes.
///
/// Each call hashes with its own context, so concurrent callers never share state.
pub fn envelope_digest(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            envelope_digest(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_eq!(
            envelope_digest(b"abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn test_sha256_digest_matches_function() {
        assert_eq!(Sha256Base64.digest(b"<xml/>"), envelope_digest(b"<xml/>"));
    }

    #[test]
    fn test_digest_is_byte_exact() {
        assert_ne!(envelope_digest(b"<xml/>"), envelope_digest(b"<xml/> "));
        assert_eq!(envelope_digest(b"<xml/>").len(), 44);
    }

    #[test]
    fn test_concurrent_digests_agree() {
        let expected = envelope_digest(b"<soap:Envelope/>");
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| envelope_digest(b"<soap:Envelope/>")))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
