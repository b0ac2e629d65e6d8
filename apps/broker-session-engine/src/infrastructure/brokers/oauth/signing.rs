//! Request hashing and signing for the OAuth broker.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 hex of `"{client_id}:{secret_key}"`.
#[must_use]
pub fn app_id_hash(client_id: &str, secret_key: &str) -> String {
    hex::encode(Sha256::digest(format!("{client_id}:{secret_key}").as_bytes()))
}

/// HMAC-SHA256 hex of `"{client_id}:{secret_key}"` keyed by `secret_key`.
#[must_use]
pub fn refresh_signature(client_id: &str, secret_key: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret_key.as_bytes()) else {
        return String::new();
    };
    mac.update(format!("{client_id}:{secret_key}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_hash_joins_with_colon() {
        assert_eq!(
            app_id_hash("a", "b"),
            hex::encode(Sha256::digest(b"a:b"))
        );
        assert_eq!(app_id_hash("a", "b").len(), 64);
        assert_ne!(app_id_hash("a", "b"), app_id_hash("a", "c"));
    }

    #[test]
    fn signature_is_deterministic_and_keyed() {
        let sig = refresh_signature("CLIENT-100", "SECRET");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, refresh_signature("CLIENT-100", "SECRET"));
        assert_ne!(sig, refresh_signature("CLIENT-100", "OTHER"));
    }

    #[test]
    fn signature_matches_rfc4231_style_vector() {
        // HMAC-SHA256(key="key", msg="The quick brown fox jumps over the lazy dog")
        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }
}
