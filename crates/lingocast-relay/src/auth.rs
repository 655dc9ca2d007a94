//! Broadcaster authorization.
//!
//! The relay treats the capability token as an externally-issued,
//! verifiable credential: a signed HS256 JWT checked against a shared
//! secret. Verification is a pure function with no side effects,
//! consulted synchronously on every broadcaster registration. The relay
//! never issues tokens; that lives at the HTTP surface.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a broadcaster capability token.
///
/// Shared with the issuing endpoint so both sides agree on the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastClaims {
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Stateless check consulted by broadcaster registration.
///
/// A trait seam so tests can substitute a canned decision.
pub trait AuthorizeBroadcaster: Send + Sync {
    /// Whether the presented token is a valid, unexpired capability.
    fn verify(&self, token: &str) -> bool;
}

/// HS256 signature-and-expiry verification against a shared secret.
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for the given shared secret.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl AuthorizeBroadcaster for TokenVerifier {
    fn verify(&self, token: &str) -> bool {
        decode::<BroadcastClaims>(token, &self.decoding, &self.validation).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, ttl_secs: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = BroadcastClaims {
            iat: now,
            exp: now + ttl_secs,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_verifies() {
        let verifier = TokenVerifier::new("shared-secret");
        assert!(verifier.verify(&make_token("shared-secret", 3600)));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let verifier = TokenVerifier::new("shared-secret");
        assert!(!verifier.verify(&make_token("other-secret", 3600)));
    }

    #[test]
    fn test_expired_token_fails() {
        let verifier = TokenVerifier::new("shared-secret");
        // jsonwebtoken applies default leeway, so expire well in the past.
        assert!(!verifier.verify(&make_token("shared-secret", -600)));
    }

    #[test]
    fn test_malformed_token_fails() {
        let verifier = TokenVerifier::new("shared-secret");
        assert!(!verifier.verify("not-a-jwt"));
        assert!(!verifier.verify(""));
    }
}
