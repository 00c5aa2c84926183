//! Token decoding at the authentication seam.
//!
//! Login and token issuance belong to an external collaborator; this
//! side only verifies the signed token it hands out and extracts the
//! player identity from the `sub` claim.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use tenfold_core::player::PlayerId;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Verifies HS256 tokens minted by the login service.
pub struct TokenAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenAuthenticator {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// The player identity carried by a valid token, or `None` for
    /// anything expired, malformed, or signed with the wrong key.
    #[must_use]
    pub fn authenticate(&self, token: &str) -> Option<PlayerId> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .ok()
            .map(|data| PlayerId::new(data.claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn token(secret: &str, sub: &str, exp: usize) -> String {
        encode(
            &Header::default(),
            &TestClaims { sub: sub.into(), exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        4_102_444_800 // 2100-01-01
    }

    #[test]
    fn test_valid_token_yields_player_id() {
        let auth = TokenAuthenticator::new("secret");
        let token = token("secret", "aria", far_future());
        assert_eq!(auth.authenticate(&token), Some(PlayerId::new("aria")));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let auth = TokenAuthenticator::new("secret");
        let token = token("other-secret", "aria", far_future());
        assert!(auth.authenticate(&token).is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = TokenAuthenticator::new("secret");
        let token = token("secret", "aria", 1_600_000_000);
        assert!(auth.authenticate(&token).is_none());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let auth = TokenAuthenticator::new("secret");
        assert!(auth.authenticate("not-a-token").is_none());
    }
}
