//! HS256 bearer tokens for the dashboard surface.
//!
//! Issuance belongs to the login flow, which lives elsewhere; this module
//! only verifies. The subject is a user id. Tokens carry no tenant.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Verifies tokens signed with the shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify signature and expiry, returning the subject as a user id.
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;

        Uuid::parse_str(&data.claims.sub).map_err(|_| {
            tracing::debug!("JWT subject is not a user id");
            AuthError::InvalidToken
        })
    }
}

/// Sign a token the way the login flow does. Test helper.
#[cfg(test)]
pub fn sign_for_tests(secret: &str, user_id: Uuid, ttl: chrono::Duration) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp(),
        iat: Some(chrono::Utc::now().timestamp()),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_valid_token() {
        let user = Uuid::new_v4();
        let token = sign_for_tests(SECRET, user, Duration::hours(1));
        let verifier = JwtVerifier::new(SECRET, 0);
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign_for_tests("other", Uuid::new_v4(), Duration::hours(1));
        let err = JwtVerifier::new(SECRET, 0).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token() {
        let token = sign_for_tests(SECRET, Uuid::new_v4(), Duration::hours(-1));
        let err = JwtVerifier::new(SECRET, 30).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::ExpiredToken));
    }

    #[test]
    fn test_leeway_accepts_recently_expired() {
        let user = Uuid::new_v4();
        let token = sign_for_tests(SECRET, user, Duration::seconds(-10));
        assert_eq!(JwtVerifier::new(SECRET, 60).verify(&token).unwrap(), user);
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: (chrono::Utc::now() + Duration::hours(1)).timestamp(),
            iat: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(JwtVerifier::new(SECRET, 0).verify(&token).is_err());
    }

    #[test]
    fn test_non_uuid_subject() {
        let claims = Claims {
            sub: "not-a-uuid".into(),
            exp: (chrono::Utc::now() + Duration::hours(1)).timestamp(),
            iat: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let err = JwtVerifier::new(SECRET, 0).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(
            JwtVerifier::new(SECRET, 0).verify("abc.def.ghi"),
            Err(AuthError::InvalidToken)
        ));
    }
}
