//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::{JwtClaims, TokenValidationError, validate_claims};

/// Decodes and verifies a bearer token into claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator over a shared secret.
///
/// Expiry is carried by [`JwtClaims::expires_at`] rather than the registered
/// `exp` claim, so the library's own time checks are disabled and
/// [`validate_claims`] runs instead.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(&secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrincipalId, Role};
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn mint(secret: &str, ttl_minutes: i64) -> (String, JwtClaims) {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            roles: vec![Role::new("admin")],
            issued_at: now - Duration::seconds(1),
            expires_at: now + Duration::minutes(ttl_minutes),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (token, claims)
    }

    #[test]
    fn accepts_token_signed_with_same_secret() {
        let (token, claims) = mint("s3cret", 10);
        let validator = Hs256JwtValidator::new(b"s3cret".to_vec());
        assert_eq!(validator.validate(&token, Utc::now()).unwrap(), claims);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let (token, _) = mint("other", 10);
        let validator = Hs256JwtValidator::new(b"s3cret".to_vec());
        assert!(matches!(
            validator.validate(&token, Utc::now()),
            Err(TokenValidationError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        let validator = Hs256JwtValidator::new(b"s3cret".to_vec());
        assert!(validator.validate("not.a.jwt", Utc::now()).is_err());
    }
}
