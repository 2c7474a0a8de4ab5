//! HS256 tokens whose `sub` claim is the tenant id.

use crate::types::{AppError, Claims, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// Signs and verifies tenant tokens with a shared secret.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_expiry: i64,
}

impl AuthService {
    /// `access_expiry` is the default token lifetime in seconds.
    pub fn new(jwt_secret: String, access_expiry: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
            access_expiry,
        }
    }

    pub fn access_expiry(&self) -> i64 {
        self.access_expiry
    }

    /// Token for a tenant with the default lifetime.
    pub fn generate_token(&self, user_id: &str, email: &str) -> Result<String> {
        self.generate_token_with_ttl(user_id, email, self.access_expiry)
    }

    /// Token valid for `ttl_secs` seconds. Used by `foodatlas-server token --ttl`.
    pub fn generate_token_with_ttl(&self, user_id: &str, email: &str, ttl_secs: i64) -> Result<String> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidInput("user id must not be empty".to_string()));
        }

        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry. A token without a tenant is rejected.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        if claims.sub.trim().is_empty() {
            return Err(AppError::Auth("Token has no tenant".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> AuthService {
        AuthService::new("test-secret-key-that-is-at-least-32-chars".to_string(), 900)
    }

    #[test]
    fn test_token_verification_success() {
        let service = create_test_service();

        let token = service
            .generate_token("user-456", "user@test.com")
            .expect("should generate token");
        let claims = service.verify_token(&token).expect("should verify token");

        assert_eq!(claims.sub, "user-456", "subject should match user_id");
        assert_eq!(claims.email, "user@test.com", "email should match");
    }

    #[test]
    fn test_token_verification_invalid_token() {
        let service = create_test_service();

        let result = service.verify_token("invalid.token.here");

        assert!(result.is_err(), "invalid token should fail verification");
    }

    #[test]
    fn test_token_verification_wrong_secret() {
        let service1 = AuthService::new("secret-one-that-is-32-chars-long".to_string(), 900);
        let service2 = AuthService::new("secret-two-that-is-32-chars-long".to_string(), 900);

        let token = service1
            .generate_token("user-789", "test@example.com")
            .expect("should generate");

        assert!(
            service2.verify_token(&token).is_err(),
            "token from different secret should fail"
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = create_test_service();
        // Past the default 60s leeway
        let token = service
            .generate_token_with_ttl("user", "user@example.com", -300)
            .expect("should generate");

        assert!(matches!(service.verify_token(&token), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_empty_user_rejected() {
        let service = create_test_service();
        assert!(matches!(
            service.generate_token("  ", "x@example.com"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_user_id_is_trimmed() {
        let service = create_test_service();
        let token = service
            .generate_token(" owner-1 ", "o@example.com")
            .expect("should generate");
        assert_eq!(service.verify_token(&token).expect("verify").sub, "owner-1");
    }

    #[test]
    fn test_token_without_tenant_rejected() {
        let service = create_test_service();
        let claims = Claims {
            sub: String::new(),
            email: "x@example.com".to_string(),
            exp: (Utc::now().timestamp() + 600) as usize,
            iat: Utc::now().timestamp() as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-that-is-at-least-32-chars"),
        )
        .expect("encode");

        assert!(matches!(service.verify_token(&token), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_claims_expiration() {
        let service = create_test_service();
        let token = service
            .generate_token("user", "user@example.com")
            .expect("should generate");
        let claims = service.verify_token(&token).expect("should verify");

        let now = chrono::Utc::now().timestamp() as usize;

        assert!(
            claims.iat <= now && claims.iat >= now - 5,
            "iat should be current timestamp"
        );

        let expected_exp = claims.iat + 900;
        assert!(
            claims.exp >= expected_exp - 5 && claims.exp <= expected_exp + 5,
            "exp should be iat + 900 seconds"
        );
    }
}
