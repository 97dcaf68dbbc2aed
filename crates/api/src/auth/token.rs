//! Signed service tokens.
//!
//! A service token is an HS256 JWT whose `sub` is the caller's logical
//! service name. Tokens are issued out of band (see the `archibus-token`
//! binary) and verified on every gated request.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims embedded in every service token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the service name.
    pub sub: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier for audit.
    pub jti: String,
}

/// Configuration for service-token issuing and validation.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Token lifetime in minutes (default: 60).
    pub expiry_mins: i64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("expiry_mins", &self.expiry_mins)
            .finish()
    }
}

/// Default token lifetime in minutes.
const DEFAULT_EXPIRY_MINS: i64 = 60;

impl TokenConfig {
    /// Load token configuration from environment variables.
    ///
    /// | Env Var                     | Required | Default |
    /// |-----------------------------|----------|---------|
    /// | `SERVICE_TOKEN_SECRET`      | **yes**  | --      |
    /// | `SERVICE_TOKEN_EXPIRY_MINS` | no       | `60`    |
    ///
    /// # Panics
    ///
    /// Panics if `SERVICE_TOKEN_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret = std::env::var("SERVICE_TOKEN_SECRET")
            .expect("SERVICE_TOKEN_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "SERVICE_TOKEN_SECRET must not be empty");

        let expiry_mins: i64 = std::env::var("SERVICE_TOKEN_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_EXPIRY_MINS.to_string())
            .parse()
            .expect("SERVICE_TOKEN_EXPIRY_MINS must be a valid i64");

        Self {
            secret,
            expiry_mins,
        }
    }
}

/// Issue an HS256 token naming `service` as its subject.
pub fn issue_service_token(
    service: &str,
    config: &TokenConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: service.to_string(),
        exp: now + config.expiry_mins * 60,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate a service token, returning its [`Claims`].
///
/// Checks the signature and expiry.
pub fn validate_service_token(
    token: &str,
    config: &TokenConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            expiry_mins: 60,
        }
    }

    #[test]
    fn test_issue_and_validate_token() {
        let config = test_config();
        let token = issue_service_token("goals", &config).expect("issuing should succeed");

        let claims = validate_service_token(&token, &config).expect("validation should succeed");
        assert_eq!(claims.sub, "goals");
        assert!(claims.exp > claims.iat);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn test_expired_token_fails() {
        let config = test_config();

        // Past the default 60-second leeway.
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "goals".to_string(),
            exp: now - 300,
            iat: now - 600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .expect("encoding should succeed");

        assert!(validate_service_token(&token, &config).is_err());
    }

    #[test]
    fn test_token_signed_with_other_secret_fails() {
        let token = issue_service_token("goals", &test_config()).unwrap();
        let other = TokenConfig {
            secret: "a-completely-different-secret".to_string(),
            expiry_mins: 60,
        };
        assert!(validate_service_token(&token, &other).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("long-enough"));
    }
}
