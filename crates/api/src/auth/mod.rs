//! Service-identity verification.
//!
//! - [`token`] -- HS256 service-token issuing and validation.
//! - [`IdentityVerifier`] -- the policy the identity gate delegates to, with
//!   a token-based and a legacy header-based implementation.

pub mod token;

use std::sync::Arc;

use archibus_core::error::CoreError;
use archibus_core::identity::ServiceIdentity;
use archibus_core::validation::validate_service_name;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::config::{IdentityMode, ServerConfig};
use token::{validate_service_token, TokenConfig};

/// Header carrying the caller's service name in header mode.
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// Establishes who is calling from the request headers.
pub trait IdentityVerifier: Send + Sync {
    /// Return the verified caller or [`CoreError::Unauthorized`].
    fn verify(&self, headers: &HeaderMap) -> Result<ServiceIdentity, CoreError>;
}

/// Verifies `Authorization: Bearer <service token>`.
pub struct TokenVerifier {
    config: TokenConfig,
}

impl TokenVerifier {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }
}

impl IdentityVerifier for TokenVerifier {
    fn verify(&self, headers: &HeaderMap) -> Result<ServiceIdentity, CoreError> {
        let auth_header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CoreError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            CoreError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = validate_service_token(token, &self.config)
            .map_err(|_| CoreError::Unauthorized("Invalid or expired service token".into()))?;

        let service = validate_service_name(&claims.sub)
            .map_err(|_| CoreError::Unauthorized("Service token names no service".into()))?;
        Ok(ServiceIdentity::new(service))
    }
}

/// Trusts a plain `X-Service-Name` header.
#[derive(Debug, Default)]
pub struct HeaderVerifier;

impl IdentityVerifier for HeaderVerifier {
    fn verify(&self, headers: &HeaderMap) -> Result<ServiceIdentity, CoreError> {
        let name = headers
            .get(SERVICE_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CoreError::Unauthorized("Missing X-Service-Name header".into()))?;

        let service = validate_service_name(name)
            .map_err(|_| CoreError::Unauthorized("Empty X-Service-Name header".into()))?;
        Ok(ServiceIdentity::new(service))
    }
}

/// Build the verifier selected by configuration.
///
/// # Panics
///
/// Panics in token mode when no token configuration was loaded.
pub fn verifier_from_config(config: &ServerConfig) -> Arc<dyn IdentityVerifier> {
    match config.identity_mode {
        IdentityMode::Token => {
            let token = config
                .token
                .clone()
                .expect("token identity mode requires SERVICE_TOKEN_SECRET");
            Arc::new(TokenVerifier::new(token))
        }
        IdentityMode::Header => {
            tracing::warn!("Identity mode 'header' trusts X-Service-Name unverified");
            Arc::new(HeaderVerifier)
        }
    }
}
