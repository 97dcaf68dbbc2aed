use std::str::FromStr;

use crate::auth::token::TokenConfig;

/// How callers prove their service identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// Signed HS256 service token in `Authorization: Bearer`.
    Token,
    /// Plain `X-Service-Name` header. Unverified; development only.
    Header,
}

impl FromStr for IdentityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "header" => Ok(Self::Header),
            other => Err(format!("unknown identity mode '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except the
/// service-token secret, which token mode requires.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Budget for draining in-flight deliveries at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL URL. `None` selects in-memory storage.
    pub database_url: Option<String>,
    /// Per-topic buffer of the local broadcast channel (default: `256`).
    pub broadcast_capacity: usize,
    /// Identity gate mode (default: `token`).
    pub identity_mode: IdentityMode,
    /// Service-token settings; present in token mode.
    pub token: Option<TokenConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `DATABASE_URL`          | unset (in-memory)       |
    /// | `BROADCAST_CAPACITY`    | `256`                   |
    /// | `IDENTITY_MODE`         | `token`                 |
    ///
    /// Token mode additionally reads [`TokenConfig::from_env`].
    ///
    /// # Panics
    ///
    /// Panics on unparseable values, and in token mode when
    /// `SERVICE_TOKEN_SECRET` is missing.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let broadcast_capacity: usize = std::env::var("BROADCAST_CAPACITY")
            .unwrap_or_else(|_| "256".into())
            .parse()
            .expect("BROADCAST_CAPACITY must be a valid usize");

        let identity_mode: IdentityMode = std::env::var("IDENTITY_MODE")
            .unwrap_or_else(|_| "token".into())
            .parse()
            .unwrap_or_else(|e| panic!("IDENTITY_MODE: {e}"));

        let token = match identity_mode {
            IdentityMode::Token => Some(TokenConfig::from_env()),
            IdentityMode::Header => None,
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            broadcast_capacity,
            identity_mode,
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mode_parses_case_insensitively() {
        assert_eq!("token".parse::<IdentityMode>(), Ok(IdentityMode::Token));
        assert_eq!(" Header ".parse::<IdentityMode>(), Ok(IdentityMode::Header));
        assert!("mtls".parse::<IdentityMode>().is_err());
    }
}
