//! Webhook sender.
//!
//! [`WebhookSender`] is the seam the dispatcher depends on; the production
//! implementation is [`HttpWebhookSender`], a thin `reqwest` POST. Retry
//! and backoff belong to the dispatcher, not to the sender: one call to
//! [`WebhookSender::send`] is exactly one attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};

use super::DeliveryRequest;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for a single failed delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    /// The attempt did not finish within its deadline.
    #[error("Webhook timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built (bad header value, unencodable body).
    #[error("Invalid webhook request: {0}")]
    InvalidRequest(String),
}

impl WebhookError {
    /// HTTP status carried by the failure, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus(code) => Some(*code),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::Timeout(_) | Self::InvalidRequest(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Performs one delivery attempt.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POST the request. `Ok` carries the 2xx status code.
    async fn send(&self, request: &DeliveryRequest) -> Result<u16, WebhookError>;
}

/// `reqwest`-backed sender. Cheap to share; the client pools connections.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    /// Build a sender whose client enforces `timeout` per request.
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("archibus/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, request: &DeliveryRequest) -> Result<u16, WebhookError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(request.body.clone());

        for (name, value) in &request.headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| WebhookError::InvalidRequest(format!("{name}: {e}")))?;
            builder = builder.header(HeaderName::from_static(*name), value);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::HttpStatus(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_does_not_fail() {
        assert!(HttpWebhookSender::new(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
        assert_eq!(err.status_code(), Some(502));
    }

    #[test]
    fn webhook_error_display_timeout() {
        let err = WebhookError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "Webhook timed out after 5s");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn webhook_error_display_request() {
        // Build a reqwest error from an invalid URL.
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = WebhookError::Request(req_err);
        assert!(err.to_string().contains("HTTP request failed"));
    }

    #[tokio::test]
    async fn unparseable_url_is_a_request_error() {
        let sender = HttpWebhookSender::new(Duration::from_secs(1)).unwrap();
        let request = DeliveryRequest {
            url: "not a url".into(),
            body: b"{}".to_vec(),
            headers: vec![],
        };
        let err = sender.send(&request).await.unwrap_err();
        assert!(matches!(err, WebhookError::Request(_)));
    }
}
