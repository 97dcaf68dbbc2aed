//! Outbound webhook requests.
//!
//! [`DeliveryRequest::build`] turns an event and a subscription into the
//! exact bytes and headers sent to the subscriber; [`webhook`] sends them.

use std::fmt;
use std::str::FromStr;

use archibus_core::hashing::delivery_signature;
use archibus_db::models::subscription::Subscription;

use crate::envelope::EventEnvelope;

pub mod webhook;

pub const HEADER_EVENT_ID: &str = "x-event-id";
pub const HEADER_EVENT_TYPE: &str = "x-event-type";
pub const HEADER_SOURCE_SERVICE: &str = "x-source-service";
pub const HEADER_DELIVERY_ATTEMPT: &str = "x-delivery-attempt";
pub const HEADER_SIGNATURE: &str = "x-signature";

/// What goes into the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// The event payload alone. Envelope fields travel only as headers.
    #[default]
    Payload,
    /// The whole [`EventEnvelope`].
    Envelope,
}

impl FromStr for BodyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payload" => Ok(Self::Payload),
            "envelope" => Ok(Self::Envelope),
            other => Err(format!("unknown delivery body mode '{other}'")),
        }
    }
}

impl fmt::Display for BodyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Payload => "payload",
            Self::Envelope => "envelope",
        })
    }
}

/// A fully-built outbound request.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

impl DeliveryRequest {
    /// Build the request for one attempt (1-based).
    pub fn build(
        event: &EventEnvelope,
        subscription: &Subscription,
        mode: BodyMode,
        attempt: u32,
    ) -> Result<Self, serde_json::Error> {
        let body = match mode {
            BodyMode::Payload => serde_json::to_vec(&event.payload)?,
            BodyMode::Envelope => serde_json::to_vec(event)?,
        };

        let mut headers = vec![
            (HEADER_EVENT_ID, event.event_id.clone()),
            (HEADER_EVENT_TYPE, event.event_type.clone()),
            (HEADER_SOURCE_SERVICE, event.source_service.clone()),
            (HEADER_DELIVERY_ATTEMPT, attempt.to_string()),
        ];
        if let Some(secret) = subscription.secret.as_deref() {
            headers.push((HEADER_SIGNATURE, delivery_signature(secret, &body)));
        }

        Ok(Self {
            url: subscription.callback_url.clone(),
            body,
            headers,
        })
    }

    /// Value of a header by (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}
