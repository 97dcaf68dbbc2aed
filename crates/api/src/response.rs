//! Shared response envelope types for API handlers.
//!
//! List responses use a `{ "data": ... }` envelope. Publish, subscribe and
//! unsubscribe keep their flat bodies because producers parse them directly.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body of a successful publish.
#[derive(Debug, Serialize)]
pub struct PublishedResponse {
    pub status: &'static str,
    pub event_id: String,
}

/// Body of an unsubscribe, whether or not the id existed.
#[derive(Debug, Serialize)]
pub struct UnsubscribedResponse {
    pub status: &'static str,
}
