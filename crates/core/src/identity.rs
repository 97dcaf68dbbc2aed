//! Verified caller identity.

use std::fmt;

use serde::Serialize;

/// The logical name of a service whose credential was verified by the
/// identity gate. Never taken from a request body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceIdentity {
    pub service: String,
}

impl ServiceIdentity {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.service
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service)
    }
}
