//! Input validation shared by the bus service and the HTTP layer.
//!
//! Every check returns [`CoreError::Validation`] so callers can reject a
//! request before any component mutates state.

use crate::error::CoreError;

/// Maximum length of an event type (topic) name.
pub const MAX_EVENT_TYPE_LEN: usize = 255;

/// Maximum length of a caller-supplied event or subscription id.
pub const MAX_ID_LEN: usize = 128;

/// Maximum length of a service name.
pub const MAX_SERVICE_NAME_LEN: usize = 128;

/// Validate and normalize an event type, returning the trimmed name.
///
/// Topics are matched by exact string equality, so embedded whitespace is
/// rejected rather than silently collapsed.
pub fn validate_event_type(event_type: &str) -> Result<&str, CoreError> {
    let trimmed = event_type.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("event_type must not be empty".into()));
    }
    if trimmed.len() > MAX_EVENT_TYPE_LEN {
        return Err(CoreError::Validation(format!(
            "event_type must be at most {MAX_EVENT_TYPE_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(
            "event_type must not contain whitespace".into(),
        ));
    }
    Ok(trimmed)
}

/// Event payloads are opaque to the bus but must be a JSON object.
pub fn validate_payload(payload: &serde_json::Value) -> Result<(), CoreError> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(CoreError::Validation("payload must be a JSON object".into()))
    }
}

/// Validate a caller-supplied identifier (`event_id` or subscription `id`).
pub fn validate_identifier<'a>(field: &str, id: &'a str) -> Result<&'a str, CoreError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(CoreError::Validation(format!(
            "{field} must be at most {MAX_ID_LEN} characters"
        )));
    }
    Ok(trimmed)
}

/// Validate a logical service name (publisher or subscriber identity).
pub fn validate_service_name(name: &str) -> Result<&str, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("service name must not be empty".into()));
    }
    if trimmed.len() > MAX_SERVICE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "service name must be at most {MAX_SERVICE_NAME_LEN} characters"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn event_type_is_trimmed() {
        assert_eq!(validate_event_type("  goal.created ").unwrap(), "goal.created");
    }

    #[test]
    fn empty_event_type_is_rejected() {
        assert_matches!(validate_event_type("   "), Err(CoreError::Validation(_)));
    }

    #[test]
    fn event_type_with_inner_space_is_rejected() {
        assert_matches!(validate_event_type("goal created"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn overlong_event_type_is_rejected() {
        let long = "a".repeat(MAX_EVENT_TYPE_LEN + 1);
        assert_matches!(validate_event_type(&long), Err(CoreError::Validation(_)));
    }

    #[test]
    fn payload_must_be_object() {
        assert!(validate_payload(&serde_json::json!({"goal_id": "g1"})).is_ok());
        assert!(validate_payload(&serde_json::json!({})).is_ok());
        assert_matches!(
            validate_payload(&serde_json::json!([1, 2])),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_payload(&serde_json::Value::Null),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn identifier_error_names_the_field() {
        let err = validate_identifier("event_id", "").unwrap_err();
        assert!(err.to_string().contains("event_id"));
    }

    #[test]
    fn identifier_is_trimmed() {
        assert_eq!(validate_identifier("id", " sub-1 ").unwrap(), "sub-1");
    }

    #[test]
    fn service_name_limits() {
        assert!(validate_service_name("analytics").is_ok());
        assert_matches!(validate_service_name(""), Err(CoreError::Validation(_)));
        let long = "s".repeat(MAX_SERVICE_NAME_LEN + 1);
        assert_matches!(validate_service_name(&long), Err(CoreError::Validation(_)));
    }
}
