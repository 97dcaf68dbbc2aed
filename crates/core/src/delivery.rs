//! Delivery state machine shared by the dispatcher and the delivery log.
//!
//! ```text
//! pending -> delivering -> delivered
//!            delivering -> retrying -> delivering
//!            delivering -> dead_lettered
//! pending | delivering | retrying -> cancelled
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// State of one (event, subscription) delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivering,
    Retrying,
    Delivered,
    DeadLettered,
    Cancelled,
}

impl DeliveryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivering => "delivering",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::DeadLettered => "dead_lettered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::DeadLettered | Self::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        match (self, next) {
            (Pending, Delivering) => true,
            (Pending, DeadLettered) => true,
            (Delivering, Delivered | Retrying | DeadLettered) => true,
            (Retrying, Delivering) => true,
            (Pending | Delivering | Retrying, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivering" => Ok(Self::Delivering),
            "retrying" => Ok(Self::Retrying),
            "delivered" => Ok(Self::Delivered),
            "dead_lettered" => Ok(Self::DeadLettered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Validation(format!(
                "unknown delivery state '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_form_parses_back() {
        for state in [
            DeliveryState::Pending,
            DeliveryState::Delivering,
            DeliveryState::Retrying,
            DeliveryState::Delivered,
            DeliveryState::DeadLettered,
            DeliveryState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<DeliveryState>().unwrap(), state);
        }
        assert!("failed".parse::<DeliveryState>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&DeliveryState::DeadLettered).unwrap();
        assert_eq!(json, "\"dead_lettered\"");
    }

    #[test]
    fn terminal_states_cannot_move() {
        for terminal in [
            DeliveryState::Delivered,
            DeliveryState::DeadLettered,
            DeliveryState::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(DeliveryState::Delivering));
            assert!(!terminal.can_transition_to(DeliveryState::Cancelled));
        }
    }

    #[test]
    fn retry_loop_is_allowed() {
        assert!(DeliveryState::Pending.can_transition_to(DeliveryState::Delivering));
        assert!(DeliveryState::Delivering.can_transition_to(DeliveryState::Retrying));
        assert!(DeliveryState::Retrying.can_transition_to(DeliveryState::Delivering));
        assert!(!DeliveryState::Retrying.can_transition_to(DeliveryState::Delivered));
    }
}
