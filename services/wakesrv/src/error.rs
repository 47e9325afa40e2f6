//! Error types for the wake service

use crate::domain::AlarmState;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, WakeError>;

/// Wake service error taxonomy
#[derive(Debug, Error)]
pub enum WakeError {
    /// Requested fire time is not in the future
    #[error("fire time {fire_at} is not in the future (now: {now})")]
    PastTime { fire_at: i64, now: i64 },

    /// Invalid caller input (e.g. empty title)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An alarm with this id already exists
    #[error("alarm already exists: {0}")]
    DuplicateId(String),

    /// Alarm not found
    #[error("alarm not found: {0}")]
    NotFound(String),

    /// State transition is not one of the allowed lifecycle edges
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: AlarmState, to: AlarmState },

    /// Stop requested for an alarm that never rang
    #[error("alarm {0} is not ringing")]
    NotRinging(String),

    /// Persistence-layer failure; fatal to the failing operation only
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation (e.g. corrupt stored state)
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WakeError::NotFound("a1".to_string());
        assert_eq!(err.to_string(), "alarm not found: a1");

        let err = WakeError::InvalidTransition {
            from: AlarmState::Stopped,
            to: AlarmState::Ringing,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition from Stopped to Ringing"
        );

        let err = WakeError::PastTime {
            fire_at: 100,
            now: 200,
        };
        assert!(err.to_string().contains("not in the future"));
    }
}
