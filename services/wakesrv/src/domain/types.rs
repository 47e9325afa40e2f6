use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Alarm lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    /// Waiting for its fire time
    Scheduled,
    /// Fired, effects active, waiting for Stop
    Ringing,
    /// Stopped by the user or the auto-stop policy
    Stopped,
    /// Canceled before firing
    Expired,
}

impl AlarmState {
    /// Check whether `self -> to` is one of the allowed lifecycle edges
    pub fn can_transition(self, to: AlarmState) -> bool {
        matches!(
            (self, to),
            (AlarmState::Scheduled, AlarmState::Ringing)
                | (AlarmState::Ringing, AlarmState::Stopped)
                | (AlarmState::Scheduled, AlarmState::Expired)
        )
    }

    /// Stable text form used for persistence
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmState::Scheduled => "Scheduled",
            AlarmState::Ringing => "Ringing",
            AlarmState::Stopped => "Stopped",
            AlarmState::Expired => "Expired",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(AlarmState::Scheduled),
            "Ringing" => Ok(AlarmState::Ringing),
            "Stopped" => Ok(AlarmState::Stopped),
            "Expired" => Ok(AlarmState::Expired),
            other => Err(format!("unknown alarm state: {}", other)),
        }
    }
}

/// One-shot alarm request
///
/// `id` and `fire_at_epoch_millis` are immutable once created; rescheduling
/// an alarm means creating a new request under a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRequest {
    /// Alarm ID (uuid v4 unless the caller supplied one)
    pub id: String,
    /// Display title shown by the notifier
    pub title: String,
    /// Wall-clock fire instant (epoch milliseconds)
    pub fire_at_epoch_millis: i64,
    /// Current lifecycle state
    pub state: AlarmState,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last state change time
    pub updated_at: DateTime<Utc>,
}

impl AlarmRequest {
    /// Create a new scheduled alarm with a generated id
    pub fn new(title: impl Into<String>, fire_at_epoch_millis: i64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title, fire_at_epoch_millis)
    }

    /// Create a new scheduled alarm under a caller-chosen id
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        fire_at_epoch_millis: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            fire_at_epoch_millis,
            state: AlarmState::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the alarm is still waiting to fire
    pub fn is_pending(&self) -> bool {
        self.state == AlarmState::Scheduled
    }

    /// Check if the alarm's fire time has already passed
    pub fn is_past_due(&self, now_millis: i64) -> bool {
        self.fire_at_epoch_millis <= now_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(AlarmState::Scheduled.can_transition(AlarmState::Ringing));
        assert!(AlarmState::Scheduled.can_transition(AlarmState::Expired));
        assert!(AlarmState::Ringing.can_transition(AlarmState::Stopped));

        assert!(!AlarmState::Scheduled.can_transition(AlarmState::Stopped));
        assert!(!AlarmState::Ringing.can_transition(AlarmState::Ringing));
        assert!(!AlarmState::Ringing.can_transition(AlarmState::Expired));
        assert!(!AlarmState::Stopped.can_transition(AlarmState::Ringing));
        assert!(!AlarmState::Stopped.can_transition(AlarmState::Scheduled));
        assert!(!AlarmState::Expired.can_transition(AlarmState::Ringing));
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            AlarmState::Scheduled,
            AlarmState::Ringing,
            AlarmState::Stopped,
            AlarmState::Expired,
        ] {
            assert_eq!(state.as_str().parse::<AlarmState>().unwrap(), state);
        }
        assert!("Snoozed".parse::<AlarmState>().is_err());
    }

    #[test]
    fn test_alarm_creation() {
        let alarm = AlarmRequest::new("Meeting", 1_700_000_000_000);
        assert_eq!(alarm.title, "Meeting");
        assert_eq!(alarm.state, AlarmState::Scheduled);
        assert!(alarm.is_pending());
        assert!(!alarm.id.is_empty());

        assert!(alarm.is_past_due(1_700_000_000_000));
        assert!(!alarm.is_past_due(1_699_999_999_999));
    }
}
