//! Delivery engine: the per-alarm ringing state machine
//!
//! Scheduled --(wake fires)--> Ringing --(stop)--> Stopped. The store's
//! compare-and-set transition is the sole synchronization point, so duplicate
//! wake callbacks and a stop racing a late wake interleave safely in any
//! order. Effects start exactly once per alarm.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{AlarmRequest, AlarmState};
use crate::error::{Result, WakeError};
use crate::services::notifier::NotifierPort;
use crate::storage::SqliteAlarmStore;

/// Transitions alarms to Ringing/Stopped and drives the notifier port
pub struct DeliveryEngine {
    store: Arc<SqliteAlarmStore>,
    notifier: Arc<dyn NotifierPort>,
}

impl DeliveryEngine {
    pub fn new(store: Arc<SqliteAlarmStore>, notifier: Arc<dyn NotifierPort>) -> Self {
        Self { store, notifier }
    }

    /// Handle a wake callback for `id`
    ///
    /// Returns the alarm when it actually transitioned to Ringing and effects
    /// were started, `None` when the wake was a duplicate or arrived after the
    /// alarm was stopped or canceled (benign, logged). `NotFound` propagates.
    pub async fn on_wake(&self, id: &str) -> Result<Option<AlarmRequest>> {
        let alarm = match self
            .store
            .update_state(id, AlarmState::Scheduled, AlarmState::Ringing)
            .await
        {
            Ok(alarm) => alarm,
            // Duplicate wake delivery, or the user stopped/canceled first
            Err(WakeError::InvalidTransition { from, .. })
                if matches!(
                    from,
                    AlarmState::Ringing | AlarmState::Stopped | AlarmState::Expired
                ) =>
            {
                debug!("wake for alarm {} ignored, already {}", id, from);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!("alarm {} ringing: {}", alarm.id, alarm.title);

        // Notifier failure never blocks the transition; the alarm stays
        // Ringing so a visual/tactile fallback can still reach the user.
        if let Err(e) = self.notifier.start_effects(&alarm.id, &alarm.title).await {
            warn!("failed to start effects for alarm {}: {}", alarm.id, e);
        }

        Ok(Some(alarm))
    }

    /// Stop a ringing alarm
    ///
    /// Returns `true` when this call performed the stop, `false` when the
    /// alarm was already Stopped (duplicate stop, benign). Stopping an alarm
    /// that never rang fails with `NotRinging`.
    pub async fn stop(&self, id: &str) -> Result<bool> {
        let alarm = match self
            .store
            .update_state(id, AlarmState::Ringing, AlarmState::Stopped)
            .await
        {
            Ok(alarm) => alarm,
            Err(WakeError::InvalidTransition {
                from: AlarmState::Stopped,
                ..
            }) => {
                debug!("stop for alarm {} ignored, already stopped", id);
                return Ok(false);
            }
            Err(WakeError::InvalidTransition { .. }) => {
                return Err(WakeError::NotRinging(id.to_string()));
            }
            Err(e) => return Err(e),
        };

        info!("alarm {} stopped", alarm.id);

        if let Err(e) = self.notifier.stop_effects(&alarm.id).await {
            warn!("failed to stop effects for alarm {}: {}", alarm.id, e);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier {
        started: AtomicUsize,
        stopped: AtomicUsize,
        fail_start: bool,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                started: AtomicUsize::new(0),
                stopped: AtomicUsize::new(0),
                fail_start: false,
            }
        }
    }

    #[async_trait]
    impl NotifierPort for CountingNotifier {
        async fn start_effects(&self, _id: &str, _title: &str) -> anyhow::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(anyhow!("sound device busy"));
            }
            Ok(())
        }

        async fn stop_effects(&self, _id: &str) -> anyhow::Result<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn setup() -> (tempfile::TempDir, Arc<SqliteAlarmStore>, Arc<CountingNotifier>, DeliveryEngine)
    {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteAlarmStore::open(dir.path().join("alarms.db"))
                .await
                .unwrap(),
        );
        let notifier = Arc::new(CountingNotifier::new());
        let engine = DeliveryEngine::new(store.clone(), notifier.clone());
        (dir, store, notifier, engine)
    }

    #[tokio::test]
    async fn test_duplicate_wake_starts_effects_once() {
        let (_dir, store, notifier, engine) = setup().await;
        store
            .put(&AlarmRequest::with_id("a1", "Meeting", 1_000))
            .await
            .unwrap();

        let first = engine.on_wake("a1").await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().state, AlarmState::Ringing);

        // Duplicate wake callback is a benign no-op
        let second = engine.on_wake("a1").await.unwrap();
        assert!(second.is_none());

        assert_eq!(notifier.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_stop_stops_effects_once() {
        let (_dir, store, notifier, engine) = setup().await;
        store
            .put(&AlarmRequest::with_id("a1", "Meeting", 1_000))
            .await
            .unwrap();

        engine.on_wake("a1").await.unwrap();
        assert!(engine.stop("a1").await.unwrap());
        assert!(!engine.stop("a1").await.unwrap());

        assert_eq!(notifier.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("a1").await.unwrap().state, AlarmState::Stopped);
    }

    #[tokio::test]
    async fn test_wake_after_stop_is_noop() {
        let (_dir, store, notifier, engine) = setup().await;
        store
            .put(&AlarmRequest::with_id("a1", "Meeting", 1_000))
            .await
            .unwrap();

        engine.on_wake("a1").await.unwrap();
        engine.stop("a1").await.unwrap();

        // A late duplicate wake must not restart effects
        assert!(engine.on_wake("a1").await.unwrap().is_none());
        assert_eq!(notifier.started.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("a1").await.unwrap().state, AlarmState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_without_ring_fails() {
        let (_dir, store, _notifier, engine) = setup().await;
        store
            .put(&AlarmRequest::with_id("a1", "Meeting", 1_000))
            .await
            .unwrap();

        let err = engine.stop("a1").await.unwrap_err();
        assert!(matches!(err, WakeError::NotRinging(id) if id == "a1"));

        let err = engine.stop("missing").await.unwrap_err();
        assert!(matches!(err, WakeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_wake_unknown_alarm_propagates_not_found() {
        let (_dir, _store, _notifier, engine) = setup().await;
        let err = engine.on_wake("ghost").await.unwrap_err();
        assert!(matches!(err, WakeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notifier_failure_still_marks_ringing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteAlarmStore::open(dir.path().join("alarms.db"))
                .await
                .unwrap(),
        );
        let notifier = Arc::new(CountingNotifier {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            fail_start: true,
        });
        let engine = DeliveryEngine::new(store.clone(), notifier.clone());

        store
            .put(&AlarmRequest::with_id("a1", "Meeting", 1_000))
            .await
            .unwrap();

        // Sound device busy is logged, the transition still happens
        let rang = engine.on_wake("a1").await.unwrap();
        assert!(rang.is_some());
        assert_eq!(store.get("a1").await.unwrap().state, AlarmState::Ringing);
    }
}
