//! Wake scheduler
//!
//! Maintains the invariant that a wake-up is armed for exactly the earliest
//! Scheduled alarm, and only that one. The underlying wake primitive is a
//! single one-shot timer, so every change to the head of the pending queue is
//! a cancel-and-replace; later alarms are armed lazily when the earlier one
//! resolves.
//!
//! Wake callbacks never touch the engine directly: the clock pushes a
//! [`WakeEvent`] onto an unbounded channel and the run loop (or a test
//! driving [`Scheduler::handle_event`]) delivers it.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::clock::{TimerHandle, WakeClock};
use crate::domain::{AlarmRequest, AlarmState};
use crate::error::{Result, WakeError};
use crate::services::delivery::DeliveryEngine;
use crate::storage::SqliteAlarmStore;

/// Event delivered from an armed clock callback to the run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeEvent {
    /// An alarm's fire time was reached
    Fire(String),
    /// The auto-stop interval for a ringing alarm elapsed
    AutoStop(String),
}

struct ArmedWakeup {
    id: String,
    fire_at: i64,
    handle: TimerHandle,
}

/// Schedules alarms and keeps the single wake-up timer armed
pub struct Scheduler {
    store: Arc<SqliteAlarmStore>,
    delivery: Arc<DeliveryEngine>,
    clock: Arc<dyn WakeClock>,
    /// Optional policy: stop ringing alarms after this many milliseconds
    auto_stop_after_millis: Option<i64>,
    wake_tx: UnboundedSender<WakeEvent>,
    armed: Mutex<Option<ArmedWakeup>>,
    shutdown: Notify,
}

impl Scheduler {
    /// Create the scheduler and the wake-event receiver its run loop consumes
    pub fn new(
        store: Arc<SqliteAlarmStore>,
        delivery: Arc<DeliveryEngine>,
        clock: Arc<dyn WakeClock>,
        auto_stop_after_millis: Option<i64>,
    ) -> (Arc<Self>, UnboundedReceiver<WakeEvent>) {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            store,
            delivery,
            clock,
            auto_stop_after_millis,
            wake_tx,
            armed: Mutex::new(None),
            shutdown: Notify::new(),
        });
        (scheduler, wake_rx)
    }

    /// Schedule a new alarm with a generated id
    pub async fn schedule(&self, fire_at_epoch_millis: i64, title: &str) -> Result<String> {
        self.schedule_request(AlarmRequest::new(title, fire_at_epoch_millis))
            .await
    }

    /// Schedule a new alarm under a caller-chosen id
    pub async fn schedule_with_id(
        &self,
        id: &str,
        fire_at_epoch_millis: i64,
        title: &str,
    ) -> Result<String> {
        self.schedule_request(AlarmRequest::with_id(id, title, fire_at_epoch_millis))
            .await
    }

    async fn schedule_request(&self, req: AlarmRequest) -> Result<String> {
        let now = self.clock.now_millis();
        if req.fire_at_epoch_millis <= now {
            return Err(WakeError::PastTime {
                fire_at: req.fire_at_epoch_millis,
                now,
            });
        }
        if req.title.trim().is_empty() {
            return Err(WakeError::InvalidInput(
                "alarm title must not be empty".to_string(),
            ));
        }

        self.store.put(&req).await?;
        info!(
            "scheduled alarm {} at {}: {}",
            req.id, req.fire_at_epoch_millis, req.title
        );

        // Re-arm in case the new alarm is now the earliest pending one
        self.rearm().await?;
        Ok(req.id)
    }

    /// Cancel a Scheduled alarm, marking it Expired
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidTransition` when the
    /// alarm already rang, was stopped, or was canceled before.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        self.store
            .update_state(id, AlarmState::Scheduled, AlarmState::Expired)
            .await?;
        info!("canceled alarm {}", id);

        let was_armed = self
            .armed
            .lock()
            .as_ref()
            .is_some_and(|armed| armed.id == id);
        if was_armed {
            self.rearm().await?;
        }
        Ok(())
    }

    /// Recover after a process restart
    ///
    /// Alarms whose fire time already passed are delivered immediately, in
    /// (fire time, id) order: a late alarm is better than a dropped one. The
    /// earliest remaining alarm is then armed. Returns how many late alarms
    /// were delivered.
    pub async fn on_boot(&self) -> Result<usize> {
        let pending = self.store.list_pending().await?;
        let now = self.clock.now_millis();
        let mut delivered = 0;

        for alarm in pending.iter().filter(|a| a.is_past_due(now)) {
            warn!(
                "alarm {} fire time {} already passed, delivering late",
                alarm.id, alarm.fire_at_epoch_millis
            );
            match self.fire_now(&alarm.id).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("failed to deliver late alarm {}: {}", alarm.id, e),
            }
        }

        self.rearm().await?;
        info!(
            "boot recovery complete: {} late alarms delivered, armed: {:?}",
            delivered,
            self.armed_alarm()
        );
        Ok(delivered)
    }

    /// Id of the alarm the wake-up timer is currently armed for, if any
    pub fn armed_alarm(&self) -> Option<String> {
        self.armed.lock().as_ref().map(|armed| armed.id.clone())
    }

    /// Process one wake event
    pub async fn handle_event(&self, event: WakeEvent) -> Result<()> {
        match event {
            WakeEvent::Fire(id) => {
                {
                    let mut armed = self.armed.lock();
                    if armed.as_ref().is_some_and(|a| a.id == id) {
                        *armed = None;
                    }
                }
                if let Err(e) = self.fire_now(&id).await {
                    error!("failed to deliver alarm {}: {}", id, e);
                }
                self.rearm().await
            }
            WakeEvent::AutoStop(id) => {
                match self.delivery.stop(&id).await {
                    Ok(true) => info!("alarm {} auto-stopped", id),
                    Ok(false) => debug!("auto-stop for alarm {} skipped, already stopped", id),
                    // Canceled before ringing, or never rang
                    Err(WakeError::NotRinging(_)) => {
                        debug!("auto-stop for alarm {} skipped, not ringing", id)
                    }
                    Err(e) => warn!("auto-stop for alarm {} failed: {}", id, e),
                }
                Ok(())
            }
        }
    }

    /// Consume wake events until shutdown
    pub async fn run(self: Arc<Self>, mut wake_rx: UnboundedReceiver<WakeEvent>) {
        info!("wake scheduler running");
        loop {
            tokio::select! {
                event = wake_rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            error!("wake event handling failed: {}", e);
                        }
                    }
                    None => break,
                },
                _ = self.shutdown.notified() => break,
            }
        }

        if let Some(armed) = self.armed.lock().take() {
            self.clock.disarm(armed.handle);
        }
        info!("wake scheduler stopped");
    }

    /// Stop the run loop and disarm the outstanding wake-up
    pub fn stop(&self) {
        info!("stopping wake scheduler...");
        self.shutdown.notify_one();
    }

    /// Deliver an alarm now and, when configured, arm its auto-stop timer
    async fn fire_now(&self, id: &str) -> Result<()> {
        let Some(alarm) = self.delivery.on_wake(id).await? else {
            return Ok(());
        };

        if let Some(after_ms) = self.auto_stop_after_millis {
            let tx = self.wake_tx.clone();
            let stop_id = alarm.id.clone();
            let at = self.clock.now_millis() + after_ms;
            // One-shot, never disarmed: a stale auto-stop is a benign no-op
            self.clock.arm(
                at,
                Box::new(move || {
                    let _ = tx.send(WakeEvent::AutoStop(stop_id));
                }),
            );
        }
        Ok(())
    }

    /// Point the single wake-up timer at the earliest pending alarm
    ///
    /// Cancel-and-replace: any previously armed wake-up for a different alarm
    /// is disarmed first. Disarms entirely when nothing is pending.
    async fn rearm(&self) -> Result<()> {
        let next = self.store.list_pending().await?.into_iter().next();
        let mut armed = self.armed.lock();

        let Some(next) = next else {
            if let Some(previous) = armed.take() {
                self.clock.disarm(previous.handle);
                debug!("no pending alarms, wake-up disarmed");
            }
            return Ok(());
        };

        if armed
            .as_ref()
            .is_some_and(|a| a.id == next.id && a.fire_at == next.fire_at_epoch_millis)
        {
            return Ok(());
        }

        if let Some(previous) = armed.take() {
            self.clock.disarm(previous.handle);
        }

        let tx = self.wake_tx.clone();
        let fire_id = next.id.clone();
        let handle = self.clock.arm(
            next.fire_at_epoch_millis,
            Box::new(move || {
                let _ = tx.send(WakeEvent::Fire(fire_id));
            }),
        );

        debug!("armed wake-up for alarm {} at {}", next.id, next.fire_at_epoch_millis);
        *armed = Some(ArmedWakeup {
            id: next.id,
            fire_at: next.fire_at_epoch_millis,
            handle,
        });
        Ok(())
    }
}
