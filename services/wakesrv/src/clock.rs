//! Wall-clock and wake-up timer abstraction
//!
//! The engine never reads system time or sleeps directly; it goes through
//! [`WakeClock`] so that scheduling behavior is deterministic under test.
//! `TokioClock` is the production implementation; `ManualClock` lets tests
//! drive time forward explicitly. The wake guarantee is reliable but possibly
//! late, never early.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Callback invoked when an armed wake-up fires
pub type WakeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle for an armed wake-up, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// Clock collaborator: current time plus a one-shot "wake me at T" primitive
pub trait WakeClock: Send + Sync {
    /// Current wall-clock time in epoch milliseconds
    fn now_millis(&self) -> i64;

    /// Arm a one-shot wake-up at `at_epoch_millis`
    ///
    /// A past instant fires as soon as possible rather than being dropped.
    fn arm(&self, at_epoch_millis: i64, callback: WakeCallback) -> TimerHandle;

    /// Cancel an armed wake-up; unknown or already-fired handles are ignored
    fn disarm(&self, handle: TimerHandle);
}

/// Production clock backed by the system time and tokio timers
///
/// Must be used from within a tokio runtime.
pub struct TokioClock {
    next_handle: AtomicU64,
    tasks: Mutex<HashMap<u64, tokio::task::JoinHandle<()>>>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeClock for TokioClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn arm(&self, at_epoch_millis: i64, callback: WakeCallback) -> TimerHandle {
        let handle_id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let delay_ms = (at_epoch_millis - self.now_millis()).max(0) as u64;

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            callback();
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|_, t| !t.is_finished());
        tasks.insert(handle_id, task);

        debug!("armed wake-up {} in {}ms", handle_id, delay_ms);
        TimerHandle(handle_id)
    }

    fn disarm(&self, handle: TimerHandle) {
        if let Some(task) = self.tasks.lock().remove(&handle.0) {
            task.abort();
            debug!("disarmed wake-up {}", handle.0);
        }
    }
}

/// Test clock with explicitly driven time
///
/// `advance_to` moves the clock forward and fires every armed wake-up whose
/// instant has been reached, in instant order, synchronously.
pub struct ManualClock {
    now: AtomicI64,
    next_handle: AtomicU64,
    armed: Mutex<HashMap<u64, (i64, WakeCallback)>>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_millis),
            next_handle: AtomicU64::new(1),
            armed: Mutex::new(HashMap::new()),
        })
    }

    /// Advance the clock to `to_millis` and fire all due wake-ups
    pub fn advance_to(&self, to_millis: i64) {
        self.now.store(to_millis, Ordering::SeqCst);

        let mut due: Vec<(i64, u64, WakeCallback)> = {
            let mut armed = self.armed.lock();
            let keys: Vec<u64> = armed
                .iter()
                .filter(|(_, (at, _))| *at <= to_millis)
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter()
                .filter_map(|k| armed.remove(&k).map(|(at, cb)| (at, k, cb)))
                .collect()
        };

        // Fire in instant order, handle id as tie-break, outside the lock
        due.sort_by_key(|(at, handle, _)| (*at, *handle));
        for (_, _, callback) in due {
            callback();
        }
    }

    /// Number of currently armed wake-ups
    pub fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }
}

impl WakeClock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn arm(&self, at_epoch_millis: i64, callback: WakeCallback) -> TimerHandle {
        let handle_id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.armed
            .lock()
            .insert(handle_id, (at_epoch_millis, callback));
        TimerHandle(handle_id)
    }

    fn disarm(&self, handle: TimerHandle) {
        self.armed.lock().remove(&handle.0);
    }
}
