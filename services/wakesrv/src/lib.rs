//! Wake Service Library
//!
//! A local one-shot alarm scheduling and delivery engine: alarms are
//! persisted in SQLite, a single exact timer is armed for the earliest
//! pending alarm, and on firing the delivery engine transitions the alarm to
//! Ringing and triggers effects through the notifier port exactly once.
//! Pending alarms survive process restarts; past-due ones are delivered late
//! rather than dropped.

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;

pub use clock::{ManualClock, TimerHandle, TokioClock, WakeCallback, WakeClock};
pub use config::WakeConfig;
pub use domain::{AlarmRequest, AlarmState};
pub use error::{Result, WakeError};
pub use services::{DeliveryEngine, LogNotifier, NotifierPort, Scheduler, WakeEvent};
pub use storage::SqliteAlarmStore;
