//! Shared test harness: temp-file store, manual clock, recording notifier

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use wakesrv::{
    DeliveryEngine, ManualClock, NotifierPort, Scheduler, SqliteAlarmStore, WakeEvent,
};

/// Fixed test epoch base (milliseconds)
pub const T0: i64 = 1_700_000_000_000;

/// Notifier that records every effect invocation
pub struct RecordingNotifier {
    pub started: Mutex<Vec<(String, String)>>,
    pub stopped: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    pub fn started_for(&self, id: &str) -> usize {
        self.started.lock().iter().filter(|(i, _)| i == id).count()
    }

    pub fn stopped_for(&self, id: &str) -> usize {
        self.stopped.lock().iter().filter(|i| *i == id).count()
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn start_effects(&self, id: &str, title: &str) -> Result<()> {
        self.started.lock().push((id.to_string(), title.to_string()));
        Ok(())
    }

    async fn stop_effects(&self, id: &str) -> Result<()> {
        self.stopped.lock().push(id.to_string());
        Ok(())
    }
}

/// Fully wired engine on a temp database and a manually driven clock
pub struct TestEngine {
    pub _dir: tempfile::TempDir,
    pub store: Arc<SqliteAlarmStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub delivery: Arc<DeliveryEngine>,
    pub scheduler: Arc<Scheduler>,
    pub wake_rx: UnboundedReceiver<WakeEvent>,
}

impl TestEngine {
    pub async fn new(auto_stop_after_millis: Option<i64>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("alarms.db");
        Self::on_db(dir, db_path, T0, auto_stop_after_millis).await
    }

    /// Wire a fresh engine onto an existing database, simulating a restart
    pub async fn on_db(
        dir: tempfile::TempDir,
        db_path: std::path::PathBuf,
        now_millis: i64,
        auto_stop_after_millis: Option<i64>,
    ) -> Self {
        let store = Arc::new(SqliteAlarmStore::open(db_path).await.unwrap());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = ManualClock::new(now_millis);
        let delivery = Arc::new(DeliveryEngine::new(store.clone(), notifier.clone()));
        let (scheduler, wake_rx) = Scheduler::new(
            store.clone(),
            delivery.clone(),
            clock.clone(),
            auto_stop_after_millis,
        );

        Self {
            _dir: dir,
            store,
            notifier,
            clock,
            delivery,
            scheduler,
            wake_rx,
        }
    }

    /// Handle every queued wake event; returns how many were processed
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.wake_rx.try_recv() {
            self.scheduler.handle_event(event).await.unwrap();
            handled += 1;
        }
        handled
    }

    /// Advance the clock and process wake events until quiescent
    ///
    /// Loops because handling a fire re-arms the next alarm, which may itself
    /// already be due at the new time.
    pub async fn advance_to(&mut self, to_millis: i64) {
        loop {
            self.clock.advance_to(to_millis);
            if self.drain().await == 0 {
                break;
            }
        }
    }
}
