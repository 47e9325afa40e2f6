//! Wake Service (WakeSrv)
//!
//! Daemon entry point: restores persisted alarms, delivers the ones missed
//! while the process was down, and keeps the wake-up timer armed until
//! shutdown. Effects go to the log notifier unless a platform backend is
//! wired in.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use wakesrv::{
    DeliveryEngine, LogNotifier, Scheduler, SqliteAlarmStore, TokioClock, WakeConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Wake Service...");

    let config = WakeConfig::load()?;
    info!("config loaded: db at {}", config.storage.db_path);

    let store = Arc::new(SqliteAlarmStore::open(&config.storage.db_path).await?);

    if config.storage.purge_on_boot {
        let cutoff = Utc::now() - Duration::days(config.storage.retention_days as i64);
        store.purge_terminal_before(cutoff).await?;
    }

    let notifier = Arc::new(LogNotifier);
    let delivery = Arc::new(DeliveryEngine::new(store.clone(), notifier));
    let clock = Arc::new(TokioClock::new());
    let (scheduler, wake_rx) = Scheduler::new(
        store,
        delivery,
        clock,
        config.delivery.auto_stop_after_millis,
    );

    let late = scheduler.on_boot().await?;
    if late > 0 {
        info!("delivered {} alarms missed while the service was down", late);
    }

    let runner = tokio::spawn(scheduler.clone().run(wake_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.stop();
    runner.await?;

    Ok(())
}
