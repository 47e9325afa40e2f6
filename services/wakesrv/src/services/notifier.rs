//! Notifier port: the audible/visual side-effect surface
//!
//! The engine triggers effects through this trait and never implements them
//! itself; hosts plug in platform-specific sound/vibration/notification
//! backends. `start_effects` may be retried by the engine's environment and
//! must be at-least-once safe on the implementing side.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Side-effect surface invoked when an alarm rings or is stopped
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Start alarm effects: sound, vibration and a dismissible notification
    /// carrying a Stop action that the host wires back to
    /// [`DeliveryEngine::stop`](crate::services::DeliveryEngine::stop).
    async fn start_effects(&self, id: &str, title: &str) -> Result<()>;

    /// Tear down the effects started for `id`
    async fn stop_effects(&self, id: &str) -> Result<()>;
}

/// Default notifier that renders effects as structured log lines
///
/// Used by the daemon when no platform backend is wired in.
pub struct LogNotifier;

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn start_effects(&self, id: &str, title: &str) -> Result<()> {
        info!(alarm_id = id, title, "ALARM ringing: sound + vibration + notification");
        Ok(())
    }

    async fn stop_effects(&self, id: &str) -> Result<()> {
        info!(alarm_id = id, "alarm effects stopped");
        Ok(())
    }
}
