//! Engine services: wake scheduling and alarm delivery

pub mod delivery;
pub mod notifier;
pub mod scheduler;

pub use delivery::DeliveryEngine;
pub use notifier::{LogNotifier, NotifierPort};
pub use scheduler::{Scheduler, WakeEvent};
