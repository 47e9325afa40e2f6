//! Domain types for the wake service

pub mod types;

pub use types::{AlarmRequest, AlarmState};
