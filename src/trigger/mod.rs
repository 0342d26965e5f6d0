//! Trigger detection and time correlation
//!
//! The [`TriggerEngine`] turns trigger source values into [`TriggerEvent`]s on
//! the ingestion thread. Events travel to the refresh loop, where the
//! [`TimeCorrelator`] locates each one in the data time field buffer and
//! yields the [`CaptureWindow`] to display.

pub mod correlator;
pub mod engine;

pub use correlator::{
    nearest_index, suggest_buffer_size, CaptureWindow, Correlation, CorrelationMiss,
    TimeCorrelator, TriggerStatus,
};
pub use engine::{TriggerEngine, TriggerEvent, TriggerState};
