//! Scope runtime
//!
//! A scope has two halves connected by a bounded trigger queue:
//!
//! ```text
//! subscribers ──► ScopeEngine ──(TriggerEvent)──► RefreshLoop ──► FrameSink
//!                   │ SourceRegistry ◄──── snapshots ───┘
//!                   └ TriggerEngine
//! ```
//!
//! [`ScopeEngine`] is shared (`Arc`) with every subscriber thread;
//! [`RefreshLoop`] owns all processing state and runs on one thread.

pub mod engine;
pub mod refresh;

pub use engine::ScopeEngine;
pub use refresh::{RefreshCommand, RefreshLoop, RefreshStats, TickOutcome};
