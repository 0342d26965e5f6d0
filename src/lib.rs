//! # pvscope: acquisition and display engine for a PV scope
//!
//! Buffers updates from control-system process variables, aligns them to
//! trigger events, and turns them into display-ready series (time domain,
//! FFT, PSD, autocorrelation, histogram) once per refresh tick.
//!
//! ## Architecture
//!
//! - **Acquisition**: per-source ring buffers keyed by `pv` or `pv.field`
//! - **Trigger**: edge detection on a trigger PV and time correlation of the
//!   trigger against a data-time field to cut a capture window
//! - **Analysis**: DC offset, EMA smoothing, spectral transforms, histogram
//! - **Display**: autoscale and axis layout, frames handed to a sink
//! - **Scope**: [`ScopeEngine`] (shared, fed by subscriber threads) and
//!   [`RefreshLoop`] (one thread, produces frames); crossbeam channels between
//!   them
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::{atomic::AtomicBool, Arc};
//! use pvscope::{config::ScopeConfig, display::frame_channel, RefreshLoop, ScopeEngine};
//!
//! let engine = Arc::new(ScopeEngine::new(ScopeConfig::load("bpm.scope.toml")?)?);
//! let (sink, frames) = frame_channel(4);
//! let (commands, command_rx) = crossbeam_channel::unbounded();
//! let running = Arc::new(AtomicBool::new(true));
//!
//! let mut refresh = RefreshLoop::new(engine.clone(), Box::new(sink), command_rx, running);
//! std::thread::spawn(move || refresh.run());
//!
//! // subscriber threads: engine.ingest(event)?
//! // renderer: for frame in frames.iter() { ... }
//! ```

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod display;
pub mod error;
pub mod scope;
pub mod sim;
pub mod trigger;
pub mod types;

// Re-export commonly used types
pub use acquisition::{BufferSnapshot, SampleEvent, SourceRegistry};
pub use config::{DisplayConfig, DisplayMode, ScopeConfig, TriggerConfig, TriggerMode};
pub use display::{Frame, FrameSink};
pub use error::{Result, ScopeError};
pub use scope::{RefreshCommand, RefreshLoop, ScopeEngine};
pub use types::{Channel, Payload, Timestamp};
