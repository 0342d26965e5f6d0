//! Sample acquisition
//!
//! Producers deliver [`SampleEvent`]s on their own threads; each source key
//! maps to a bounded [`ChannelBuffer`] held in the [`SourceRegistry`]. The
//! refresh loop reads [`BufferSnapshot`] copies and never holds a buffer lock
//! while processing.

pub mod buffer;
pub mod event;
pub mod registry;

pub use buffer::{BufferSnapshot, ChannelBuffer, PushOutcome};
pub use event::SampleEvent;
pub use registry::{SourceRegistry, SourceSlot};
