//! Display aggregation
//!
//! Per refresh tick the [`DisplayAggregator`] gathers each channel's
//! [`ChannelSeries`], applies the autoscale policy and the single/multi axis
//! layout, and produces a [`Frame`] for a [`FrameSink`].

pub mod aggregator;
pub mod frame;
pub mod sink;

pub use aggregator::DisplayAggregator;
pub use frame::{AxisBounds, AxisLayout, ChannelSeries, Frame, TriggerMarker};
pub use sink::{frame_channel, ChannelSink, FrameSink};

#[cfg(test)]
pub use sink::MockFrameSink;
