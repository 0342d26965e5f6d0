//! Frame assembly: autoscale and axis layout
//!
//! Bounds are recomputed from the union of all visible series when autoscale
//! is on, when a trigger asked for it, or when no bounds exist yet. Otherwise
//! the previous bounds are kept so the view stays put between frames.

use std::collections::HashMap;

use super::frame::{union_range, widen, AxisBounds, AxisLayout, ChannelSeries, Frame, TriggerMarker};
use crate::config::{DisplayConfig, DisplayMode};
use crate::trigger::TriggerStatus;

/// Builds frames from per-channel series
#[derive(Debug, Clone, Default)]
pub struct DisplayAggregator {
    autoscale: bool,
    layout: AxisLayout,
    bounds: Option<AxisBounds>,
    channel_bounds: HashMap<u32, (f64, f64)>,
    autoscale_requested: bool,
    sequence: u64,
}

impl DisplayAggregator {
    /// Create an aggregator for the given display configuration
    pub fn new(config: &DisplayConfig) -> Self {
        let mut aggregator = Self::default();
        aggregator.apply_config(config);
        aggregator
    }

    /// Pick up autoscale and layout flags
    pub fn apply_config(&mut self, config: &DisplayConfig) {
        self.autoscale = config.autoscale;
        let layout = if config.single_axis {
            AxisLayout::Single
        } else {
            AxisLayout::Multi
        };
        if layout != self.layout {
            self.layout = layout;
            self.autoscale_requested = true;
        }
    }

    /// Current layout
    pub fn layout(&self) -> AxisLayout {
        self.layout
    }

    /// Bounds of the last frame
    pub fn bounds(&self) -> Option<AxisBounds> {
        self.bounds
    }

    /// Recompute bounds on the next frame that has data
    pub fn request_autoscale(&mut self) {
        self.autoscale_requested = true;
    }

    /// Whether an autoscale request is pending
    pub fn autoscale_pending(&self) -> bool {
        self.autoscale_requested
    }

    /// Forget a removed channel's scale
    pub fn forget(&mut self, channel_id: u32) {
        self.channel_bounds.remove(&channel_id);
    }

    /// Frames assembled so far
    pub fn frames_assembled(&self) -> u64 {
        self.sequence
    }

    /// Assemble one frame
    ///
    /// Series with no points are dropped: a channel without data contributes
    /// nothing rather than a flat line.
    pub fn assemble(
        &mut self,
        mode: DisplayMode,
        channels: Vec<ChannelSeries>,
        trigger_marker: Option<TriggerMarker>,
        trigger_status: TriggerStatus,
    ) -> Frame {
        let mut channels: Vec<ChannelSeries> =
            channels.into_iter().filter(|c| !c.series.is_empty()).collect();

        let rescale = self.autoscale || self.autoscale_requested || self.bounds.is_none();
        let mut autoscaled = false;

        if rescale {
            if let Some(bounds) = union_bounds(&channels) {
                self.bounds = Some(bounds);
                self.channel_bounds = channels
                    .iter()
                    .filter_map(|c| c.series.y_range().map(|r| (c.channel_id, widen(r))))
                    .collect();
                self.autoscale_requested = false;
                autoscaled = true;
            }
        }

        for channel in &mut channels {
            channel.y_bounds = match self.layout {
                AxisLayout::Single => self.bounds.map(|b| b.y),
                AxisLayout::Multi => {
                    // A channel seen for the first time gets its own range
                    let fallback = channel.series.y_range().map(widen);
                    match self.channel_bounds.get(&channel.channel_id) {
                        Some(range) => Some(*range),
                        None => {
                            if let Some(range) = fallback {
                                self.channel_bounds.insert(channel.channel_id, range);
                            }
                            fallback
                        }
                    }
                }
            };
        }

        self.sequence += 1;
        Frame {
            sequence: self.sequence,
            mode,
            channels,
            axis_bounds: self.bounds,
            layout: self.layout,
            trigger_marker,
            autoscaled,
            trigger_status,
        }
    }
}

fn union_bounds(channels: &[ChannelSeries]) -> Option<AxisBounds> {
    let mut x: Option<(f64, f64)> = None;
    let mut y: Option<(f64, f64)> = None;
    for channel in channels {
        if let Some(range) = channel.series.x_range() {
            x = Some(x.map_or(range, |acc| union_range(acc, range)));
        }
        if let Some(range) = channel.series.y_range() {
            y = Some(y.map_or(range, |acc| union_range(acc, range)));
        }
    }
    Some(AxisBounds {
        x: widen(x?),
        y: widen(y?),
    })
}
