//! Renderable frame types

use crate::analysis::DisplaySeries;
use crate::config::DisplayMode;
use crate::trigger::TriggerStatus;
use crate::types::AxisLocation;

/// Axis ranges of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    /// X range (min, max)
    pub x: (f64, f64),
    /// Y range (min, max); the shared range in single-axis layout
    pub y: (f64, f64),
}

impl AxisBounds {
    /// Smallest bounds containing both
    pub fn union(&self, other: &AxisBounds) -> AxisBounds {
        AxisBounds {
            x: union_range(self.x, other.x),
            y: union_range(self.y, other.y),
        }
    }

    /// Whether a point lies inside the bounds
    pub fn contains(&self, point: [f64; 2]) -> bool {
        (self.x.0..=self.x.1).contains(&point[0]) && (self.y.0..=self.y.1).contains(&point[1])
    }
}

pub(crate) fn union_range(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0.min(b.0), a.1.max(b.1))
}

/// Widen a zero-width range so it can be drawn
pub(crate) fn widen(range: (f64, f64)) -> (f64, f64) {
    if range.0 == range.1 {
        (range.0 - 0.5, range.1 + 0.5)
    } else {
        range
    }
}

/// Y axis arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisLayout {
    /// All channels share one Y scale
    #[default]
    Single,
    /// Every channel has its own Y scale
    Multi,
}

/// One channel's contribution to a frame
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSeries {
    /// Channel id
    pub channel_id: u32,
    /// Source key shown as the legend name
    pub name: String,
    /// RGBA color
    pub color: [u8; 4],
    /// Axis placement in multi-axis layout
    pub axis: AxisLocation,
    /// Pipeline output
    pub series: DisplaySeries,
    /// Y range the channel is drawn against
    pub y_bounds: Option<(f64, f64)>,
    /// Sample index of the trigger within this channel's captured series
    pub trigger_index: Option<usize>,
}

/// Trigger position drawn as a vertical marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerMarker {
    /// X coordinate of the trigger (sample index, or seconds with an X axis source)
    pub x: f64,
    /// Trigger sequence number
    pub sequence: u64,
}

/// Everything the renderer needs for one refresh tick
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame counter
    pub sequence: u64,
    /// Display mode the series were produced with
    pub mode: DisplayMode,
    /// Series of every drawn channel with data
    pub channels: Vec<ChannelSeries>,
    /// Axis ranges, absent until any channel had data
    pub axis_bounds: Option<AxisBounds>,
    /// Y axis arrangement
    pub layout: AxisLayout,
    /// Trigger marker of a triggered capture
    pub trigger_marker: Option<TriggerMarker>,
    /// Whether bounds were recomputed for this frame
    pub autoscaled: bool,
    /// Trigger status at the time of the frame
    pub trigger_status: TriggerStatus,
}

impl Frame {
    /// Series of a channel
    pub fn channel(&self, channel_id: u32) -> Option<&ChannelSeries> {
        self.channels.iter().find(|c| c.channel_id == channel_id)
    }

    /// Whether no channel contributed data
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
