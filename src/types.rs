//! Core data types for pvscope
//!
//! This module contains the fundamental data structures shared by the
//! acquisition, trigger and display layers.
//!
//! # Main Types
//!
//! - [`Timestamp`] - Seconds/nanoseconds past epoch, as delivered by the source
//! - [`Payload`] - A scalar value or a whole array delivered in one update
//! - [`Protocol`] - Channel access protocol tag (`ca` or `pva`)
//! - [`Channel`] - A plotted channel: identity, color, DC offset
//! - [`AcquisitionStats`] - Ingestion counters reported to the UI
//!
//! # Source Keys
//!
//! Buffers are keyed by a *source key*: the PV name, optionally followed by a
//! dot-separated field path (`"sim:wave.value"`). Several channels may read
//! different fields of the same `pva` structure, each with its own buffer.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, ScopeError};

/// Timestamp attached to every sample update
///
/// Ordered lexicographically by seconds then nanoseconds so stale-sample
/// detection is exact rather than subject to float rounding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Whole seconds past the epoch
    pub seconds_past_epoch: i64,
    /// Nanoseconds within the second (always < 1e9)
    pub nanoseconds: u32,
}

impl Timestamp {
    /// Create a timestamp, normalising nanoseconds overflow into seconds
    pub fn new(seconds_past_epoch: i64, nanoseconds: u32) -> Self {
        Self {
            seconds_past_epoch: seconds_past_epoch + (nanoseconds / 1_000_000_000) as i64,
            nanoseconds: nanoseconds % 1_000_000_000,
        }
    }

    /// Build from floating point seconds past epoch
    pub fn from_secs_f64(secs: f64) -> Self {
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9).round() as u32;
        Self::new(whole as i64, nanos)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let now = Utc::now();
        Self::new(now.timestamp(), now.timestamp_subsec_nanos())
    }

    /// Seconds past epoch as a float (used for correlation against time fields)
    pub fn as_secs_f64(&self) -> f64 {
        self.seconds_past_epoch as f64 + 1e-9 * self.nanoseconds as f64
    }

    /// Convert to a UTC datetime for display and logging
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds_past_epoch, self.nanoseconds)
            .single()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds_past_epoch, self.nanoseconds)
    }
}

/// Value delivered by a single source update
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single scalar value
    Scalar(f64),
    /// A whole array (one "object")
    Array(Vec<f64>),
}

impl Payload {
    /// Number of scalar samples carried by this payload
    pub fn len(&self) -> usize {
        match self {
            Payload::Scalar(_) => 1,
            Payload::Array(values) => values.len(),
        }
    }

    /// Whether the payload carries no samples (empty array)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The samples as a slice
    pub fn values(&self) -> &[f64] {
        match self {
            Payload::Scalar(value) => std::slice::from_ref(value),
            Payload::Array(values) => values,
        }
    }

    /// The most recent sample (last element of an array)
    pub fn last(&self) -> Option<f64> {
        self.values().last().copied()
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Scalar(value)
    }
}

impl From<Vec<f64>> for Payload {
    fn from(values: Vec<f64>) -> Self {
        Payload::Array(values)
    }
}

/// Channel access protocol tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Channel Access: scalar-oriented, implicit `timeStamp`
    Ca,
    /// PV Access: structured data with nested fields
    #[default]
    Pva,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Ca => write!(f, "ca"),
            Protocol::Pva => write!(f, "pva"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ca" => Ok(Protocol::Ca),
            "pva" => Ok(Protocol::Pva),
            other => Err(ScopeError::invalid(format!("unknown protocol '{}'", other))),
        }
    }
}

/// Which Y axis a channel is drawn against in multi-axis layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AxisLocation {
    /// Primary (left) axis
    #[default]
    Left,
    /// Secondary (right) axis
    Right,
}

/// Build the source key for a PV and optional nested field path
pub fn source_key(pv_name: &str, field_path: Option<&str>) -> String {
    match field_path {
        Some(field) if !field.is_empty() => format!("{}.{}", pv_name, field),
        _ => pv_name.to_string(),
    }
}

/// A plotted channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier for this channel
    pub id: u32,
    /// Process variable name
    pub pv_name: String,
    /// Protocol used to subscribe to the PV
    pub protocol: Protocol,
    /// Nested field path inside a structured PV
    pub field_path: Option<String>,
    /// Color for plotting (RGBA)
    pub color: [u8; 4],
    /// Constant added to every Y sample before processing
    pub dc_offset: f64,
    /// Axis placement for multi-axis layout
    pub axis: AxisLocation,
    /// Whether the channel is started (drawn)
    pub started: bool,
}

impl Channel {
    /// Create a started channel with an auto-generated color
    pub fn new(id: u32, pv_name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            id,
            pv_name: pv_name.into(),
            protocol,
            field_path: None,
            color: Self::generate_color(id),
            dc_offset: 0.0,
            axis: AxisLocation::Left,
            started: true,
        }
    }

    /// Set the nested field path
    pub fn with_field(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    /// Set the DC offset
    pub fn with_dc_offset(mut self, offset: f64) -> Self {
        self.dc_offset = offset;
        self
    }

    /// Set the display color
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = color;
        self
    }

    /// Set the axis placement
    pub fn with_axis(mut self, axis: AxisLocation) -> Self {
        self.axis = axis;
        self
    }

    /// Key of the buffer holding this channel's samples
    pub fn source_key(&self) -> String {
        source_key(&self.pv_name, self.field_path.as_deref())
    }

    /// Whether this channel should be drawn
    ///
    /// Channels that feed the X axis or the trigger data-time field are
    /// auxiliary and never drawn, nor are stopped channels.
    pub fn should_be_drawn(&self, x_axis: Option<&str>, data_time_field: Option<&str>) -> bool {
        if !self.started || self.pv_name.is_empty() || self.pv_name == "None" {
            return false;
        }
        let key = self.source_key();
        Some(key.as_str()) != x_axis && Some(key.as_str()) != data_time_field
    }

    /// Generate a distinct color based on an index/ID
    /// Uses the golden ratio to spread hues evenly across the color wheel
    pub fn generate_color(index: u32) -> [u8; 4] {
        const GOLDEN_RATIO: f32 = 0.618033988749895;

        let hue = ((index as f32 * GOLDEN_RATIO) % 1.0) * 360.0;
        let (r, g, b) = hsv_to_rgb(hue, 0.7, 0.85);
        [r, g, b, 255]
    }
}

/// Connection status of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Never connected, or connection lost
    #[default]
    Disconnected,
    /// Receiving updates
    Connected,
    /// Removed; no longer accepts updates
    Removed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Removed => write!(f, "Removed"),
        }
    }
}

/// Statistics about data ingestion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionStats {
    /// Number of updates accepted into a buffer
    pub updates_received: u64,
    /// Number of updates dropped because their timestamp did not advance
    pub stale_dropped: u64,
    /// Number of updates for unregistered sources
    pub unrouted: u64,
    /// Number of updates rejected because the source was removed
    pub rejected_after_removal: u64,
    /// Arrays lost according to the array-id source
    pub lost_arrays: u64,
    /// Total samples stored (array elements count individually)
    pub samples_received: u64,
}

impl AcquisitionStats {
    /// Fraction of updates that were dropped as stale, in percent
    pub fn stale_rate(&self) -> f64 {
        let total = self.updates_received + self.stale_dropped;
        if total == 0 {
            0.0
        } else {
            (self.stale_dropped as f64 / total as f64) * 100.0
        }
    }

    /// Average number of samples per accepted update
    pub fn samples_per_update(&self) -> f64 {
        if self.updates_received == 0 {
            0.0
        } else {
            self.samples_received as f64 / self.updates_received as f64
        }
    }
}

/// Convert HSV (hue 0-360, saturation 0-1, value 0-1) to RGB (u8, u8, u8)
fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> (u8, u8, u8) {
    let c = value * saturation;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match (hue / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
