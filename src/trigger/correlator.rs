//! Locating a trigger instant in buffered time data
//!
//! Data channels that carry a per-sample time array (the *data time field*) can
//! be aligned on the trigger: the sample nearest the trigger instant becomes the
//! centre of a capture window the size of the buffer capacity N, with
//! `floor(N/2)` samples before it and `ceil(N/2) - 1` after it.
//!
//! Windows are clamped to what is buffered, never padded. A window missing
//! samples *after* the trigger keeps the trigger pending so it can be
//! re-centred once more data arrives.

use thiserror::Error;

use super::engine::TriggerEvent;
use crate::acquisition::BufferSnapshot;

/// The trigger instant lies outside the buffered time range
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationMiss {
    /// Trigger is older than the oldest buffered sample
    #[error("trigger is {off_by:.3} s older than buffered data")]
    BeforeBuffer {
        /// Trigger instant, seconds past epoch
        trigger: f64,
        /// Oldest buffered time
        first: f64,
        /// `first - trigger`
        off_by: f64,
        /// Buffer size that would have held the trigger (only when the buffer was full)
        suggested_buffer: Option<usize>,
    },

    /// Buffered data has not reached the trigger instant yet
    #[error("data is {behind:.3} s behind trigger time")]
    AfterBuffer {
        /// Trigger instant, seconds past epoch
        trigger: f64,
        /// Newest buffered time
        last: f64,
        /// `trigger - last`
        behind: f64,
    },

    /// The time field buffer is empty
    #[error("no buffered time data")]
    NoTimeData,
}

/// Range of buffer indices to display around a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    /// First index (inclusive)
    pub start: usize,
    /// Last index (exclusive)
    pub end: usize,
    /// Index of the sample nearest the trigger
    pub trigger_index: usize,
    /// Fewer than `floor(N/2)` samples were available before the trigger
    pub truncated_before: bool,
    /// Fewer than `ceil(N/2) - 1` samples were available after the trigger
    pub truncated_after: bool,
}

impl CaptureWindow {
    /// Build the window of size `size` centred on `index` within `len` samples
    pub fn centred(index: usize, len: usize, size: usize) -> Self {
        let size = size.max(1);
        let before = size / 2;
        let after = size - before - 1;
        let start = index.saturating_sub(before);
        let wanted_end = index + after + 1;
        let end = wanted_end.min(len);
        Self {
            start,
            end,
            trigger_index: index,
            truncated_before: index < before,
            truncated_after: wanted_end > len,
        }
    }

    /// Number of samples in the window
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether waiting for newer data cannot improve this window
    pub fn is_complete(&self) -> bool {
        !self.truncated_after
    }

    /// Trigger position relative to the window start
    pub fn marker(&self) -> usize {
        self.trigger_index - self.start
    }
}

/// Index of the entry nearest `target` in ascending `times` (ties go to the earlier index)
///
/// Returns a [`CorrelationMiss`] when `target` lies outside `times[0]..=times[last]`.
pub fn nearest_index(times: &[f64], target: f64) -> Result<usize, CorrelationMiss> {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Err(CorrelationMiss::NoTimeData);
    };
    if target < first {
        return Err(CorrelationMiss::BeforeBuffer {
            trigger: target,
            first,
            off_by: first - target,
            suggested_buffer: None,
        });
    }
    if target > last {
        return Err(CorrelationMiss::AfterBuffer {
            trigger: target,
            last,
            behind: target - last,
        });
    }

    let upper = times.partition_point(|&t| t < target);
    if upper == 0 {
        return Ok(0);
    }
    let lower = upper - 1;
    if upper >= times.len() || target - times[lower] <= times[upper] - target {
        Ok(lower)
    } else {
        Ok(upper)
    }
}

/// Buffer size that would have kept a missed trigger in range
///
/// Extrapolates the buffered sample rate back to the trigger and rounds up to
/// three significant digits.
pub fn suggest_buffer_size(
    buffered: usize,
    first: f64,
    last: f64,
    trigger: f64,
    capacity: usize,
) -> Option<usize> {
    let span = last - first;
    if span <= 0.0 || !span.is_finite() || trigger >= first {
        return None;
    }
    let increase = buffered as f64 * (first - trigger) / span;
    let needed = increase + capacity as f64;
    Some(round_up_significant(needed, 3))
}

fn round_up_significant(value: f64, digits: i32) -> usize {
    if value <= 1.0 {
        return 1;
    }
    let exponent = value.log10().ceil() as i32;
    let unit = 10f64.powi((exponent - digits).max(0));
    ((value / unit).ceil() * unit) as usize
}

/// Status of the trigger as reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TriggerStatus {
    /// Trigger mode is off
    #[default]
    Off,
    /// Armed, no trigger pending
    WaitingForTrigger,
    /// Trigger received, collecting samples after it
    CollectingData,
    /// Buffered data lags behind the trigger instant
    WaitingForData {
        /// Seconds between newest data and trigger
        behind_secs: f64,
    },
    /// Trigger fell before the buffered history
    Missed {
        /// Seconds between trigger and oldest data
        off_by_secs: f64,
        /// Suggested buffer capacity
        suggested_buffer: usize,
    },
    /// Trigger source is disconnected
    Disconnected,
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerStatus::Off => write!(f, "Off"),
            TriggerStatus::WaitingForTrigger => write!(f, "Waiting for trigger"),
            TriggerStatus::CollectingData => write!(f, "Collecting Data"),
            TriggerStatus::WaitingForData { .. } => write!(f, "Waiting for new data"),
            TriggerStatus::Missed {
                off_by_secs,
                suggested_buffer,
            } => write!(
                f,
                "Trig off by {:.1} s (Set buf={:.1e})",
                off_by_secs, *suggested_buffer as f64
            ),
            TriggerStatus::Disconnected => write!(f, "Trigger disconnected"),
        }
    }
}

/// Outcome of correlating the pending trigger on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// No trigger is pending
    Idle,
    /// No data time field: draw the newest samples as they are
    DrawNow(TriggerEvent),
    /// Display this window of the time-field buffer
    Window(TriggerEvent, CaptureWindow),
    /// Trigger not locatable this tick
    Miss(CorrelationMiss),
}

/// Per-scope correlation state: the pending trigger and its status
#[derive(Debug, Clone, Default)]
pub struct TimeCorrelator {
    data_time_field: Option<String>,
    pending: Option<TriggerEvent>,
    status: TriggerStatus,
    missed_triggers: u64,
    overlapping_triggers: u64,
    captures: u64,
    missing_field_warned: bool,
}

impl TimeCorrelator {
    /// Create a correlator for the given data time field
    pub fn new(data_time_field: Option<String>) -> Self {
        Self {
            data_time_field,
            ..Default::default()
        }
    }

    /// Source key of the data time field
    pub fn data_time_field(&self) -> Option<&str> {
        self.data_time_field.as_deref()
    }

    /// Replace the data time field
    pub fn set_data_time_field(&mut self, field: Option<String>) {
        self.data_time_field = field;
        self.missing_field_warned = false;
    }

    /// Trigger waiting for its capture
    pub fn pending(&self) -> Option<&TriggerEvent> {
        self.pending.as_ref()
    }

    /// Current status
    pub fn status(&self) -> TriggerStatus {
        self.status
    }

    /// Force a status (mode changes, disconnects)
    pub fn set_status(&mut self, status: TriggerStatus) {
        self.status = status;
    }

    /// Triggers that fell before the buffered history
    pub fn missed_triggers(&self) -> u64 {
        self.missed_triggers
    }

    /// Triggers ignored because a capture was still pending
    pub fn overlapping_triggers(&self) -> u64 {
        self.overlapping_triggers
    }

    /// Completed captures
    pub fn captures(&self) -> u64 {
        self.captures
    }

    /// Accept a trigger; returns false if one is already pending
    pub fn arm(&mut self, event: TriggerEvent) -> bool {
        if self.pending.is_some() {
            self.overlapping_triggers += 1;
            tracing::debug!(
                "Ignoring trigger #{}: capture still pending",
                event.sequence
            );
            return false;
        }
        self.pending = Some(event);
        self.status = TriggerStatus::CollectingData;
        true
    }

    /// Drop any pending trigger
    pub fn reset(&mut self, status: TriggerStatus) {
        self.pending = None;
        self.status = status;
    }

    /// Locate the pending trigger in the data time field buffer
    ///
    /// `time_field` is the snapshot of the data time field, or `None` if that
    /// source has no buffer. A complete window, a draw-now fallback or a miss
    /// before the buffered range all clear the pending trigger; a truncated
    /// window or data lagging behind the trigger keep it.
    pub fn correlate(&mut self, time_field: Option<&BufferSnapshot>) -> Correlation {
        let Some(event) = self.pending else {
            return Correlation::Idle;
        };

        let time_field = match (self.data_time_field.as_deref(), time_field) {
            (None, _) => return self.complete_draw_now(event),
            (Some(field), None) => {
                if !self.missing_field_warned {
                    tracing::warn!("Data time field '{}' is absent in data, ignoring it", field);
                    self.missing_field_warned = true;
                }
                return self.complete_draw_now(event);
            }
            (Some(_), Some(snapshot)) => snapshot,
        };
        self.missing_field_warned = false;

        let times = &time_field.values;
        let trigger = event.timestamp.as_secs_f64();
        match nearest_index(times, trigger) {
            Ok(index) => {
                let size = if time_field.sample_capacity > 0 {
                    time_field.sample_capacity
                } else {
                    times.len()
                };
                let window = CaptureWindow::centred(index, times.len(), size);
                if window.is_complete() {
                    self.pending = None;
                    self.captures += 1;
                    self.status = TriggerStatus::WaitingForTrigger;
                } else {
                    self.status = TriggerStatus::CollectingData;
                }
                Correlation::Window(event, window)
            }
            Err(CorrelationMiss::BeforeBuffer { first, off_by, .. }) => {
                self.pending = None;
                let last = times.last().copied().unwrap_or(first);
                let suggested = if time_field.is_full() {
                    suggest_buffer_size(times.len(), first, last, trigger, time_field.capacity)
                } else {
                    None
                };
                match suggested {
                    Some(size) => {
                        self.missed_triggers += 1;
                        self.status = TriggerStatus::Missed {
                            off_by_secs: off_by,
                            suggested_buffer: size,
                        };
                        tracing::debug!(
                            "Trigger missed by {:.3} s, buffer of {} would hold it",
                            off_by,
                            size
                        );
                    }
                    None => {
                        self.missed_triggers = 0;
                        self.status = TriggerStatus::WaitingForTrigger;
                    }
                }
                Correlation::Miss(CorrelationMiss::BeforeBuffer {
                    trigger,
                    first,
                    off_by,
                    suggested_buffer: suggested,
                })
            }
            Err(miss @ CorrelationMiss::AfterBuffer { behind, .. }) => {
                self.status = TriggerStatus::WaitingForData {
                    behind_secs: behind,
                };
                tracing::debug!("{}", miss);
                Correlation::Miss(miss)
            }
            Err(miss @ CorrelationMiss::NoTimeData) => {
                self.status = TriggerStatus::WaitingForData { behind_secs: 0.0 };
                Correlation::Miss(miss)
            }
        }
    }

    fn complete_draw_now(&mut self, event: TriggerEvent) -> Correlation {
        self.pending = None;
        self.captures += 1;
        self.status = TriggerStatus::WaitingForTrigger;
        Correlation::DrawNow(event)
    }
}
