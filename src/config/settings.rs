//! Acquisition, trigger and display settings
//!
//! These are the sections of [`ScopeConfig`](super::ScopeConfig). Each section
//! validates itself; the engine refuses to start with a section that fails.
//!
//! # Main Types
//!
//! - [`AcquisitionConfig`] - Buffer capacity, [`BufferUnit`] and sampling mode
//! - [`TriggerConfig`] - [`TriggerMode`], threshold, time fields
//! - [`DisplayConfig`] - [`DisplayMode`], [`FftFilter`], smoothing, histogram, refresh
//!
//! # Mode Names
//!
//! All mode enums serialize to, and parse from, the lowercase names used in
//! scope configuration files (`"gtthreshold"`, `"autocorrelate_fft"`, ...).
//! Unknown names are rejected as invalid configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ScopeError};
use crate::types::Protocol;

/// Default buffer capacity (samples or objects)
pub const DEFAULT_BUFFER_CAPACITY: usize = 2048;

/// Default histogram bin count
pub const DEFAULT_HISTOGRAM_BINS: usize = 100;

/// Upper bound accepted for the histogram bin count
pub const MAX_HISTOGRAM_BINS: usize = 100_000;

/// Default refresh interval in milliseconds
pub const DEFAULT_REFRESH_MS: u64 = 100;

/// Time field used implicitly by Channel Access trigger PVs
pub const CA_TIME_FIELD: &str = "timeStamp";

/// Unit in which a buffer capacity is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BufferUnit {
    /// Every scalar (or array element) takes one slot
    #[default]
    Samples,
    /// Every delivered payload takes one slot regardless of its length
    Objects,
}

impl std::fmt::Display for BufferUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferUnit::Samples => write!(f, "Samples"),
            BufferUnit::Objects => write!(f, "Objects"),
        }
    }
}

impl FromStr for BufferUnit {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "samples" => Ok(BufferUnit::Samples),
            "objects" => Ok(BufferUnit::Objects),
            other => Err(ScopeError::invalid(format!("unknown buffer unit '{}'", other))),
        }
    }
}

/// Buffer sizing and ingestion mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Buffer capacity, counted in `unit`
    pub capacity: usize,

    /// Unit of `capacity`
    pub unit: BufferUnit,

    /// Keep only the latest value per source and append it once per tick
    pub sampling_mode: bool,

    /// Capacity of the queue carrying trigger events to the refresh loop
    pub trigger_queue_size: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
            unit: BufferUnit::Samples,
            sampling_mode: false,
            trigger_queue_size: 64,
        }
    }
}

impl AcquisitionConfig {
    /// Validate the acquisition section
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ScopeError::invalid("buffer capacity must be positive"));
        }
        if self.trigger_queue_size == 0 {
            return Err(ScopeError::invalid("trigger queue size must be positive"));
        }
        Ok(())
    }
}

/// Trigger modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TriggerMode {
    /// Free running; never fires
    #[default]
    #[serde(rename = "none", alias = "off")]
    Off,
    /// Fire whenever the value changes
    #[serde(rename = "onchange")]
    OnChange,
    /// Fire when the value crosses above the threshold
    #[serde(rename = "gtthreshold")]
    GtThreshold,
    /// Fire when the value crosses below the threshold
    #[serde(rename = "ltthreshold")]
    LtThreshold,
}

impl TriggerMode {
    /// Whether this mode can ever fire
    pub fn is_active(&self) -> bool {
        !matches!(self, TriggerMode::Off)
    }

    /// Get all trigger modes
    pub fn all() -> &'static [TriggerMode] {
        &[
            TriggerMode::Off,
            TriggerMode::OnChange,
            TriggerMode::GtThreshold,
            TriggerMode::LtThreshold,
        ]
    }
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerMode::Off => write!(f, "none"),
            TriggerMode::OnChange => write!(f, "onchange"),
            TriggerMode::GtThreshold => write!(f, "gtthreshold"),
            TriggerMode::LtThreshold => write!(f, "ltthreshold"),
        }
    }
}

impl FromStr for TriggerMode {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(TriggerMode::Off),
            "onchange" => Ok(TriggerMode::OnChange),
            "gtthreshold" => Ok(TriggerMode::GtThreshold),
            "ltthreshold" => Ok(TriggerMode::LtThreshold),
            other => Err(ScopeError::invalid(format!("unknown trigger mode '{}'", other))),
        }
    }
}

/// Trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Trigger mode
    pub mode: TriggerMode,

    /// Source key of the trigger PV
    pub pv: Option<String>,

    /// Protocol of the trigger PV
    pub protocol: Protocol,

    /// Threshold for the Gt/Lt modes
    pub threshold: f64,

    /// Field of the trigger PV holding the trigger timestamp
    pub time_field: Option<String>,

    /// Source key of the per-sample time array of the data channels
    pub data_time_field: Option<String>,

    /// Grow buffers after a missed trigger and autoscale on the next render
    pub autoscale_buffer: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Off,
            pv: None,
            protocol: Protocol::Pva,
            threshold: 0.0,
            time_field: None,
            data_time_field: None,
            autoscale_buffer: true,
        }
    }
}

impl TriggerConfig {
    /// Time field actually used to read the trigger timestamp
    ///
    /// Channel Access always carries `timeStamp`; PV Access needs it configured.
    pub fn effective_time_field(&self) -> Option<&str> {
        match self.protocol {
            Protocol::Ca => Some(CA_TIME_FIELD),
            Protocol::Pva => self.time_field.as_deref(),
        }
    }

    /// Validate the trigger section
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(ScopeError::invalid("trigger threshold must be finite"));
        }
        if !self.mode.is_active() {
            return Ok(());
        }
        if self.pv.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(ScopeError::invalid(format!(
                "trigger mode '{}' needs a trigger PV",
                self.mode
            )));
        }
        if self.effective_time_field().is_none() {
            return Err(ScopeError::invalid(
                "pva trigger needs a trigger time field",
            ));
        }
        Ok(())
    }
}

/// Display modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DisplayMode {
    /// Raw samples
    #[default]
    #[serde(rename = "normal")]
    Normal,
    /// Magnitude spectrum
    #[serde(rename = "fft")]
    Fft,
    /// Power spectral density
    #[serde(rename = "psd")]
    Psd,
    /// First difference
    #[serde(rename = "diff")]
    Diff,
    /// Autocorrelation computed through the FFT
    #[serde(rename = "autocorrelate_fft")]
    AutocorrelateFft,
}

impl DisplayMode {
    /// Whether the output is a frequency-domain series
    pub fn is_fft(&self) -> bool {
        matches!(self, DisplayMode::Fft | DisplayMode::Psd)
    }

    /// Minimum number of input samples the transform needs
    pub fn min_samples(&self) -> usize {
        match self {
            DisplayMode::Normal => 1,
            DisplayMode::Fft
            | DisplayMode::Psd
            | DisplayMode::Diff
            | DisplayMode::AutocorrelateFft => 2,
        }
    }

    /// Get all display modes
    pub fn all() -> &'static [DisplayMode] {
        &[
            DisplayMode::Normal,
            DisplayMode::Fft,
            DisplayMode::Psd,
            DisplayMode::Diff,
            DisplayMode::AutocorrelateFft,
        ]
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayMode::Normal => write!(f, "normal"),
            DisplayMode::Fft => write!(f, "fft"),
            DisplayMode::Psd => write!(f, "psd"),
            DisplayMode::Diff => write!(f, "diff"),
            DisplayMode::AutocorrelateFft => write!(f, "autocorrelate_fft"),
        }
    }
}

impl FromStr for DisplayMode {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(DisplayMode::Normal),
            "fft" => Ok(DisplayMode::Fft),
            "psd" => Ok(DisplayMode::Psd),
            "diff" => Ok(DisplayMode::Diff),
            "autocorrelate_fft" => Ok(DisplayMode::AutocorrelateFft),
            other => Err(ScopeError::invalid(format!("{} is not valid display mode", other))),
        }
    }
}

/// Window applied before FFT-based transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FftFilter {
    /// No windowing
    #[default]
    None,
    /// Hamming window
    Hamming,
}

impl std::fmt::Display for FftFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FftFilter::None => write!(f, "none"),
            FftFilter::Hamming => write!(f, "hamming"),
        }
    }
}

impl FromStr for FftFilter {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(FftFilter::None),
            "hamming" => Ok(FftFilter::Hamming),
            other => Err(ScopeError::invalid(format!(
                "{} is not valid FFT filter type",
                other
            ))),
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Transform applied to each channel
    pub mode: DisplayMode,

    /// Window used by FFT, PSD and autocorrelation
    pub fft_filter: FftFilter,

    /// Exponential moving average factor (1 = no smoothing)
    pub ema_factor: u32,

    /// All channels share one Y scale
    pub single_axis: bool,

    /// Replace each series with its histogram
    pub histogram: bool,

    /// Number of histogram bins
    pub bins: usize,

    /// Recompute axis bounds on every frame
    pub autoscale: bool,

    /// Refresh interval in milliseconds
    pub refresh_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Normal,
            fft_filter: FftFilter::None,
            ema_factor: 1,
            single_axis: true,
            histogram: false,
            bins: DEFAULT_HISTOGRAM_BINS,
            autoscale: false,
            refresh_ms: DEFAULT_REFRESH_MS,
        }
    }
}

impl DisplayConfig {
    /// Refresh interval as a duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    /// Whether histogram replacement applies to the current mode
    ///
    /// Spectra are already binned by frequency and are never histogrammed.
    pub fn histogram_active(&self) -> bool {
        self.histogram && !self.mode.is_fft()
    }

    /// Validate the display section
    pub fn validate(&self) -> Result<()> {
        if self.ema_factor < 1 {
            return Err(ScopeError::invalid("EMA factor must be at least 1"));
        }
        if self.bins == 0 || self.bins > MAX_HISTOGRAM_BINS {
            return Err(ScopeError::invalid(format!(
                "histogram bin count {} outside 1..={}",
                self.bins, MAX_HISTOGRAM_BINS
            )));
        }
        if self.refresh_ms == 0 {
            return Err(ScopeError::invalid("refresh interval must be positive"));
        }
        Ok(())
    }
}
