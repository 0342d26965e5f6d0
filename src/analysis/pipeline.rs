//! Per-channel signal processing pipeline
//!
//! Each refresh tick, every drawn channel's samples go through the same fixed
//! sequence:
//!
//! 1. DC offset is added to every sample
//! 2. Exponential moving average (per channel state, kept across ticks)
//! 3. Display mode transform (normal, FFT, PSD, diff, autocorrelation)
//! 4. Optional histogram of the transformed values
//!
//! Too few samples for the active transform yields an empty series for the
//! tick instead of an error.

use std::collections::HashMap;

use super::fft::{SpectrumAnalyzer, WindowFunction};
use super::histogram::histogram;
use super::smoothing::Ema;
use crate::config::{DisplayConfig, DisplayMode};
use crate::error::{Result, ScopeError};
use crate::types::Timestamp;

/// How a series' points should be interpreted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesKind {
    /// (x, y) samples joined by lines
    Line,
    /// (frequency, magnitude or power) bins
    Spectrum,
    /// (left bin edge, count) steps; the last bin ends at `upper_edge`
    Histogram {
        /// Right edge of the last bin
        upper_edge: f64,
    },
}

/// Output of the pipeline for one channel and one tick
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySeries {
    /// Interpretation of the points
    pub kind: SeriesKind,
    /// Points in display order
    pub points: Vec<[f64; 2]>,
}

impl DisplaySeries {
    /// A series with no points
    pub fn empty(kind: SeriesKind) -> Self {
        Self {
            kind,
            points: Vec::new(),
        }
    }

    /// Line series from y values plotted against x values
    pub fn line(xs: &[f64], ys: &[f64]) -> Self {
        Self {
            kind: SeriesKind::Line,
            points: xs.iter().zip(ys).map(|(&x, &y)| [x, y]).collect(),
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Y values
    pub fn ys(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p[1])
    }

    /// Minimum and maximum of the finite y values
    pub fn y_range(&self) -> Option<(f64, f64)> {
        finite_range(self.points.iter().map(|p| p[1]))
    }

    /// Minimum and maximum of the finite x values
    pub fn x_range(&self) -> Option<(f64, f64)> {
        let range = finite_range(self.points.iter().map(|p| p[0]))?;
        match self.kind {
            SeriesKind::Histogram { upper_edge } => Some((range.0, range.1.max(upper_edge))),
            _ => Some(range),
        }
    }
}

pub(crate) fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None::<(f64, f64)>, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        })
}

/// Samples of one channel for one tick
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    /// Channel the samples belong to (keys the smoothing state)
    pub channel_id: u32,
    /// Y samples, oldest first
    pub values: &'a [f64],
    /// Update timestamp of each sample
    pub timestamps: &'a [Timestamp],
    /// Constant added to every sample
    pub dc_offset: f64,
    /// X axis source values, used when their length matches `values`
    pub x_axis: Option<&'a [f64]>,
}

impl<'a> PipelineInput<'a> {
    /// Input without timestamps, offset or X axis
    pub fn new(channel_id: u32, values: &'a [f64]) -> Self {
        Self {
            channel_id,
            values,
            timestamps: &[],
            dc_offset: 0.0,
            x_axis: None,
        }
    }

    /// X axis values if usable for this input
    fn matched_x_axis(&self) -> Option<&'a [f64]> {
        self.x_axis.filter(|x| x.len() == self.values.len())
    }

    /// Seconds between samples
    ///
    /// Mean spacing of the X axis when it matches the data, otherwise the
    /// spacing of strictly increasing sample timestamps, otherwise 1 s.
    pub fn sample_period(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 1.0;
        }
        if let Some(x) = self.matched_x_axis() {
            let period = (x[n - 1] - x[0]) / (n - 1) as f64;
            if period.is_finite() && period > 0.0 {
                return period;
            }
        }
        if self.timestamps.len() == n && self.timestamps.windows(2).all(|w| w[0] < w[1]) {
            let span = self.timestamps[n - 1].as_secs_f64() - self.timestamps[0].as_secs_f64();
            if span > 0.0 {
                return span / (n - 1) as f64;
            }
        }
        1.0
    }

    /// X coordinates for a time-domain series of length `len`
    ///
    /// X axis values relative to their first entry when available, sample
    /// indices otherwise. `skip` drops leading entries (used by diff).
    fn time_axis(&self, len: usize, skip: usize) -> Vec<f64> {
        match self.matched_x_axis() {
            Some(x) => x
                .iter()
                .skip(skip)
                .take(len)
                .map(|v| v - x[0])
                .collect(),
            None => (0..len).map(|i| i as f64).collect(),
        }
    }
}

/// Signal processing for all channels of a scope
#[derive(Debug)]
pub struct SignalPipeline {
    config: DisplayConfig,
    analyzer: SpectrumAnalyzer,
    smoothing: HashMap<u32, Ema>,
}

impl SignalPipeline {
    /// Create a pipeline for the given display configuration
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::with_window(config.fft_filter.into()),
            config,
            smoothing: HashMap::new(),
        }
    }

    /// Active display configuration
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Replace the display configuration
    ///
    /// Smoothing restarts when the mode or EMA factor changes.
    pub fn set_config(&mut self, config: DisplayConfig) {
        if config.mode != self.config.mode || config.ema_factor != self.config.ema_factor {
            self.smoothing.clear();
        }
        self.analyzer.set_window(WindowFunction::from(config.fft_filter));
        self.config = config;
    }

    /// Drop the smoothing state of a removed channel
    pub fn forget(&mut self, channel_id: u32) {
        self.smoothing.remove(&channel_id);
    }

    /// Drop all smoothing state
    pub fn reset(&mut self) {
        self.smoothing.clear();
    }

    fn output_kind(&self) -> SeriesKind {
        if self.config.mode.is_fft() {
            SeriesKind::Spectrum
        } else if self.config.histogram_active() {
            SeriesKind::Histogram { upper_edge: 0.0 }
        } else {
            SeriesKind::Line
        }
    }

    /// Run the pipeline, reporting too-short input as an error
    pub fn process(&mut self, input: &PipelineInput<'_>) -> Result<DisplaySeries> {
        let mode = self.config.mode;
        let required = mode.min_samples();
        if input.values.len() < required {
            return Err(ScopeError::InsufficientData {
                mode,
                required,
                available: input.values.len(),
            });
        }

        let offset: Vec<f64> = input.values.iter().map(|v| v + input.dc_offset).collect();

        let factor = self.config.ema_factor;
        let smoothed = self
            .smoothing
            .entry(input.channel_id)
            .or_insert_with(|| Ema::new(factor))
            .apply(&offset);

        let series = match mode {
            DisplayMode::Normal => {
                DisplaySeries::line(&input.time_axis(smoothed.len(), 0), &smoothed)
            }
            DisplayMode::Diff => {
                let diff: Vec<f64> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
                DisplaySeries::line(&input.time_axis(diff.len(), 1), &diff)
            }
            DisplayMode::Fft => {
                let spectrum = self.analyzer.magnitude(&smoothed, input.sample_period());
                DisplaySeries {
                    kind: SeriesKind::Spectrum,
                    points: spectrum.plot_points(),
                }
            }
            DisplayMode::Psd => {
                let spectrum = self.analyzer.psd(&smoothed, input.sample_period());
                DisplaySeries {
                    kind: SeriesKind::Spectrum,
                    points: spectrum.plot_points(),
                }
            }
            DisplayMode::AutocorrelateFft => {
                let ac = self.analyzer.autocorrelation(&smoothed);
                DisplaySeries::line(&input.time_axis(ac.len(), 0), &ac)
            }
        };

        if !self.config.histogram_active() {
            return Ok(series);
        }

        let values: Vec<f64> = series.ys().collect();
        let hist = histogram(&values, self.config.bins)?;
        Ok(DisplaySeries {
            kind: SeriesKind::Histogram {
                upper_edge: hist.upper_edge(),
            },
            points: hist.points(),
        })
    }

    /// Run the pipeline; a tick-local failure becomes an empty series
    pub fn render(&mut self, input: &PipelineInput<'_>) -> DisplaySeries {
        match self.process(input) {
            Ok(series) => series,
            Err(e) => {
                tracing::trace!("Channel {}: {}", input.channel_id, e);
                DisplaySeries::empty(self.output_kind())
            }
        }
    }
}
