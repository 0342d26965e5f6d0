//! Analysis module for signal processing
//!
//! This module provides the display pipeline and its building blocks:
//! - FFT magnitude spectrum, power spectral density and autocorrelation
//! - Exponential moving average smoothing across ticks
//! - Fixed bin count histograms
//! - [`SignalPipeline`] chaining them per channel

pub mod fft;
pub mod histogram;
pub mod pipeline;
pub mod smoothing;

pub use fft::{SpectrumAnalyzer, SpectrumResult, WindowFunction, HAMMING_GAIN};
pub use histogram::{histogram, Histogram};
pub use pipeline::{DisplaySeries, PipelineInput, SeriesKind, SignalPipeline};
pub use smoothing::Ema;
