//! FFT (Fast Fourier Transform) analysis module
//!
//! Provides the frequency domain transforms of the display pipeline:
//! - One-sided magnitude spectrum
//! - Power spectral density
//! - Autocorrelation computed through the FFT
//! - Window functions (rectangular, Hamming) with coherent gain compensation

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

use crate::config::FftFilter;

/// Coherent gain compensation applied to Hamming windowed spectra
pub const HAMMING_GAIN: f64 = 1.853;

/// Window function type for FFT preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// Rectangular window (no windowing)
    #[default]
    Rectangular,
    /// Hamming window (reduced side lobes)
    Hamming,
}

impl WindowFunction {
    /// Compute window coefficient at position i out of n samples
    ///
    /// The Hamming window is symmetric: both end points equal 0.08.
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hamming => {
                if n <= 1 {
                    return 1.0;
                }
                0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos()
            }
        }
    }

    /// Generate window coefficients for n samples
    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }

    /// Amplitude gain compensating the window's attenuation
    pub fn gain(&self) -> f64 {
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hamming => HAMMING_GAIN,
        }
    }
}

impl From<FftFilter> for WindowFunction {
    fn from(filter: FftFilter) -> Self {
        match filter {
            FftFilter::None => WindowFunction::Rectangular,
            FftFilter::Hamming => WindowFunction::Hamming,
        }
    }
}

/// One-sided spectrum
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectrumResult {
    /// Frequency bins (Hz)
    pub frequencies: Vec<f64>,
    /// Magnitude or power per bin
    pub values: Vec<f64>,
}

impl SpectrumResult {
    /// Data points for plotting (frequency, value pairs)
    pub fn plot_points(&self) -> Vec<[f64; 2]> {
        self.frequencies
            .iter()
            .zip(self.values.iter())
            .map(|(&f, &v)| [f, v])
            .collect()
    }
}

/// Spectrum analyzer for the frequency domain display modes
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
    window: WindowFunction,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("window", &self.window)
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// Create a new analyzer with a rectangular window
    pub fn new() -> Self {
        Self::with_window(WindowFunction::Rectangular)
    }

    /// Create analyzer with a specific window
    pub fn with_window(window: WindowFunction) -> Self {
        Self {
            planner: FftPlanner::new(),
            window,
        }
    }

    /// Set window
    pub fn set_window(&mut self, window: WindowFunction) {
        self.window = window;
    }

    /// Windowed forward FFT of the samples (full length, unnormalised)
    fn forward(&mut self, samples: &[f64]) -> Vec<Complex<f64>> {
        let n = samples.len();
        let window = self.window.generate(n);
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);
        buffer
    }

    fn frequencies(n: usize, sample_period: f64) -> Vec<f64> {
        let resolution = 1.0 / (n as f64 * sample_period);
        (0..n / 2 + 1).map(|i| i as f64 * resolution).collect()
    }

    /// One-sided magnitude spectrum: `2·g·|X|/n`, DC bin halved
    ///
    /// # Arguments
    /// * `samples` - Time-domain samples
    /// * `sample_period` - Seconds between samples
    pub fn magnitude(&mut self, samples: &[f64], sample_period: f64) -> SpectrumResult {
        let n = samples.len();
        if n == 0 {
            return SpectrumResult::default();
        }

        let gain = self.window.gain();
        let spectrum = self.forward(samples);
        let mut values: Vec<f64> = spectrum
            .iter()
            .take(n / 2 + 1)
            .map(|c| 2.0 * gain * c.norm() / n as f64)
            .collect();
        values[0] /= 2.0;

        SpectrumResult {
            frequencies: Self::frequencies(n, sample_period),
            values,
        }
    }

    /// One-sided power spectral density: `2·g²·|X|²·dt/n`, DC bin halved
    ///
    /// Normalised by the buffer length and time span (`n·dt`), so a unit
    /// sinusoid's power integrates to its mean square.
    pub fn psd(&mut self, samples: &[f64], sample_period: f64) -> SpectrumResult {
        let n = samples.len();
        if n == 0 {
            return SpectrumResult::default();
        }

        let gain = self.window.gain();
        let scale = 2.0 * gain * gain * sample_period / n as f64;
        let spectrum = self.forward(samples);
        let mut values: Vec<f64> = spectrum
            .iter()
            .take(n / 2 + 1)
            .map(|c| scale * c.norm_sqr())
            .collect();
        values[0] /= 2.0;

        SpectrumResult {
            frequencies: Self::frequencies(n, sample_period),
            values,
        }
    }

    /// Circular autocorrelation through the FFT, normalised so lag 0 is the mean square
    pub fn autocorrelation(&mut self, samples: &[f64]) -> Vec<f64> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }

        let mut power: Vec<Complex<f64>> = self
            .forward(samples)
            .into_iter()
            .map(|c| c * c.conj())
            .collect();

        let ifft = self.planner.plan_fft_inverse(n);
        ifft.process(&mut power);

        // rustfft leaves the inverse unnormalised: one 1/n for the transform, one for the mean
        let norm = (n * n) as f64;
        power.iter().map(|c| c.re / norm).collect()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, sample_rate: f64, freq: f64, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    /// Index of the largest non-DC bin
    fn peak_bin(values: &[f64]) -> usize {
        (1..values.len())
            .max_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap()
    }

    #[test]
    fn test_window_functions() {
        let n = 100;
        for window in [WindowFunction::Rectangular, WindowFunction::Hamming] {
            let coeffs = window.generate(n);
            assert_eq!(coeffs.len(), n);
            for &c in &coeffs {
                assert!(
                    (0.0..=1.0).contains(&c),
                    "{:?} coefficient {} out of range",
                    window,
                    c
                );
            }
        }

        let hamming = WindowFunction::Hamming.generate(5);
        assert!((hamming[0] - 0.08).abs() < 1e-12);
        assert!((hamming[4] - 0.08).abs() < 1e-12);
        assert!((hamming[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_window_from_filter() {
        assert_eq!(WindowFunction::from(FftFilter::None), WindowFunction::Rectangular);
        assert_eq!(WindowFunction::from(FftFilter::Hamming).gain(), HAMMING_GAIN);
    }

    #[test]
    fn test_fft_sine_wave_amplitude() {
        // 50 Hz sine sampled at 1 kHz for 1 s falls exactly on a bin
        let samples = sine(1000, 1000.0, 50.0, 2.0);
        let mut analyzer = SpectrumAnalyzer::new();
        let result = analyzer.magnitude(&samples, 1e-3);

        assert_eq!(result.frequencies.len(), 501);
        assert!((result.frequencies[1] - 1.0).abs() < 1e-12);

        let idx = peak_bin(&result.values);
        assert!((result.frequencies[idx] - 50.0).abs() < 1e-9);
        let peak = result.values[idx];
        assert!((peak - 2.0).abs() < 1e-6, "peak amplitude {}", peak);
    }

    #[test]
    fn test_fft_dc_bin_halved() {
        let samples = vec![3.0; 64];
        let mut analyzer = SpectrumAnalyzer::new();
        let result = analyzer.magnitude(&samples, 1.0);
        assert!((result.values[0] - 3.0).abs() < 1e-9);
        assert!(result.values[1..].iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_fft_empty_input() {
        let mut analyzer = SpectrumAnalyzer::new();
        let result = analyzer.magnitude(&[], 1.0);
        assert!(result.frequencies.is_empty());
        assert!(result.values.is_empty());
        assert!(result.plot_points().is_empty());
        assert!(analyzer.autocorrelation(&[]).is_empty());
    }

    #[test]
    fn test_psd_parseval() {
        // Unit sine has mean square 0.5; one-sided PSD summed over bins times df
        let samples = sine(256, 256.0, 16.0, 1.0);
        let dt = 1.0 / 256.0;
        let mut analyzer = SpectrumAnalyzer::new();
        let result = analyzer.psd(&samples, dt);
        let df = result.frequencies[1] - result.frequencies[0];
        let power: f64 = result.values.iter().sum::<f64>() * df;
        assert!((power - 0.5).abs() < 1e-6, "power {}", power);
    }

    #[test]
    fn test_autocorrelation_lag_zero_is_mean_square() {
        let samples = vec![1.0, -2.0, 3.0, 0.5];
        let mean_square = samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64;
        let mut analyzer = SpectrumAnalyzer::new();
        let ac = analyzer.autocorrelation(&samples);
        assert_eq!(ac.len(), 4);
        assert!((ac[0] - mean_square).abs() < 1e-9);
        // Circular lag 1: (1*-2 + -2*3 + 3*0.5 + 0.5*1) / 4
        assert!((ac[1] - (-6.0 / 4.0)).abs() < 1e-9);
        assert!(ac.iter().all(|v| v.abs() <= ac[0] + 1e-9));
    }

    #[test]
    fn test_hamming_gain_compensation() {
        let samples = sine(1000, 1000.0, 50.0, 1.0);
        let mut analyzer = SpectrumAnalyzer::with_window(WindowFunction::Hamming);
        let result = analyzer.magnitude(&samples, 1e-3);
        let peak = result.values[peak_bin(&result.values)];
        // Coherent gain of the Hamming window is ~0.54; 1.853 brings it near unity
        assert!((peak - 1.0).abs() < 0.05, "peak {}", peak);
    }
}
