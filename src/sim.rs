//! Simulated PV source
//!
//! Produces [`SampleEvent`]s the way a subscription layer would, so a scope
//! can be exercised without a control system. Array signals share one sample
//! clock and are published together with a matching time array, which makes
//! them usable as a trigger data-time field.
//!
//! # Example
//!
//! ```ignore
//! use pvscope::sim::SimulatedSource;
//! use pvscope::types::Timestamp;
//!
//! let mut source = SimulatedSource::scope_sample();
//! for event in source.next_events() {
//!     engine.ingest(event)?;
//! }
//! ```

use crate::acquisition::SampleEvent;
use crate::types::{Payload, Timestamp};

/// Waveform of a simulated signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WavePattern {
    /// Constant value
    Constant(f64),
    /// Sine wave
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Square wave between `+amplitude` and `-amplitude`
    Square { period: f64, amplitude: f64 },
    /// Rising ramp that restarts every period
    Sawtooth { period: f64, amplitude: f64 },
    /// Counter stepping once per update, wrapping between `min` and `max`
    Counter { step: f64, min: f64, max: f64 },
    /// Uniform values within a range
    Random { min: f64, max: f64 },
}

impl Default for WavePattern {
    fn default() -> Self {
        WavePattern::Sine {
            frequency: 1.0,
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

/// One simulated PV (or PV field)
#[derive(Debug, Clone)]
pub struct SimSignal {
    /// PV name
    pub pv_name: String,
    /// Structure field, if any
    pub field_path: Option<String>,
    /// Waveform
    pub pattern: WavePattern,
    /// Uniform noise amplitude (0 = none)
    pub noise_amplitude: f64,
    /// Publish a whole array per update instead of one scalar
    pub array: bool,
    counter_value: f64,
}

impl SimSignal {
    /// Scalar signal
    pub fn scalar(pv_name: impl Into<String>, pattern: WavePattern) -> Self {
        Self {
            pv_name: pv_name.into(),
            field_path: None,
            pattern,
            noise_amplitude: 0.0,
            array: false,
            counter_value: 0.0,
        }
    }

    /// Array signal sampled on the shared sample clock
    pub fn array(pv_name: impl Into<String>, field_path: impl Into<String>, pattern: WavePattern) -> Self {
        Self {
            field_path: Some(field_path.into()),
            array: true,
            ..Self::scalar(pv_name, pattern)
        }
    }

    /// Add uniform noise
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    fn value_at(&mut self, t: f64, rng: &mut XorShift) -> f64 {
        let base = match self.pattern {
            WavePattern::Constant(v) => v,
            WavePattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            WavePattern::Square { period, amplitude } => {
                if t.rem_euclid(period) < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            WavePattern::Sawtooth { period, amplitude } => {
                amplitude * (t.rem_euclid(period) / period)
            }
            WavePattern::Counter { step, min, max } => {
                self.counter_value += step;
                if self.counter_value > max {
                    self.counter_value = min;
                } else if self.counter_value < min {
                    self.counter_value = max;
                }
                self.counter_value
            }
            WavePattern::Random { min, max } => min + rng.next_f64() * (max - min),
        };

        if self.noise_amplitude > 0.0 {
            base + (rng.next_f64() - 0.5) * 2.0 * self.noise_amplitude
        } else {
            base
        }
    }
}

/// Xorshift generator; reproducible for a given seed
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        (s as f64) / (u64::MAX as f64)
    }
}

/// Deterministic generator of subscription events
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    signals: Vec<SimSignal>,
    time_field: Option<(String, String)>,
    array_len: usize,
    sample_period: f64,
    start: f64,
    next_sample: u64,
    rng: XorShift,
}

impl SimulatedSource {
    /// Source publishing `array_len` samples per update at `sample_rate` Hz
    pub fn new(array_len: usize, sample_rate: f64, start: Timestamp) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            1.0
        };
        Self {
            signals: Vec::new(),
            time_field: None,
            array_len: array_len.max(1),
            sample_period: 1.0 / sample_rate,
            start: start.as_secs_f64(),
            next_sample: 0,
            rng: XorShift(12345),
        }
    }

    /// Add a signal
    pub fn with_signal(mut self, signal: SimSignal) -> Self {
        self.signals.push(signal);
        self
    }

    /// Publish the sample times of array signals as `pv.field`
    pub fn with_time_field(mut self, pv_name: impl Into<String>, field: impl Into<String>) -> Self {
        self.time_field = Some((pv_name.into(), field.into()));
        self
    }

    /// Source matching [`ScopeConfig::sample`](crate::config::ScopeConfig::sample)
    pub fn scope_sample() -> Self {
        Self::new(256, 1000.0, Timestamp::now())
            .with_signal(SimSignal::array(
                "sim:wave",
                "sine",
                WavePattern::Sine {
                    frequency: 12.5,
                    amplitude: 1.0,
                    offset: 0.0,
                },
            ))
            .with_signal(SimSignal::array(
                "sim:wave",
                "square",
                WavePattern::Square {
                    period: 0.04,
                    amplitude: 0.5,
                },
            ))
            .with_time_field("sim:wave", "time")
            .with_signal(
                SimSignal::scalar(
                    "sim:noise",
                    WavePattern::Sine {
                        frequency: 0.2,
                        amplitude: 0.3,
                        offset: 0.0,
                    },
                )
                .with_noise(0.05),
            )
            .with_signal(SimSignal::scalar(
                "sim:trig",
                WavePattern::Square {
                    period: 1.0,
                    amplitude: 1.0,
                },
            ))
    }

    /// Seconds between array samples
    pub fn sample_period(&self) -> f64 {
        self.sample_period
    }

    /// Seconds covered by one update
    pub fn update_period(&self) -> f64 {
        self.sample_period * self.array_len as f64
    }

    /// Events of the next update, stamped with the time of its newest sample
    pub fn next_events(&mut self) -> Vec<SampleEvent> {
        let first = self.next_sample;
        self.next_sample += self.array_len as u64;

        let times: Vec<f64> = (first..self.next_sample)
            .map(|k| self.start + k as f64 * self.sample_period)
            .collect();
        let newest = times.last().copied().unwrap_or(self.start);
        let timestamp = Timestamp::from_secs_f64(newest);
        let elapsed: Vec<f64> = times.iter().map(|t| t - self.start).collect();

        let mut events = Vec::with_capacity(self.signals.len() + 1);
        if let Some((pv, field)) = &self.time_field {
            events.push(SampleEvent::new(pv.clone(), times.clone(), timestamp).with_field(field.clone()));
        }

        let rng = &mut self.rng;
        for signal in &mut self.signals {
            let payload = if signal.array {
                Payload::Array(elapsed.iter().map(|&t| signal.value_at(t, rng)).collect())
            } else {
                Payload::Scalar(signal.value_at(newest - self.start, rng))
            };
            let mut event = SampleEvent::new(signal.pv_name.clone(), payload, timestamp);
            if let Some(field) = &signal.field_path {
                event = event.with_field(field.clone());
            }
            events.push(event);
        }
        events
    }

    /// Disconnect notifications for every simulated PV
    pub fn disconnect_events(&self) -> Vec<SampleEvent> {
        let timestamp = Timestamp::from_secs_f64(
            self.start + self.next_sample as f64 * self.sample_period,
        );
        let mut pvs: Vec<&str> = self.signals.iter().map(|s| s.pv_name.as_str()).collect();
        pvs.dedup();
        pvs.into_iter()
            .map(|pv| SampleEvent::disconnected(pv, timestamp))
            .collect()
    }
}
