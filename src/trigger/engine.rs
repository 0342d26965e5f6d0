//! Trigger edge detection
//!
//! The [`TriggerEngine`] watches the values of the configured trigger source and
//! emits a [`TriggerEvent`] for every qualifying edge:
//!
//! - `OnChange` fires whenever the value differs from the previous one
//! - `GtThreshold` fires when the value rises above the threshold
//!   (previous <= threshold < new)
//! - `LtThreshold` fires when the value falls below the threshold
//!   (previous >= threshold > new)
//!
//! Edges need a previous value, so the first sample after arming (or after a
//! reconnect) never fires. `Fired` is transient: the engine re-arms before
//! [`TriggerEngine::on_sample`] returns.

use crate::config::{TriggerConfig, TriggerMode};
use crate::types::Timestamp;

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    /// Mode is Off or the trigger source is disconnected
    #[default]
    Idle,
    /// Waiting for a qualifying edge
    Armed,
    /// A qualifying edge was just observed
    Fired,
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerState::Idle => write!(f, "Idle"),
            TriggerState::Armed => write!(f, "Armed"),
            TriggerState::Fired => write!(f, "Fired"),
        }
    }
}

/// A qualifying trigger edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    /// Trigger instant taken from the trigger time field
    pub timestamp: Timestamp,
    /// Trigger source value that caused the edge
    pub value: f64,
    /// Ask the display to autoscale on its next frame
    pub request_autoscale: bool,
    /// 1-based count of edges fired by this engine
    pub sequence: u64,
}

/// Edge detector for one trigger source
#[derive(Debug, Clone)]
pub struct TriggerEngine {
    mode: TriggerMode,
    threshold: f64,
    autoscale_buffer: bool,
    state: TriggerState,
    connected: bool,
    last_value: Option<f64>,
    last_sample: Option<Timestamp>,
    last_trigger: Option<Timestamp>,
    fired_count: u64,
    stale_dropped: u64,
}

impl TriggerEngine {
    /// Create an engine from the trigger section of the config
    pub fn new(config: &TriggerConfig) -> Self {
        let mut engine = Self {
            mode: TriggerMode::Off,
            threshold: config.threshold,
            autoscale_buffer: config.autoscale_buffer,
            state: TriggerState::Idle,
            connected: true,
            last_value: None,
            last_sample: None,
            last_trigger: None,
            fired_count: 0,
            stale_dropped: 0,
        };
        engine.set_mode(config.mode);
        engine
    }

    /// Current state
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Current mode
    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    /// Threshold for the Gt/Lt modes
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Last observed trigger source value
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Timestamp of the last qualifying edge
    pub fn last_trigger(&self) -> Option<Timestamp> {
        self.last_trigger
    }

    /// Number of edges fired since creation
    pub fn fired_count(&self) -> u64 {
        self.fired_count
    }

    /// Trigger samples ignored because their timestamp did not advance
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Change the mode; a non-Off mode arms the engine
    pub fn set_mode(&mut self, mode: TriggerMode) {
        if mode != self.mode {
            tracing::debug!("Trigger mode {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        self.last_value = None;
        self.state = if mode.is_active() && self.connected {
            TriggerState::Armed
        } else {
            TriggerState::Idle
        };
    }

    /// Change the threshold used by the Gt/Lt modes
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Enable or disable the autoscale request carried by fired events
    pub fn set_autoscale_buffer(&mut self, enabled: bool) {
        self.autoscale_buffer = enabled;
    }

    /// The trigger source went away: go idle and forget the last edge
    pub fn on_disconnect(&mut self) {
        if self.connected {
            tracing::info!("Trigger source disconnected");
        }
        self.connected = false;
        self.state = TriggerState::Idle;
        self.last_value = None;
        self.last_trigger = None;
    }

    /// The trigger source came back: re-arm if a mode is set
    pub fn on_connect(&mut self) {
        if !self.connected {
            tracing::info!("Trigger source connected");
        }
        self.connected = true;
        if self.mode.is_active() {
            self.state = TriggerState::Armed;
        }
    }

    /// Feed one trigger source value
    ///
    /// Samples stamped at or before the last accepted one are dropped without
    /// touching the edge state.
    pub fn on_sample(&mut self, value: f64, timestamp: Timestamp) -> Option<TriggerEvent> {
        if self.last_sample.is_some_and(|last| timestamp <= last) {
            self.stale_dropped += 1;
            tracing::debug!("Stale trigger sample at {} dropped", timestamp);
            return None;
        }
        self.last_sample = Some(timestamp);

        if !self.connected {
            self.on_connect();
        }
        let previous = self.last_value.replace(value);
        if self.state != TriggerState::Armed {
            return None;
        }
        let previous = previous?;

        let qualifies = match self.mode {
            TriggerMode::Off => false,
            TriggerMode::OnChange => value != previous,
            TriggerMode::GtThreshold => previous <= self.threshold && value > self.threshold,
            TriggerMode::LtThreshold => previous >= self.threshold && value < self.threshold,
        };
        if !qualifies {
            return None;
        }

        self.state = TriggerState::Fired;
        self.fired_count += 1;
        self.last_trigger = Some(timestamp);
        let event = TriggerEvent {
            timestamp,
            value,
            request_autoscale: self.autoscale_buffer,
            sequence: self.fired_count,
        };
        tracing::debug!(
            "Trigger #{} fired at {} ({} {} -> {})",
            event.sequence,
            timestamp,
            self.mode,
            previous,
            value
        );
        self.state = TriggerState::Armed;
        Some(event)
    }
}
