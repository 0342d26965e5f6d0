//! Configuration module for pvscope
//!
//! This module handles scope configuration:
//! - Channel list (PV names, protocols, field paths, offsets)
//! - Acquisition, trigger and display sections (see [`settings`])
//! - Persistence of a complete scope setup as JSON or TOML
//!
//! # Files
//!
//! Scope files are JSON by default. A `.toml` extension selects TOML for both
//! loading and saving. Missing sections fall back to their defaults.
//!
//! # Example
//!
//! ```ignore
//! use pvscope::config::ScopeConfig;
//!
//! let mut config = ScopeConfig::load("bpm.scope.json")?;
//! config.display.mode = "psd".parse()?;
//! config.validate()?;
//! config.save("bpm.scope.json")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ScopeError};
use crate::types::{source_key, AxisLocation, Channel, Protocol};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum number of plotted channels
pub const MAX_CHANNELS: usize = 10;

/// Current scope file format version
pub const SCOPE_FILE_VERSION: u32 = 1;

// ==================== Channel Config ====================

/// One configured channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Process variable name
    pub pv: String,

    /// Protocol used to subscribe
    #[serde(default)]
    pub protocol: Protocol,

    /// Nested field path inside a structured PV
    #[serde(default)]
    pub field: Option<String>,

    /// Constant added to every sample
    #[serde(default)]
    pub dc_offset: f64,

    /// Explicit color; generated when absent
    #[serde(default)]
    pub color: Option<[u8; 4]>,

    /// Axis placement in multi-axis layout
    #[serde(default)]
    pub axis: AxisLocation,
}

impl ChannelConfig {
    /// Create a channel entry with defaults
    pub fn new(pv: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            pv: pv.into(),
            protocol,
            field: None,
            dc_offset: 0.0,
            color: None,
            axis: AxisLocation::Left,
        }
    }

    /// Set the nested field path
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Source key of this channel's buffer
    pub fn source_key(&self) -> String {
        source_key(&self.pv, self.field.as_deref())
    }

    /// Build the runtime channel
    pub fn to_channel(&self, id: u32) -> Channel {
        let mut channel = Channel::new(id, self.pv.clone(), self.protocol)
            .with_dc_offset(self.dc_offset)
            .with_axis(self.axis);
        if let Some(field) = &self.field {
            channel = channel.with_field(field.clone());
        }
        if let Some(color) = self.color {
            channel = channel.with_color(color);
        }
        channel
    }
}

// ==================== Scope Config ====================

/// Complete scope configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// File format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Plotted channels
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Buffer sizing and sampling mode
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Trigger setup
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Display pipeline setup
    #[serde(default)]
    pub display: DisplayConfig,

    /// Source key whose values form the X axis
    #[serde(default)]
    pub x_axis: Option<String>,

    /// Source key carrying a monotonically increasing array id
    #[serde(default)]
    pub array_id: Option<String>,
}

fn default_version() -> u32 {
    SCOPE_FILE_VERSION
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            version: SCOPE_FILE_VERSION,
            name: "Untitled Scope".to_string(),
            channels: Vec::new(),
            acquisition: AcquisitionConfig::default(),
            trigger: TriggerConfig::default(),
            display: DisplayConfig::default(),
            x_axis: None,
            array_id: None,
        }
    }
}

impl ScopeConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scope file from disk (TOML when the extension is `.toml`, JSON otherwise)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScopeError::Config(format!("Failed to read scope file {:?}: {}", path, e))
        })?;

        if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                ScopeError::Config(format!("Failed to parse scope file {:?}: {}", path, e))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                ScopeError::Config(format!("Failed to parse scope file {:?}: {}", path, e))
            })
        }
    }

    /// Load a scope file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load scope file, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the scope file (TOML when the extension is `.toml`, JSON otherwise)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| ScopeError::Serialization(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| ScopeError::Serialization(e.to_string()))?
        };

        std::fs::write(path, content).map_err(|e| {
            ScopeError::Config(format!("Failed to write scope file {:?}: {}", path, e))
        })
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        if self.channels.len() > MAX_CHANNELS {
            return Err(ScopeError::invalid(format!(
                "{} channels configured, at most {} supported",
                self.channels.len(),
                MAX_CHANNELS
            )));
        }
        if let Some(ch) = self.channels.iter().find(|c| c.pv.trim().is_empty()) {
            return Err(ScopeError::invalid(format!(
                "channel with empty PV name ({} protocol)",
                ch.protocol
            )));
        }
        self.acquisition.validate()?;
        self.trigger.validate()?;
        self.display.validate()?;
        Ok(())
    }

    /// Add a channel
    pub fn add_channel(&mut self, channel: ChannelConfig) {
        self.channels.push(channel);
    }

    /// Runtime channels, numbered from 1
    pub fn build_channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, c)| c.to_channel(i as u32 + 1))
            .collect()
    }

    /// Every source key a subscriber must deliver (channels, X axis, trigger, time, array id)
    pub fn source_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.channels.iter().map(|c| c.source_key()).collect();
        let extra = [
            self.x_axis.as_deref(),
            self.trigger.data_time_field.as_deref(),
            self.array_id.as_deref(),
        ];
        for key in extra.into_iter().flatten() {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    /// Create a sample configuration against the simulated source
    pub fn sample() -> Self {
        let mut config = Self {
            name: "Simulated waveforms".to_string(),
            ..Default::default()
        };

        config.add_channel(ChannelConfig::new("sim:wave", Protocol::Pva).with_field("sine"));
        config.add_channel(ChannelConfig::new("sim:wave", Protocol::Pva).with_field("square"));

        let mut noise = ChannelConfig::new("sim:noise", Protocol::Ca);
        noise.dc_offset = 2.0;
        noise.axis = AxisLocation::Right;
        config.add_channel(noise);

        config.trigger = TriggerConfig {
            mode: TriggerMode::GtThreshold,
            pv: Some("sim:trig".to_string()),
            protocol: Protocol::Ca,
            threshold: 0.5,
            time_field: None,
            data_time_field: Some("sim:wave.time".to_string()),
            autoscale_buffer: true,
        };

        config
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScopeConfig::default();
        assert_eq!(config.version, SCOPE_FILE_VERSION);
        assert!(config.validate().is_ok());
        assert!(ScopeConfig::sample().validate().is_ok());
    }

    #[test]
    fn test_too_many_channels() {
        let mut config = ScopeConfig::default();
        for i in 0..=MAX_CHANNELS {
            config.add_channel(ChannelConfig::new(format!("sim:ch{}", i), Protocol::Ca));
        }
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ScopeError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_build_channels() {
        let config = ScopeConfig::sample();
        let channels = config.build_channels();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].id, 1);
        assert_eq!(channels[0].source_key(), "sim:wave.sine");
        assert_eq!(channels[2].dc_offset, 2.0);
        assert_eq!(channels[2].axis, AxisLocation::Right);
    }

    #[test]
    fn test_source_keys_include_auxiliary() {
        let mut config = ScopeConfig::sample();
        config.x_axis = Some("sim:wave.time".to_string());
        config.array_id = Some("sim:wave.id".to_string());
        let keys = config.source_keys();
        assert_eq!(keys.iter().filter(|k| *k == "sim:wave.time").count(), 1);
        assert!(keys.contains(&"sim:wave.id".to_string()));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scope.json");

        let mut config = ScopeConfig::sample();
        config.display.mode = DisplayMode::AutocorrelateFft;
        config.save(&path).unwrap();

        let loaded = ScopeConfig::load(&path).unwrap();
        assert_eq!(loaded.channels.len(), 3);
        assert_eq!(loaded.display.mode, DisplayMode::AutocorrelateFft);
        assert_eq!(loaded.trigger.mode, TriggerMode::GtThreshold);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("scope.toml");

        let config = ScopeConfig::sample();
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("gtthreshold"));

        let loaded = ScopeConfig::load(&path).unwrap();
        assert_eq!(loaded.trigger.threshold, 0.5);
        assert_eq!(loaded.channels[1].field.as_deref(), Some("square"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{ "display": { "mode": "psd", "bins": 20 } }"#;
        let config: ScopeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.display.mode, DisplayMode::Psd);
        assert_eq!(config.display.bins, 20);
        assert_eq!(config.display.ema_factor, 1);
        assert_eq!(config.acquisition.capacity, DEFAULT_BUFFER_CAPACITY);
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            ScopeConfig::load(&missing),
            Err(ScopeError::Config(_))
        ));
        assert_eq!(ScopeConfig::load_or_default(&missing).name, "Untitled Scope");
    }
}
