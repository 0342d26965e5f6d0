//! Test data builders for scope configurations

use pvscope::config::{
    BufferUnit, ChannelConfig, DisplayMode, ScopeConfig, TriggerConfig, TriggerMode,
};
use pvscope::types::Protocol;

/// Builder for creating test scope configurations
pub struct ScopeConfigBuilder {
    config: ScopeConfig,
}

impl ScopeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ScopeConfig::default(),
        }
    }

    pub fn channel(mut self, pv: &str) -> Self {
        self.config.add_channel(ChannelConfig::new(pv, Protocol::Ca));
        self
    }

    pub fn field_channel(mut self, pv: &str, field: &str) -> Self {
        self.config
            .add_channel(ChannelConfig::new(pv, Protocol::Pva).with_field(field));
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.acquisition.capacity = capacity;
        self
    }

    pub fn objects(mut self) -> Self {
        self.config.acquisition.unit = BufferUnit::Objects;
        self
    }

    pub fn sampling_mode(mut self) -> Self {
        self.config.acquisition.sampling_mode = true;
        self
    }

    pub fn trigger(mut self, mode: TriggerMode, pv: &str, threshold: f64) -> Self {
        self.config.trigger = TriggerConfig {
            mode,
            pv: Some(pv.to_string()),
            protocol: Protocol::Ca,
            threshold,
            ..Default::default()
        };
        self
    }

    pub fn data_time_field(mut self, key: &str) -> Self {
        self.config.trigger.data_time_field = Some(key.to_string());
        self
    }

    pub fn x_axis(mut self, key: &str) -> Self {
        self.config.x_axis = Some(key.to_string());
        self
    }

    pub fn mode(mut self, mode: DisplayMode) -> Self {
        self.config.display.mode = mode;
        self
    }

    pub fn histogram(mut self, bins: usize) -> Self {
        self.config.display.histogram = true;
        self.config.display.bins = bins;
        self
    }

    pub fn build(self) -> ScopeConfig {
        self.config
    }
}

impl Default for ScopeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_config_builder() {
        let config = ScopeConfigBuilder::new()
            .channel("a")
            .field_channel("w", "y")
            .capacity(16)
            .trigger(TriggerMode::OnChange, "t", 0.0)
            .build();

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[1].source_key(), "w.y");
        assert_eq!(config.acquisition.capacity, 16);
        assert!(config.validate().is_ok());
    }
}
