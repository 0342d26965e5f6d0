//! Error handling for pvscope
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the acquisition, trigger and display layers.
//!
//! Most variants describe conditions that are contained within a single
//! refresh tick and a single channel: the refresh loop logs them and moves on.
//! Only [`ScopeError::InvalidConfiguration`] and the I/O flavoured variants are
//! surfaced to callers as hard failures.

use crate::config::DisplayMode;
use crate::trigger::CorrelationMiss;
use crate::types::Timestamp;
use thiserror::Error;

/// Main error type for pvscope operations
#[derive(Error, Debug)]
pub enum ScopeError {
    /// A sample arrived with a timestamp that does not advance the buffer
    #[error("Stale sample dropped for '{source_key}': {timestamp} is not after {last}")]
    StaleSample {
        source_key: String,
        timestamp: Timestamp,
        last: Timestamp,
    },

    /// The source is currently disconnected
    #[error("Channel '{0}' is disconnected")]
    Disconnected(String),

    /// The source was removed and no longer accepts samples
    #[error("Channel '{0}' has been removed")]
    ChannelRemoved(String),

    /// No buffer is registered for the given source key
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// No channel exists with the given id
    #[error("Unknown channel id {0}")]
    UnknownChannel(u32),

    /// The trigger instant could not be located in the buffered time range
    #[error("Correlation miss: {0}")]
    CorrelationMiss(#[from] CorrelationMiss),

    /// Not enough samples for the active display transform
    #[error("{mode} needs at least {required} samples, got {available}")]
    InsufficientData {
        mode: DisplayMode,
        required: usize,
        available: usize,
    },

    /// Configuration rejected at validation time
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScopeError>,
    },
}

impl ScopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an [`ScopeError::InvalidConfiguration`]
    pub fn invalid(message: impl Into<String>) -> Self {
        ScopeError::InvalidConfiguration(message.into())
    }

    /// Whether this error only affects the current tick of one channel
    pub fn is_transient(&self) -> bool {
        match self {
            ScopeError::StaleSample { .. }
            | ScopeError::Disconnected(_)
            | ScopeError::CorrelationMiss(_)
            | ScopeError::InsufficientData { .. } => true,
            ScopeError::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for pvscope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScopeError::Disconnected("sim:wave".to_string());
        assert_eq!(err.to_string(), "Channel 'sim:wave' is disconnected");
    }

    #[test]
    fn test_error_with_context() {
        let err = ScopeError::UnknownSource("sim:missing".to_string());
        let with_ctx = err.with_context("Failed to snapshot");
        assert!(with_ctx.to_string().contains("Failed to snapshot"));
        assert!(with_ctx.to_string().contains("sim:missing"));
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = ScopeError::InsufficientData {
            mode: DisplayMode::Fft,
            required: 2,
            available: 1,
        };
        assert_eq!(err.to_string(), "fft needs at least 2 samples, got 1");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ScopeError::Disconnected("a".into()).is_transient());
        assert!(ScopeError::Disconnected("a".into())
            .with_context("tick")
            .is_transient());
        assert!(!ScopeError::invalid("bins").is_transient());
    }
}
