//! Sample events delivered by the subscription layer

use crate::types::{source_key, Payload, Timestamp};

/// One update from a subscribed PV (or nested field)
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEvent {
    /// PV name
    pub pv_name: String,
    /// Nested field path for structured PVs
    pub field_path: Option<String>,
    /// Delivered value; `None` for pure connection-state changes
    pub payload: Option<Payload>,
    /// Source timestamp of the update
    pub timestamp: Timestamp,
    /// Connection state reported with the update
    pub connected: bool,
}

impl SampleEvent {
    /// A connected data update
    pub fn new(pv_name: impl Into<String>, payload: impl Into<Payload>, timestamp: Timestamp) -> Self {
        Self {
            pv_name: pv_name.into(),
            field_path: None,
            payload: Some(payload.into()),
            timestamp,
            connected: true,
        }
    }

    /// A disconnect notification
    pub fn disconnected(pv_name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            pv_name: pv_name.into(),
            field_path: None,
            payload: None,
            timestamp,
            connected: false,
        }
    }

    /// Set the nested field path
    pub fn with_field(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    /// Key of the buffer this event is routed to
    pub fn source_key(&self) -> String {
        source_key(&self.pv_name, self.field_path.as_deref())
    }
}
