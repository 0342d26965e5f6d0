//! Ingestion side of a scope
//!
//! [`ScopeEngine`] is shared between subscriber threads and the refresh
//! loop. Subscribers call [`ScopeEngine::ingest`] for every update; the
//! engine routes data into the source registry and trigger source values
//! into the trigger engine, whose fired events are queued for the refresh
//! loop.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::acquisition::{PushOutcome, SampleEvent, SourceRegistry};
use crate::config::{ChannelConfig, ScopeConfig, TriggerMode, MAX_CHANNELS};
use crate::error::{Result, ResultExt, ScopeError};
use crate::trigger::{TriggerEngine, TriggerEvent, TriggerState};
use crate::types::{source_key, AcquisitionStats, Channel, Payload, Timestamp};

/// Shared ingestion state of one scope
#[derive(Debug)]
pub struct ScopeEngine {
    config: ScopeConfig,
    registry: SourceRegistry,
    channels: RwLock<Vec<Channel>>,
    next_channel_id: AtomicU32,
    trigger: Mutex<TriggerEngine>,
    trigger_key: Option<String>,
    trigger_tx: Sender<TriggerEvent>,
    trigger_rx: Receiver<TriggerEvent>,
    dropped_triggers: AtomicU64,
}

impl ScopeEngine {
    /// Build an engine from a validated configuration
    ///
    /// Every source the configuration references gets a buffer up front.
    pub fn new(config: ScopeConfig) -> Result<Self> {
        config.validate().context("Invalid scope configuration")?;

        let registry = SourceRegistry::new(config.acquisition.clone(), config.array_id.clone());
        for key in config.source_keys() {
            registry.register(&key)?;
        }

        let channels = config.build_channels();
        let next_id = channels.len() as u32 + 1;
        let (trigger_tx, trigger_rx) = bounded(config.acquisition.trigger_queue_size.max(1));
        let trigger_key = config.trigger.pv.as_deref().map(|pv| source_key(pv, None));

        tracing::info!(
            "Scope '{}': {} channels, {} sources, trigger {}",
            config.name,
            channels.len(),
            registry.keys().len(),
            config.trigger.mode
        );

        Ok(Self {
            trigger: Mutex::new(TriggerEngine::new(&config.trigger)),
            registry,
            channels: RwLock::new(channels),
            next_channel_id: AtomicU32::new(next_id),
            trigger_key,
            trigger_tx,
            trigger_rx,
            dropped_triggers: AtomicU64::new(0),
            config,
        })
    }

    /// Configuration the engine was built from
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Buffers of every source
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Source key of the trigger PV
    pub fn trigger_key(&self) -> Option<&str> {
        self.trigger_key.as_deref()
    }

    /// Field the subscriber must take trigger timestamps from
    pub fn trigger_time_field(&self) -> Option<&str> {
        self.config.trigger.effective_time_field()
    }

    /// Receiving end of the fired trigger queue
    pub fn trigger_events(&self) -> Receiver<TriggerEvent> {
        self.trigger_rx.clone()
    }

    /// Trigger events lost because the queue was full
    pub fn dropped_triggers(&self) -> u64 {
        self.dropped_triggers.load(Ordering::Relaxed)
    }

    /// Ingestion counters
    pub fn stats(&self) -> AcquisitionStats {
        self.registry.stats()
    }

    // ==================== Ingestion ====================

    /// Ingest one subscription event
    pub fn ingest(&self, event: SampleEvent) -> Result<Option<PushOutcome>> {
        self.on_sample(
            &event.pv_name,
            event.field_path.as_deref(),
            event.payload.as_ref(),
            event.timestamp,
            event.connected,
        )
    }

    /// Handle one update from a subscription
    ///
    /// Returns the push outcome when the update landed in a buffer. Updates of
    /// a trigger PV that is not also plotted only feed the trigger engine and
    /// return `Ok(None)`.
    pub fn on_sample(
        &self,
        pv_name: &str,
        field_path: Option<&str>,
        payload: Option<&Payload>,
        timestamp: Timestamp,
        connected: bool,
    ) -> Result<Option<PushOutcome>> {
        let key = source_key(pv_name, field_path);
        let is_trigger = self.trigger_key.as_deref() == Some(key.as_str());

        if !connected {
            if is_trigger {
                self.lock_trigger().on_disconnect();
            }
            let affected = self.sources_of(pv_name, field_path);
            if affected.is_empty() && !is_trigger {
                return Err(ScopeError::UnknownSource(key));
            }
            for key in affected {
                self.registry.set_connected(&key, false)?;
            }
            return Ok(None);
        }

        let Some(payload) = payload else {
            return Ok(None);
        };

        if is_trigger {
            if let Some(value) = payload.last() {
                self.feed_trigger(value, timestamp);
            }
            if !self.registry.contains(&key) {
                return Ok(None);
            }
        }

        self.registry.push(&key, payload, timestamp).map(Some)
    }

    /// Registered keys a connection change applies to; a bare PV covers all its fields
    fn sources_of(&self, pv_name: &str, field_path: Option<&str>) -> Vec<String> {
        if field_path.is_some() {
            let key = source_key(pv_name, field_path);
            return if self.registry.contains(&key) {
                vec![key]
            } else {
                Vec::new()
            };
        }
        let prefix = format!("{}.", pv_name);
        self.registry
            .keys()
            .into_iter()
            .filter(|k| k == pv_name || k.starts_with(&prefix))
            .collect()
    }

    fn feed_trigger(&self, value: f64, timestamp: Timestamp) {
        let event = self.lock_trigger().on_sample(value, timestamp);
        let Some(event) = event else {
            return;
        };
        match self.trigger_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_triggers.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    tracing::warn!("Trigger queue full, {} events dropped", dropped);
                }
            }
            // The engine holds a receiver itself, so this cannot happen
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn lock_trigger(&self) -> std::sync::MutexGuard<'_, TriggerEngine> {
        self.trigger.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================== Trigger control ====================

    /// Current trigger mode
    pub fn trigger_mode(&self) -> TriggerMode {
        self.lock_trigger().mode()
    }

    /// Current trigger state
    pub fn trigger_state(&self) -> TriggerState {
        self.lock_trigger().state()
    }

    /// Edges fired so far
    pub fn triggers_fired(&self) -> u64 {
        self.lock_trigger().fired_count()
    }

    /// Change the trigger mode
    pub fn set_trigger_mode(&self, mode: TriggerMode) {
        self.lock_trigger().set_mode(mode);
    }

    /// Change the trigger threshold
    pub fn set_trigger_threshold(&self, threshold: f64) -> Result<()> {
        if !threshold.is_finite() {
            return Err(ScopeError::invalid("trigger threshold must be finite"));
        }
        self.lock_trigger().set_threshold(threshold);
        Ok(())
    }

    // ==================== Channels ====================

    /// Current channels
    pub fn channels(&self) -> Vec<Channel> {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Look up a channel
    pub fn channel(&self, id: u32) -> Option<Channel> {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Add a channel and create its buffer; returns the channel id
    pub fn add_channel(&self, config: ChannelConfig) -> Result<u32> {
        if config.pv.trim().is_empty() {
            return Err(ScopeError::invalid("channel PV name is empty"));
        }
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if channels.len() >= MAX_CHANNELS {
            return Err(ScopeError::invalid(format!(
                "at most {} channels supported",
                MAX_CHANNELS
            )));
        }

        self.registry.register(&config.source_key())?;
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = config.to_channel(id);
        tracing::info!("Added channel {} '{}'", id, channel.source_key());
        channels.push(channel);
        Ok(id)
    }

    /// Remove a channel; its buffer goes away with the last reference
    pub fn remove_channel(&self, id: u32) -> Result<Channel> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let index = channels
            .iter()
            .position(|c| c.id == id)
            .ok_or(ScopeError::UnknownChannel(id))?;
        let channel = channels.remove(index);
        self.registry.unregister(&channel.source_key());
        tracing::info!("Removed channel {} '{}'", id, channel.source_key());
        Ok(channel)
    }

    /// Change a channel's DC offset
    pub fn set_dc_offset(&self, id: u32, offset: f64) -> Result<()> {
        if !offset.is_finite() {
            return Err(ScopeError::invalid("DC offset must be finite"));
        }
        self.update_channel(id, |c| c.dc_offset = offset)
    }

    /// Change a channel's color
    pub fn set_color(&self, id: u32, color: [u8; 4]) -> Result<()> {
        self.update_channel(id, |c| c.color = color)
    }

    /// Start or stop drawing a channel
    pub fn set_started(&self, id: u32, started: bool) -> Result<()> {
        self.update_channel(id, |c| c.started = started)
    }

    fn update_channel(&self, id: u32, f: impl FnOnce(&mut Channel)) -> Result<()> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let channel = channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ScopeError::UnknownChannel(id))?;
        f(channel);
        Ok(())
    }
}
