//! Registry of source buffers
//!
//! The [`SourceRegistry`] owns one [`ChannelBuffer`] per source key, each behind
//! its own `RwLock` so producers on different sources never contend. The map
//! itself is only write-locked for add/remove.
//!
//! Several channels may plot the same source key; the slot is reference
//! counted and only destroyed when the last channel releases it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::buffer::{BufferSnapshot, ChannelBuffer, PushOutcome};
use crate::config::AcquisitionConfig;
use crate::error::{Result, ScopeError};
use crate::types::{AcquisitionStats, ConnectionStatus, Payload, Timestamp};

/// One registered source
#[derive(Debug)]
pub struct SourceSlot {
    key: String,
    buffer: RwLock<ChannelBuffer>,
    live: AtomicBool,
    removed: AtomicBool,
    refs: AtomicUsize,
    /// Latest value held back in sampling mode
    latest: Mutex<Option<Payload>>,
}

impl SourceSlot {
    fn new(buffer: ChannelBuffer) -> Self {
        Self {
            key: buffer.key().to_string(),
            buffer: RwLock::new(buffer),
            live: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            refs: AtomicUsize::new(0),
            latest: Mutex::new(None),
        }
    }

    /// Source key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the source is currently connected
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Connection status
    pub fn status(&self) -> ConnectionStatus {
        if self.removed.load(Ordering::Acquire) {
            ConnectionStatus::Removed
        } else if self.is_live() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Copy the buffer contents
    pub fn snapshot(&self) -> BufferSnapshot {
        self.buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    fn push(&self, payload: &Payload, timestamp: Timestamp) -> Result<PushOutcome> {
        self.buffer
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload, timestamp)
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    updates_received: AtomicU64,
    stale_dropped: AtomicU64,
    unrouted: AtomicU64,
    rejected_after_removal: AtomicU64,
    lost_arrays: AtomicU64,
    samples_received: AtomicU64,
}

/// Buffers for every subscribed source key
#[derive(Debug)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<SourceSlot>>>,
    config: RwLock<AcquisitionConfig>,
    array_id_key: Option<String>,
    last_array_id: Mutex<Option<i64>>,
    stats: StatsCounters,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new(config: AcquisitionConfig, array_id_key: Option<String>) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            config: RwLock::new(config),
            array_id_key,
            last_array_id: Mutex::new(None),
            stats: StatsCounters::default(),
        }
    }

    /// Current buffer capacity for newly registered sources
    pub fn capacity(&self) -> usize {
        self.config.read().unwrap_or_else(|e| e.into_inner()).capacity
    }

    /// Whether sampling mode is active
    pub fn sampling_mode(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sampling_mode
    }

    /// Register a source key, or add a reference to an existing one
    pub fn register(&self, key: &str) -> Result<Arc<SourceSlot>> {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = sources.get(key) {
            slot.refs.fetch_add(1, Ordering::AcqRel);
            return Ok(Arc::clone(slot));
        }

        let (capacity, unit) = {
            let config = self.config.read().unwrap_or_else(|e| e.into_inner());
            (config.capacity, config.unit)
        };
        let slot = Arc::new(SourceSlot::new(ChannelBuffer::new(key, capacity, unit)?));
        slot.refs.store(1, Ordering::Release);
        sources.insert(key.to_string(), Arc::clone(&slot));
        tracing::debug!("Registered source '{}' ({} {})", key, capacity, unit);
        Ok(slot)
    }

    /// Release one reference; the buffer is discarded when none remain
    ///
    /// Returns true if the source was destroyed.
    pub fn unregister(&self, key: &str) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = sources.get(key) else {
            return false;
        };
        if slot.refs.fetch_sub(1, Ordering::AcqRel) > 1 {
            return false;
        }

        // Stop pushes before the history goes away
        slot.removed.store(true, Ordering::Release);
        slot.live.store(false, Ordering::Release);
        slot.buffer
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        sources.remove(key);
        tracing::debug!("Removed source '{}'", key);
        true
    }

    /// Look up a registered source
    pub fn get(&self, key: &str) -> Option<Arc<SourceSlot>> {
        self.sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Whether a source key is registered
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Registered source keys
    pub fn keys(&self) -> Vec<String> {
        self.sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Store one update
    ///
    /// In sampling mode the value is only remembered; [`sample_tick`](Self::sample_tick)
    /// appends it later.
    pub fn push(&self, key: &str, payload: &Payload, timestamp: Timestamp) -> Result<PushOutcome> {
        let Some(slot) = self.get(key) else {
            self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
            return Err(ScopeError::UnknownSource(key.to_string()));
        };
        if slot.removed.load(Ordering::Acquire) {
            self.stats
                .rejected_after_removal
                .fetch_add(1, Ordering::Relaxed);
            return Err(ScopeError::ChannelRemoved(key.to_string()));
        }
        slot.live.store(true, Ordering::Release);

        if self.array_id_key.as_deref() == Some(key) {
            if let Some(id) = payload.last() {
                self.track_array_id(id as i64);
            }
        }

        if self.sampling_mode() {
            *slot.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(payload.clone());
            return Ok(PushOutcome::default());
        }

        self.record_push(&slot, payload, timestamp)
    }

    fn record_push(
        &self,
        slot: &SourceSlot,
        payload: &Payload,
        timestamp: Timestamp,
    ) -> Result<PushOutcome> {
        match slot.push(payload, timestamp) {
            Ok(outcome) => {
                self.stats.updates_received.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .samples_received
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, ScopeError::StaleSample { .. }) {
                    self.stats.stale_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("{}", e);
                }
                Err(e)
            }
        }
    }

    fn track_array_id(&self, id: i64) {
        let mut last = self.last_array_id.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            let gap = id - prev;
            if gap > 1 {
                self.stats
                    .lost_arrays
                    .fetch_add((gap - 1) as u64, Ordering::Relaxed);
            }
        }
        *last = Some(id);
    }

    /// Append each source's held-back value with the tick timestamp (sampling mode)
    ///
    /// Returns the number of sources that received a sample.
    pub fn sample_tick(&self, timestamp: Timestamp) -> usize {
        let slots: Vec<Arc<SourceSlot>> = self
            .sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        let mut appended = 0;
        for slot in slots {
            if !slot.is_live() {
                continue;
            }
            let latest = slot
                .latest
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(payload) = latest {
                if self.record_push(&slot, &payload, timestamp).is_ok() {
                    appended += 1;
                }
            }
        }
        appended
    }

    /// Update the connection state; history is kept either way
    pub fn set_connected(&self, key: &str, connected: bool) -> Result<()> {
        let slot = self
            .get(key)
            .ok_or_else(|| ScopeError::UnknownSource(key.to_string()))?;
        let was = slot.live.swap(connected, Ordering::AcqRel);
        if was != connected {
            tracing::info!(
                "Source '{}' {}",
                key,
                if connected { "connected" } else { "disconnected" }
            );
        }
        Ok(())
    }

    /// Copy a source's buffer regardless of connection state
    pub fn snapshot(&self, key: &str) -> Result<BufferSnapshot> {
        self.get(key)
            .map(|slot| slot.snapshot())
            .ok_or_else(|| ScopeError::UnknownSource(key.to_string()))
    }

    /// Copy a connected source's buffer
    pub fn live_snapshot(&self, key: &str) -> Result<BufferSnapshot> {
        let slot = self
            .get(key)
            .ok_or_else(|| ScopeError::UnknownSource(key.to_string()))?;
        if !slot.is_live() {
            return Err(ScopeError::Disconnected(key.to_string()));
        }
        Ok(slot.snapshot())
    }

    /// Resize every buffer and use the new capacity for future sources
    pub fn resize_all(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(ScopeError::invalid("buffer capacity must be positive"));
        }
        self.config
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .capacity = capacity;

        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        for slot in sources.values() {
            slot.buffer
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .resize(capacity)?;
        }
        tracing::info!("Resized {} buffers to {}", sources.len(), capacity);
        Ok(())
    }

    /// Ingestion counters
    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            updates_received: self.stats.updates_received.load(Ordering::Relaxed),
            stale_dropped: self.stats.stale_dropped.load(Ordering::Relaxed),
            unrouted: self.stats.unrouted.load(Ordering::Relaxed),
            rejected_after_removal: self.stats.rejected_after_removal.load(Ordering::Relaxed),
            lost_arrays: self.stats.lost_arrays.load(Ordering::Relaxed),
            samples_received: self.stats.samples_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferUnit;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(secs, 0)
    }

    fn registry(capacity: usize) -> SourceRegistry {
        SourceRegistry::new(
            AcquisitionConfig {
                capacity,
                ..Default::default()
            },
            None,
        )
    }

    #[test]
    fn test_push_and_snapshot() {
        let reg = registry(4);
        reg.register("a").unwrap();
        reg.push("a", &Payload::Scalar(1.0), ts(1)).unwrap();
        reg.push("a", &Payload::Scalar(2.0), ts(2)).unwrap();
        assert_eq!(reg.snapshot("a").unwrap().values, vec![1.0, 2.0]);
        assert_eq!(reg.stats().updates_received, 2);
    }

    #[test]
    fn test_unknown_source() {
        let reg = registry(4);
        let err = reg.push("nope", &Payload::Scalar(1.0), ts(1)).unwrap_err();
        assert!(matches!(err, ScopeError::UnknownSource(_)));
        assert_eq!(reg.stats().unrouted, 1);
    }

    #[test]
    fn test_disconnect_keeps_history() {
        let reg = registry(4);
        reg.register("a").unwrap();
        reg.push("a", &Payload::Scalar(1.0), ts(1)).unwrap();
        reg.set_connected("a", false).unwrap();

        assert!(matches!(
            reg.live_snapshot("a"),
            Err(ScopeError::Disconnected(_))
        ));
        assert_eq!(reg.snapshot("a").unwrap().len(), 1);

        // Any data update means the source is back
        reg.push("a", &Payload::Scalar(2.0), ts(2)).unwrap();
        assert_eq!(reg.live_snapshot("a").unwrap().len(), 2);
    }

    #[test]
    fn test_shared_source_reference_counting() {
        let reg = registry(4);
        let slot = reg.register("a").unwrap();
        reg.register("a").unwrap();

        assert!(!reg.unregister("a"));
        assert!(reg.contains("a"));
        assert!(reg.unregister("a"));
        assert!(!reg.contains("a"));
        assert_eq!(slot.status(), ConnectionStatus::Removed);

        // A producer still holding the slot cannot push into it
        assert!(slot.snapshot().is_empty());
        assert!(matches!(
            reg.push("a", &Payload::Scalar(1.0), ts(1)),
            Err(ScopeError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_stale_counted() {
        let reg = registry(4);
        reg.register("a").unwrap();
        reg.push("a", &Payload::Scalar(1.0), ts(2)).unwrap();
        assert!(reg.push("a", &Payload::Scalar(1.0), ts(1)).is_err());
        let stats = reg.stats();
        assert_eq!(stats.stale_dropped, 1);
        assert_eq!(stats.updates_received, 1);
    }

    #[test]
    fn test_array_id_gaps_count_as_lost() {
        let reg = SourceRegistry::new(AcquisitionConfig::default(), Some("sim:id".into()));
        reg.register("sim:id").unwrap();
        for (i, id) in [1.0, 2.0, 5.0, 6.0, 10.0].iter().enumerate() {
            reg.push("sim:id", &Payload::Scalar(*id), ts(i as i64 + 1))
                .unwrap();
        }
        assert_eq!(reg.stats().lost_arrays, 5);
    }

    #[test]
    fn test_sampling_mode_appends_on_tick() {
        let reg = SourceRegistry::new(
            AcquisitionConfig {
                capacity: 8,
                sampling_mode: true,
                ..Default::default()
            },
            None,
        );
        reg.register("fast").unwrap();
        reg.register("slow").unwrap();

        for i in 0..5 {
            reg.push("fast", &Payload::Scalar(i as f64), ts(i + 1)).unwrap();
        }
        reg.push("slow", &Payload::Scalar(42.0), ts(1)).unwrap();
        assert!(reg.snapshot("fast").unwrap().is_empty());

        assert_eq!(reg.sample_tick(ts(100)), 2);
        assert_eq!(reg.sample_tick(ts(101)), 2);
        assert_eq!(reg.snapshot("fast").unwrap().values, vec![4.0, 4.0]);
        assert_eq!(reg.snapshot("slow").unwrap().values, vec![42.0, 42.0]);
    }

    #[test]
    fn test_resize_all() {
        let reg = SourceRegistry::new(
            AcquisitionConfig {
                capacity: 4,
                unit: BufferUnit::Samples,
                ..Default::default()
            },
            None,
        );
        reg.register("a").unwrap();
        for i in 0..4 {
            reg.push("a", &Payload::Scalar(i as f64), ts(i + 1)).unwrap();
        }
        reg.resize_all(2).unwrap();
        assert_eq!(reg.snapshot("a").unwrap().values, vec![2.0, 3.0]);
        assert_eq!(reg.capacity(), 2);

        reg.register("b").unwrap();
        assert_eq!(reg.snapshot("b").unwrap().capacity, 2);
    }

    #[test]
    fn test_concurrent_producers() {
        let reg = Arc::new(registry(10_000));
        for key in ["a", "b", "c"] {
            reg.register(key).unwrap();
        }
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|key| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        reg.push(key, &Payload::Scalar(i as f64), ts(i + 1)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for key in ["a", "b", "c"] {
            assert_eq!(reg.snapshot(key).unwrap().len(), 1000);
        }
        assert_eq!(reg.stats().updates_received, 3000);
    }
}
