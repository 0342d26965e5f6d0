//! Bounded per-source sample buffer
//!
//! A [`ChannelBuffer`] holds the recent history of one source key as a
//! circular store. Capacity counts either scalar samples or whole delivered
//! payloads ("objects"), fixed for the buffer's lifetime by its [`BufferUnit`].
//!
//! Timestamps must strictly advance: an update whose timestamp is not after
//! the last accepted one is dropped and counted, never reordered.

use std::collections::VecDeque;

use crate::config::BufferUnit;
use crate::error::{Result, ScopeError};
use crate::types::{Payload, Timestamp};

/// Result of a successful push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Slots taken by the new payload
    pub added: usize,
    /// Slots evicted from the front to make room
    pub evicted: usize,
}

/// One stored payload in Objects mode
#[derive(Debug, Clone)]
struct StoredObject {
    timestamp: Timestamp,
    values: Vec<f64>,
}

#[derive(Debug, Clone)]
enum Storage {
    Samples {
        values: VecDeque<f64>,
        timestamps: VecDeque<Timestamp>,
    },
    Objects(VecDeque<StoredObject>),
}

/// Circular store for one source key
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    key: String,
    capacity: usize,
    unit: BufferUnit,
    storage: Storage,
    last_timestamp: Option<Timestamp>,
    stale_dropped: u64,
}

impl ChannelBuffer {
    /// Create an empty buffer; capacity must be positive
    pub fn new(key: impl Into<String>, capacity: usize, unit: BufferUnit) -> Result<Self> {
        if capacity == 0 {
            return Err(ScopeError::invalid("buffer capacity must be positive"));
        }
        let storage = match unit {
            BufferUnit::Samples => Storage::Samples {
                values: VecDeque::with_capacity(capacity.min(1 << 16)),
                timestamps: VecDeque::with_capacity(capacity.min(1 << 16)),
            },
            BufferUnit::Objects => Storage::Objects(VecDeque::with_capacity(capacity.min(1024))),
        };
        Ok(Self {
            key: key.into(),
            capacity,
            unit,
            storage,
            last_timestamp: None,
            stale_dropped: 0,
        })
    }

    /// Source key this buffer belongs to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Capacity in the buffer's unit
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unit of the capacity
    pub fn unit(&self) -> BufferUnit {
        self.unit
    }

    /// Timestamp of the newest accepted update
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Number of stale updates dropped so far
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Slots in use, counted in the buffer's unit
    pub fn occupied(&self) -> usize {
        match &self.storage {
            Storage::Samples { values, .. } => values.len(),
            Storage::Objects(objects) => objects.len(),
        }
    }

    /// Total number of scalar samples held
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Samples { values, .. } => values.len(),
            Storage::Objects(objects) => objects.iter().map(|o| o.values.len()).sum(),
        }
    }

    /// Whether no samples are held
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Whether every slot is in use
    pub fn is_full(&self) -> bool {
        self.occupied() >= self.capacity
    }

    /// Capacity expressed in scalar samples
    ///
    /// In Objects mode this is the capacity times the length of the newest
    /// payload, or zero before anything was stored.
    pub fn sample_capacity(&self) -> usize {
        match &self.storage {
            Storage::Samples { .. } => self.capacity,
            Storage::Objects(objects) => objects
                .back()
                .map(|o| o.values.len() * self.capacity)
                .unwrap_or(0),
        }
    }

    /// Most recent scalar sample
    pub fn latest(&self) -> Option<f64> {
        match &self.storage {
            Storage::Samples { values, .. } => values.back().copied(),
            Storage::Objects(objects) => objects.back().and_then(|o| o.values.last().copied()),
        }
    }

    /// Append a payload, evicting from the front on overflow
    ///
    /// Empty payloads are accepted as no-ops and do not advance the timestamp.
    pub fn push(&mut self, payload: &Payload, timestamp: Timestamp) -> Result<PushOutcome> {
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                self.stale_dropped += 1;
                return Err(ScopeError::StaleSample {
                    source_key: self.key.clone(),
                    timestamp,
                    last,
                });
            }
        }
        if payload.is_empty() {
            return Ok(PushOutcome::default());
        }

        self.last_timestamp = Some(timestamp);
        let capacity = self.capacity;

        let outcome = match &mut self.storage {
            Storage::Samples { values, timestamps } => {
                // Only the newest `capacity` elements of an oversized array can survive
                let incoming = payload.values();
                let skip = incoming.len().saturating_sub(capacity);
                let kept = &incoming[skip..];

                let overflow = (values.len() + kept.len()).saturating_sub(capacity);
                values.drain(..overflow);
                timestamps.drain(..overflow);
                values.extend(kept.iter().copied());
                timestamps.extend(std::iter::repeat(timestamp).take(kept.len()));

                PushOutcome {
                    added: incoming.len(),
                    evicted: overflow + skip,
                }
            }
            Storage::Objects(objects) => {
                let mut evicted = 0;
                while objects.len() >= capacity {
                    objects.pop_front();
                    evicted += 1;
                }
                objects.push_back(StoredObject {
                    timestamp,
                    values: payload.values().to_vec(),
                });
                PushOutcome { added: 1, evicted }
            }
        };

        Ok(outcome)
    }

    /// Change the capacity, dropping the oldest entries when shrinking
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 {
            return Err(ScopeError::invalid("buffer capacity must be positive"));
        }
        self.capacity = new_capacity;
        match &mut self.storage {
            Storage::Samples { values, timestamps } => {
                let overflow = values.len().saturating_sub(new_capacity);
                values.drain(..overflow);
                timestamps.drain(..overflow);
            }
            Storage::Objects(objects) => {
                let overflow = objects.len().saturating_sub(new_capacity);
                objects.drain(..overflow);
            }
        }
        Ok(())
    }

    /// Drop all history; the timestamp ordering restarts
    pub fn clear(&mut self) {
        match &mut self.storage {
            Storage::Samples { values, timestamps } => {
                values.clear();
                timestamps.clear();
            }
            Storage::Objects(objects) => objects.clear(),
        }
        self.last_timestamp = None;
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> BufferSnapshot {
        let (values, timestamps) = match &self.storage {
            Storage::Samples { values, timestamps } => (
                values.iter().copied().collect(),
                timestamps.iter().copied().collect(),
            ),
            Storage::Objects(objects) => {
                let total = objects.iter().map(|o| o.values.len()).sum();
                let mut values = Vec::with_capacity(total);
                let mut timestamps = Vec::with_capacity(total);
                for object in objects {
                    values.extend_from_slice(&object.values);
                    timestamps.extend(std::iter::repeat(object.timestamp).take(object.values.len()));
                }
                (values, timestamps)
            }
        };

        BufferSnapshot {
            key: self.key.clone(),
            values,
            timestamps,
            unit: self.unit,
            capacity: self.capacity,
            sample_capacity: self.sample_capacity(),
            occupied: self.occupied(),
            last_timestamp: self.last_timestamp,
        }
    }
}

/// Immutable copy of a buffer, safe to process while producers keep pushing
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    /// Source key
    pub key: String,
    /// Scalar samples, oldest first
    pub values: Vec<f64>,
    /// Update timestamp of each sample (array elements share their payload's)
    pub timestamps: Vec<Timestamp>,
    /// Unit of `capacity`
    pub unit: BufferUnit,
    /// Capacity in the buffer's unit
    pub capacity: usize,
    /// Capacity expressed in samples
    pub sample_capacity: usize,
    /// Slots in use, in the buffer's unit
    pub occupied: usize,
    /// Newest accepted update
    pub last_timestamp: Option<Timestamp>,
}

impl BufferSnapshot {
    /// Create a snapshot directly from samples (Samples unit, full capacity)
    pub fn from_values(key: impl Into<String>, values: Vec<f64>, timestamps: Vec<Timestamp>) -> Self {
        let len = values.len();
        Self {
            key: key.into(),
            last_timestamp: timestamps.last().copied(),
            values,
            timestamps,
            unit: BufferUnit::Samples,
            capacity: len.max(1),
            sample_capacity: len.max(1),
            occupied: len,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no samples
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the buffer was full when copied
    pub fn is_full(&self) -> bool {
        self.occupied >= self.capacity
    }

    /// Keep only samples in `start..end`
    pub fn slice(&self, start: usize, end: usize) -> BufferSnapshot {
        let end = end.min(self.values.len());
        let start = start.min(end);
        let ts_end = end.min(self.timestamps.len());
        BufferSnapshot {
            key: self.key.clone(),
            values: self.values[start..end].to_vec(),
            timestamps: self.timestamps[start.min(ts_end)..ts_end].to_vec(),
            unit: self.unit,
            capacity: self.capacity,
            sample_capacity: self.sample_capacity,
            occupied: self.occupied,
            last_timestamp: self.last_timestamp,
        }
    }

    /// Keep only the newest `n` samples
    pub fn tail(&self, n: usize) -> BufferSnapshot {
        let len = self.values.len();
        self.slice(len.saturating_sub(n), len)
    }
}
