//! Refresh loop: correlation, processing and frame delivery
//!
//! The loop runs on its own thread at the configured refresh interval. Each
//! tick it
//! 1. appends held-back values (sampling mode),
//! 2. takes queued trigger events and correlates the pending one,
//! 3. runs every drawable channel through the [`SignalPipeline`],
//! 4. assembles a [`Frame`] and hands it to the [`FrameSink`].
//!
//! Ticks that are overdue are skipped, never queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};

use super::engine::ScopeEngine;
use crate::acquisition::BufferSnapshot;
use crate::analysis::{PipelineInput, SignalPipeline};
use crate::config::{DisplayConfig, TriggerMode};
use crate::display::{ChannelSeries, DisplayAggregator, FrameSink, TriggerMarker};
use crate::error::Result;
use crate::trigger::{
    CaptureWindow, Correlation, CorrelationMiss, TimeCorrelator, TriggerEvent, TriggerState,
    TriggerStatus,
};
use crate::types::Timestamp;

/// Commands accepted by a running refresh loop
#[derive(Debug, Clone)]
pub enum RefreshCommand {
    /// Replace the display configuration
    SetDisplay(DisplayConfig),
    /// Recompute axis bounds on the next frame
    RequestAutoscale,
    /// Stop (true) or resume (false) producing frames
    Freeze(bool),
    /// Stop the loop
    Shutdown,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame with this sequence number reached the sink
    Delivered(u64),
    /// The sink refused the frame with this sequence number
    Dropped(u64),
    /// Nothing new to draw; the previous frame stays up
    Held,
}

/// Refresh loop counters
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshStats {
    pub ticks: u64,
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub ticks_skipped: u64,
    pub correlation_misses: u64,
    /// Smoothed frame rate
    pub fps: f64,
}

/// Data frozen by the last trigger capture
#[derive(Debug, Clone, Default)]
struct Capture {
    snapshots: HashMap<String, BufferSnapshot>,
    /// Trigger position within each key's own slice
    trigger_indices: HashMap<String, usize>,
    marker: Option<TriggerMarker>,
}

/// Consumer side of a scope
pub struct RefreshLoop {
    engine: Arc<ScopeEngine>,
    pipeline: SignalPipeline,
    aggregator: DisplayAggregator,
    correlator: TimeCorrelator,
    trigger_rx: Receiver<TriggerEvent>,
    command_rx: Receiver<RefreshCommand>,
    sink: Box<dyn FrameSink>,
    running: Arc<AtomicBool>,
    interval: Duration,
    trigger_mode: TriggerMode,
    capture: Option<Capture>,
    known_channels: Vec<u32>,
    frozen: bool,
    last_frame: Option<Instant>,
    stats: RefreshStats,
}

impl RefreshLoop {
    /// Create a loop over `engine` delivering to `sink`
    pub fn new(
        engine: Arc<ScopeEngine>,
        sink: Box<dyn FrameSink>,
        command_rx: Receiver<RefreshCommand>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let display = engine.config().display.clone();
        let trigger_mode = engine.trigger_mode();
        let mut correlator = TimeCorrelator::new(engine.config().trigger.data_time_field.clone());
        correlator.set_status(idle_status(trigger_mode));

        Self {
            aggregator: DisplayAggregator::new(&display),
            interval: display.refresh_interval(),
            pipeline: SignalPipeline::new(display),
            correlator,
            trigger_rx: engine.trigger_events(),
            command_rx,
            sink,
            running,
            trigger_mode,
            capture: None,
            known_channels: Vec::new(),
            frozen: false,
            last_frame: None,
            stats: RefreshStats::default(),
            engine,
        }
    }

    /// Counters so far
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            frames_dropped: self.sink.dropped(),
            ..self.stats
        }
    }

    /// Current trigger status
    pub fn trigger_status(&self) -> TriggerStatus {
        self.correlator.status()
    }

    /// Trigger correlation state
    pub fn correlator(&self) -> &TimeCorrelator {
        &self.correlator
    }

    /// Current display configuration
    pub fn display_config(&self) -> &DisplayConfig {
        self.pipeline.config()
    }

    /// Apply a new display configuration
    pub fn set_display(&mut self, config: DisplayConfig) -> Result<()> {
        config.validate()?;
        self.aggregator.apply_config(&config);
        self.interval = config.refresh_interval();
        if config.mode != self.pipeline.config().mode {
            self.aggregator.request_autoscale();
        }
        self.pipeline.set_config(config);
        Ok(())
    }

    /// Run until the running flag clears or a shutdown command arrives
    pub fn run(&mut self) {
        tracing::info!("Refresh loop started ({} ms)", self.interval.as_millis());

        let mut deadline = Instant::now() + self.interval;
        while self.running.load(Ordering::SeqCst) {
            self.process_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.tick();

            let now = Instant::now();
            let (next, skipped) = next_deadline(deadline, now, self.interval);
            if skipped > 0 {
                self.stats.ticks_skipped += skipped;
                tracing::debug!("Refresh overran, skipped {} ticks", skipped);
            }
            if next > now {
                std::thread::sleep(next - now);
            }
            deadline = next + self.interval;
        }

        tracing::info!(
            "Refresh loop stopped: {} frames, {} dropped, {} ticks skipped",
            self.stats.frames_emitted,
            self.sink.dropped(),
            self.stats.ticks_skipped
        );
    }

    /// Process pending commands
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: RefreshCommand) {
        match cmd {
            RefreshCommand::SetDisplay(config) => {
                if let Err(e) = self.set_display(config) {
                    tracing::warn!("Display configuration rejected: {}", e);
                }
            }
            RefreshCommand::RequestAutoscale => self.aggregator.request_autoscale(),
            RefreshCommand::Freeze(frozen) => {
                tracing::debug!("Display {}", if frozen { "frozen" } else { "resumed" });
                self.frozen = frozen;
            }
            RefreshCommand::Shutdown => self.running.store(false, Ordering::SeqCst),
        }
    }

    /// Produce at most one frame
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        if self.frozen {
            return TickOutcome::Held;
        }

        let engine = Arc::clone(&self.engine);
        let registry = engine.registry();
        if registry.sampling_mode() {
            registry.sample_tick(Timestamp::now());
        }

        self.forget_removed_channels();
        self.sync_trigger_mode();
        let triggered = self.trigger_mode.is_active();
        if triggered && !self.update_capture() {
            return TickOutcome::Held;
        }

        let config = engine.config();
        let x_axis_key = config.x_axis.as_deref();
        let time_key = self.correlator.data_time_field();
        let capture = if triggered { self.capture.as_ref() } else { None };
        let fetch = |key: &str| -> Option<BufferSnapshot> {
            let slot = registry.get(key)?;
            if !slot.is_live() {
                return None;
            }
            match capture {
                Some(capture) => capture.snapshots.get(key).cloned(),
                None => Some(slot.snapshot()),
            }
        };

        let x_axis = x_axis_key.and_then(|key| fetch(key));
        let show_marker = !self.pipeline.config().mode.is_fft();
        let mut series = Vec::new();
        for channel in engine.channels() {
            if !channel.should_be_drawn(x_axis_key, time_key) {
                continue;
            }
            let key = channel.source_key();
            let Some(snapshot) = fetch(&key) else {
                continue;
            };
            let trigger_index = capture
                .filter(|_| show_marker)
                .and_then(|c| c.trigger_indices.get(&key).copied());
            let input = PipelineInput {
                channel_id: channel.id,
                values: &snapshot.values,
                timestamps: &snapshot.timestamps,
                dc_offset: channel.dc_offset,
                x_axis: x_axis.as_ref().map(|x| x.values.as_slice()),
            };
            series.push(ChannelSeries {
                channel_id: channel.id,
                name: key,
                color: channel.color,
                axis: channel.axis,
                series: self.pipeline.render(&input),
                y_bounds: None,
                trigger_index,
            });
        }

        let mode = self.pipeline.config().mode;
        let marker = capture.and_then(|c| c.marker).filter(|_| show_marker);
        let status = if triggered {
            self.correlator.status()
        } else {
            TriggerStatus::Off
        };
        let frame = self.aggregator.assemble(mode, series, marker, status);
        let sequence = frame.sequence;

        if self.sink.deliver(frame) {
            self.stats.frames_emitted += 1;
            self.update_fps();
            TickOutcome::Delivered(sequence)
        } else {
            TickOutcome::Dropped(sequence)
        }
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let s = (dt * 3.0).clamp(0.0, 1.0);
                self.stats.fps = if self.stats.fps == 0.0 {
                    1.0 / dt
                } else {
                    self.stats.fps * (1.0 - s) + s / dt
                };
            }
        }
    }

    fn forget_removed_channels(&mut self) {
        let current: Vec<u32> = self.engine.channels().iter().map(|c| c.id).collect();
        for id in &self.known_channels {
            if !current.contains(id) {
                self.pipeline.forget(*id);
                self.aggregator.forget(*id);
            }
        }
        self.known_channels = current;
    }

    fn sync_trigger_mode(&mut self) {
        let mode = self.engine.trigger_mode();
        if mode == self.trigger_mode {
            return;
        }
        tracing::debug!("Refresh loop follows trigger mode {} -> {}", self.trigger_mode, mode);
        self.trigger_mode = mode;
        self.capture = None;
        self.correlator.reset(idle_status(mode));
        // Edges fired under the old mode are stale
        while self.trigger_rx.try_recv().is_ok() {}
        self.aggregator.request_autoscale();
    }

    /// Arm queued triggers and correlate; returns whether a capture is available to draw
    fn update_capture(&mut self) -> bool {
        loop {
            match self.trigger_rx.try_recv() {
                Ok(event) => {
                    if event.request_autoscale {
                        self.aggregator.request_autoscale();
                    }
                    self.correlator.arm(event);
                }
                Err(_) => break,
            }
        }

        if self.engine.trigger_state() == TriggerState::Idle {
            if self.correlator.status() != TriggerStatus::Disconnected {
                self.correlator.reset(TriggerStatus::Disconnected);
            }
        } else if self.correlator.status() == TriggerStatus::Disconnected {
            self.correlator.set_status(TriggerStatus::WaitingForTrigger);
        }

        let engine = Arc::clone(&self.engine);
        let registry = engine.registry();
        // A time field that never delivered counts as absent from the data
        let time_snapshot = self
            .correlator
            .data_time_field()
            .and_then(|key| registry.snapshot(key).ok())
            .filter(|s| !s.is_empty());

        match self.correlator.correlate(time_snapshot.as_ref()) {
            Correlation::Idle => {}
            Correlation::DrawNow(event) => {
                tracing::debug!("Trigger #{} captured without time correlation", event.sequence);
                self.capture = Some(self.capture_latest());
            }
            Correlation::Window(event, window) => {
                let times = time_snapshot.as_ref().map_or(0, |s| s.len());
                self.capture = Some(self.capture_window(&event, &window, times));
            }
            Correlation::Miss(miss) => {
                self.on_miss(&miss);
                return false;
            }
        }
        self.capture.is_some()
    }

    /// Source keys a capture has to freeze
    fn capture_keys(&self) -> Vec<String> {
        let config = self.engine.config();
        let mut keys: Vec<String> = self
            .engine
            .channels()
            .iter()
            .filter(|c| c.should_be_drawn(config.x_axis.as_deref(), self.correlator.data_time_field()))
            .map(|c| c.source_key())
            .collect();
        if let Some(x_axis) = &config.x_axis {
            keys.push(x_axis.clone());
        }
        keys
    }

    fn capture_latest(&self) -> Capture {
        let registry = self.engine.registry();
        let snapshots = self
            .capture_keys()
            .into_iter()
            .filter_map(|key| {
                let snapshot = registry.snapshot(&key).ok()?;
                let n = snapshot.sample_capacity.max(1);
                Some((key, snapshot.tail(n)))
            })
            .collect();
        Capture {
            snapshots,
            trigger_indices: HashMap::new(),
            marker: None,
        }
    }

    /// Cut the window out of every buffer; buffers are aligned on their newest sample
    fn capture_window(
        &self,
        event: &TriggerEvent,
        window: &CaptureWindow,
        time_len: usize,
    ) -> Capture {
        let registry = self.engine.registry();
        let mut snapshots = HashMap::new();
        let mut trigger_indices = HashMap::new();
        for key in self.capture_keys() {
            let Ok(snapshot) = registry.snapshot(&key) else {
                continue;
            };
            let offset = snapshot.len() as isize - time_len as isize;
            let start = (window.start as isize + offset).max(0) as usize;
            let end = (window.end as isize + offset).max(0) as usize;
            let slice = snapshot.slice(start, end);

            // A buffer shorter than the time field is clipped at the front
            let trigger = window.trigger_index as isize + offset - start as isize;
            if trigger >= 0 && (trigger as usize) < slice.len() {
                trigger_indices.insert(key.clone(), trigger as usize);
            }
            snapshots.insert(key, slice);
        }

        let x = self
            .engine
            .config()
            .x_axis
            .as_ref()
            .and_then(|key| {
                let x = snapshots.get(key)?;
                let index = *trigger_indices.get(key)?;
                Some(x.values[index] - x.values[0])
            })
            .unwrap_or(window.marker() as f64);

        Capture {
            snapshots,
            trigger_indices,
            marker: Some(TriggerMarker {
                x,
                sequence: event.sequence,
            }),
        }
    }

    fn on_miss(&mut self, miss: &CorrelationMiss) {
        self.stats.correlation_misses += 1;
        let CorrelationMiss::BeforeBuffer {
            suggested_buffer: Some(size),
            ..
        } = miss
        else {
            return;
        };
        if !self.engine.config().trigger.autoscale_buffer {
            return;
        }
        match self.engine.registry().resize_all(*size) {
            Ok(()) => {
                tracing::info!("Buffer grown to {} to hold missed triggers", size);
                self.aggregator.request_autoscale();
            }
            Err(e) => tracing::warn!("Could not grow buffers to {}: {}", size, e),
        }
    }
}

/// When the next tick should start, and how many whole intervals were missed
///
/// A tick that finished before `deadline` waits for it. An overrun starts the
/// next tick immediately and drops the intervals it overran instead of
/// queueing catch-up ticks.
fn next_deadline(deadline: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    if now < deadline {
        return (deadline, 0);
    }
    let overdue = now.duration_since(deadline).as_nanos();
    let skipped = (overdue / interval.as_nanos().max(1)) as u64;
    (now, skipped)
}

fn idle_status(mode: TriggerMode) -> TriggerStatus {
    if mode.is_active() {
        TriggerStatus::WaitingForTrigger
    } else {
        TriggerStatus::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SampleEvent;
    use crate::config::{
        AcquisitionConfig, ChannelConfig, DisplayMode, ScopeConfig, TriggerConfig,
    };
    use crate::display::{frame_channel, Frame, MockFrameSink};
    use crate::types::Protocol;
    use crossbeam_channel::{unbounded, Sender};

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(secs, 0)
    }

    struct Harness {
        engine: Arc<ScopeEngine>,
        refresh: RefreshLoop,
        frames: Receiver<Frame>,
        commands: Sender<RefreshCommand>,
    }

    fn create_test_loop(config: ScopeConfig) -> Harness {
        let engine = Arc::new(ScopeEngine::new(config).unwrap());
        let (sink, frames) = frame_channel(16);
        let (commands, command_rx) = unbounded();
        let refresh = RefreshLoop::new(
            Arc::clone(&engine),
            Box::new(sink),
            command_rx,
            Arc::new(AtomicBool::new(true)),
        );
        Harness {
            engine,
            refresh,
            frames,
            commands,
        }
    }

    fn free_run_config() -> ScopeConfig {
        let mut config = ScopeConfig::default();
        config.add_channel(ChannelConfig::new("ch:a", Protocol::Ca));
        config.add_channel(ChannelConfig::new("ch:b", Protocol::Ca));
        config
    }

    fn triggered_config(capacity: usize) -> ScopeConfig {
        let mut config = ScopeConfig::default();
        config.add_channel(ChannelConfig::new("ch:a", Protocol::Ca));
        config.acquisition = AcquisitionConfig {
            capacity,
            ..Default::default()
        };
        config.trigger = TriggerConfig {
            mode: TriggerMode::GtThreshold,
            pv: Some("trig".to_string()),
            protocol: Protocol::Ca,
            threshold: 0.5,
            data_time_field: Some("ch:t".to_string()),
            autoscale_buffer: true,
            ..Default::default()
        };
        config
    }

    /// Time field and data share timestamps: value t and 10 * t at second t
    fn feed(engine: &ScopeEngine, range: std::ops::Range<i64>) {
        for t in range {
            engine.ingest(SampleEvent::new("ch:t", t as f64, ts(t))).unwrap();
            engine
                .ingest(SampleEvent::new("ch:a", 10.0 * t as f64, ts(t)))
                .unwrap();
        }
    }

    fn fire(engine: &ScopeEngine, at: i64) {
        engine.ingest(SampleEvent::new("trig", 0.0, ts(at - 1))).unwrap();
        engine.ingest(SampleEvent::new("trig", 1.0, ts(at))).unwrap();
    }

    #[test]
    fn test_free_run_frame() {
        let mut h = create_test_loop(free_run_config());
        h.engine
            .ingest(SampleEvent::new("ch:a", vec![1.0, 2.0, 3.0], ts(1)))
            .unwrap();

        assert_eq!(h.refresh.tick(), TickOutcome::Delivered(1));
        let frame = h.frames.try_recv().unwrap();
        assert_eq!(frame.trigger_status, TriggerStatus::Off);
        assert_eq!(frame.channels.len(), 1);
        let ys: Vec<f64> = frame.channels[0].series.ys().collect();
        assert_eq!(ys, vec![1.0, 2.0, 3.0]);
        assert!(frame.trigger_marker.is_none());
    }

    #[test]
    fn test_disconnected_channel_has_no_series() {
        let mut h = create_test_loop(free_run_config());
        h.engine.ingest(SampleEvent::new("ch:a", 1.0, ts(1))).unwrap();
        h.engine.ingest(SampleEvent::new("ch:b", 2.0, ts(1))).unwrap();
        h.engine.ingest(SampleEvent::disconnected("ch:b", ts(2))).unwrap();

        h.refresh.tick();
        let frame = h.frames.try_recv().unwrap();
        assert!(frame.channel(1).is_some());
        assert!(frame.channel(2).is_none());
    }

    #[test]
    fn test_stopped_channel_not_drawn() {
        let mut h = create_test_loop(free_run_config());
        h.engine.ingest(SampleEvent::new("ch:a", 1.0, ts(1))).unwrap();
        h.engine.set_started(1, false).unwrap();
        h.refresh.tick();
        assert!(h.frames.try_recv().unwrap().is_empty());
    }

    #[test]
    fn test_triggered_window_capture() {
        let mut h = create_test_loop(triggered_config(5));
        feed(&h.engine, 0..10);
        fire(&h.engine, 7);

        assert!(matches!(h.refresh.tick(), TickOutcome::Delivered(_)));
        let frame = h.frames.try_recv().unwrap();
        let ys: Vec<f64> = frame.channel(1).unwrap().series.ys().collect();
        assert_eq!(ys, vec![50.0, 60.0, 70.0, 80.0, 90.0]);
        assert_eq!(frame.trigger_marker.unwrap().x, 2.0);
        assert_eq!(frame.trigger_status, TriggerStatus::WaitingForTrigger);
        assert!(frame.autoscaled);
        assert_eq!(h.refresh.correlator().captures(), 1);
    }

    #[test]
    fn test_capture_stays_frozen() {
        let mut h = create_test_loop(triggered_config(5));
        feed(&h.engine, 0..10);
        fire(&h.engine, 7);
        h.refresh.tick();
        h.frames.try_recv().unwrap();

        feed(&h.engine, 10..15);
        h.refresh.tick();
        let frame = h.frames.try_recv().unwrap();
        let ys: Vec<f64> = frame.channel(1).unwrap().series.ys().collect();
        assert_eq!(ys, vec![50.0, 60.0, 70.0, 80.0, 90.0]);
    }

    #[test]
    fn test_no_frame_before_first_trigger() {
        let mut h = create_test_loop(triggered_config(5));
        feed(&h.engine, 0..10);
        assert_eq!(h.refresh.tick(), TickOutcome::Held);
        assert_eq!(h.refresh.trigger_status(), TriggerStatus::WaitingForTrigger);
    }

    #[test]
    fn test_trigger_ahead_of_data_waits() {
        let mut h = create_test_loop(triggered_config(5));
        feed(&h.engine, 0..5);
        fire(&h.engine, 6);

        assert_eq!(h.refresh.tick(), TickOutcome::Held);
        assert!(matches!(
            h.refresh.trigger_status(),
            TriggerStatus::WaitingForData { .. }
        ));
        assert!(h.refresh.correlator().pending().is_some());

        feed(&h.engine, 5..10);
        assert!(matches!(h.refresh.tick(), TickOutcome::Delivered(_)));
        let frame = h.frames.try_recv().unwrap();
        let ys: Vec<f64> = frame.channel(1).unwrap().series.ys().collect();
        assert_eq!(ys, vec![50.0, 60.0, 70.0, 80.0]);
        assert_eq!(frame.trigger_marker.unwrap().x, 1.0);
    }

    #[test]
    fn test_missed_trigger_grows_buffer() {
        let mut h = create_test_loop(triggered_config(5));
        feed(&h.engine, 10..15);
        fire(&h.engine, 2);

        assert_eq!(h.refresh.tick(), TickOutcome::Held);
        assert_eq!(h.refresh.stats().correlation_misses, 1);
        assert_eq!(h.engine.registry().capacity(), 15);
        assert!(matches!(
            h.refresh.trigger_status(),
            TriggerStatus::Missed {
                suggested_buffer: 15,
                ..
            }
        ));
    }

    #[test]
    fn test_trigger_disconnect_status() {
        let mut h = create_test_loop(triggered_config(5));
        h.engine.ingest(SampleEvent::disconnected("trig", ts(1))).unwrap();
        h.refresh.tick();
        assert_eq!(h.refresh.trigger_status(), TriggerStatus::Disconnected);

        h.engine.ingest(SampleEvent::new("trig", 0.0, ts(2))).unwrap();
        h.refresh.tick();
        assert_eq!(h.refresh.trigger_status(), TriggerStatus::WaitingForTrigger);
    }

    #[test]
    fn test_mode_change_returns_to_free_run() {
        let mut h = create_test_loop(triggered_config(5));
        feed(&h.engine, 0..10);
        fire(&h.engine, 7);
        h.refresh.tick();
        h.frames.try_recv().unwrap();

        h.engine.set_trigger_mode(TriggerMode::Off);
        feed(&h.engine, 10..12);
        h.refresh.tick();
        let frame = h.frames.try_recv().unwrap();
        assert_eq!(frame.trigger_status, TriggerStatus::Off);
        let ys: Vec<f64> = frame.channel(1).unwrap().series.ys().collect();
        assert_eq!(ys, vec![70.0, 80.0, 90.0, 100.0, 110.0]);
    }

    #[test]
    fn test_freeze_and_display_commands() {
        let mut h = create_test_loop(free_run_config());
        h.engine
            .ingest(SampleEvent::new("ch:a", vec![0.0, 1.0, 0.0, -1.0], ts(1)))
            .unwrap();

        h.commands.send(RefreshCommand::Freeze(true)).unwrap();
        h.refresh.process_commands();
        assert_eq!(h.refresh.tick(), TickOutcome::Held);

        let display = DisplayConfig {
            mode: DisplayMode::Fft,
            ..Default::default()
        };
        h.commands.send(RefreshCommand::Freeze(false)).unwrap();
        h.commands.send(RefreshCommand::SetDisplay(display)).unwrap();
        h.refresh.process_commands();
        h.refresh.tick();
        let frame = h.frames.try_recv().unwrap();
        assert_eq!(frame.mode, DisplayMode::Fft);
        assert_eq!(frame.channel(1).unwrap().series.len(), 3);
    }

    #[test]
    fn test_shutdown_command_stops_run() {
        let mut h = create_test_loop(free_run_config());
        h.commands.send(RefreshCommand::Shutdown).unwrap();
        h.refresh.run();
        assert_eq!(h.refresh.stats().ticks, 0);
    }

    #[test]
    fn test_dropped_frames_counted() {
        let engine = Arc::new(ScopeEngine::new(free_run_config()).unwrap());
        engine.ingest(SampleEvent::new("ch:a", 1.0, ts(1))).unwrap();

        let mut sink = MockFrameSink::new();
        sink.expect_deliver().times(2).returning(|_| false);
        sink.expect_dropped().return_const(2u64);

        let (_commands, command_rx) = unbounded();
        let mut refresh = RefreshLoop::new(
            engine,
            Box::new(sink),
            command_rx,
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(refresh.tick(), TickOutcome::Dropped(1));
        assert_eq!(refresh.tick(), TickOutcome::Dropped(2));
        let stats = refresh.stats();
        assert_eq!(stats.frames_emitted, 0);
        assert_eq!(stats.frames_dropped, 2);
    }

    #[test]
    fn test_short_buffer_marker_follows_its_own_slice() {
        let mut h = create_test_loop(triggered_config(5));
        for t in 0..10 {
            h.engine.ingest(SampleEvent::new("ch:t", t as f64, ts(t))).unwrap();
        }
        for t in 6..10 {
            h.engine
                .ingest(SampleEvent::new("ch:a", 10.0 * t as f64, ts(t)))
                .unwrap();
        }
        fire(&h.engine, 7);

        assert!(matches!(h.refresh.tick(), TickOutcome::Delivered(_)));
        let frame = h.frames.try_recv().unwrap();
        assert_eq!(frame.trigger_marker.unwrap().x, 2.0);

        let channel = frame.channel(1).unwrap();
        let ys: Vec<f64> = channel.series.ys().collect();
        assert_eq!(ys, vec![60.0, 70.0, 80.0, 90.0]);
        assert_eq!(channel.trigger_index, Some(1));
        assert_eq!(ys[channel.trigger_index.unwrap()], 70.0);
    }

    #[test]
    fn test_next_deadline_waits_when_on_time() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let deadline = start + interval;
        let now = start + Duration::from_millis(40);
        assert_eq!(next_deadline(deadline, now, interval), (deadline, 0));
    }

    #[test]
    fn test_next_deadline_skips_whole_missed_intervals() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let deadline = start + interval;

        // Finished exactly on the deadline: nothing skipped, tick right away
        assert_eq!(next_deadline(deadline, deadline, interval), (deadline, 0));

        // 50 ms late is less than one interval
        let now = deadline + Duration::from_millis(50);
        assert_eq!(next_deadline(deadline, now, interval), (now, 0));

        // 350 ms late skips three whole intervals
        let now = deadline + Duration::from_millis(350);
        let (next, skipped) = next_deadline(deadline, now, interval);
        assert_eq!(skipped, 3);
        assert!(next >= now);
    }
}
