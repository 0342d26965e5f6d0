//! Scope construction helpers

use crossbeam_channel::{unbounded, Receiver, Sender};
use pvscope::config::ScopeConfig;
use pvscope::display::frame_channel;
use pvscope::{Frame, RefreshCommand, RefreshLoop, ScopeEngine};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A scope wired to an in-memory frame channel
pub struct TestScope {
    pub engine: Arc<ScopeEngine>,
    pub refresh: RefreshLoop,
    pub frames: Receiver<Frame>,
    pub commands: Sender<RefreshCommand>,
    pub running: Arc<AtomicBool>,
}

impl TestScope {
    /// Tick once and return the delivered frame, if any
    pub fn frame(&mut self) -> Option<Frame> {
        self.refresh.tick();
        self.frames.try_recv().ok()
    }

    /// Y values of a channel in the next frame
    pub fn channel_values(&mut self, channel_id: u32) -> Option<Vec<f64>> {
        let frame = self.frame()?;
        frame
            .channel(channel_id)
            .map(|c| c.series.ys().collect())
    }
}

/// Create a scope for tests
pub fn create_test_scope(config: ScopeConfig) -> TestScope {
    let engine = Arc::new(ScopeEngine::new(config).expect("valid test config"));
    let (sink, frames) = frame_channel(64);
    let (commands, command_rx) = unbounded();
    let running = Arc::new(AtomicBool::new(true));
    let refresh = RefreshLoop::new(
        Arc::clone(&engine),
        Box::new(sink),
        command_rx,
        Arc::clone(&running),
    );
    TestScope {
        engine,
        refresh,
        frames,
        commands,
        running,
    }
}
