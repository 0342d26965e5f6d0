//! Frame delivery to the renderer

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::frame::Frame;

/// Consumer of assembled frames
///
/// Implementations must not block: the refresh loop calls `deliver` once per
/// tick and a slow renderer only loses frames.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink: Send {
    /// Hand over a frame; returns false if it was dropped
    fn deliver(&mut self, frame: Frame) -> bool;

    /// Frames dropped so far
    fn dropped(&self) -> u64;
}

/// Bounded channel to a renderer thread
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<Frame>,
    dropped: u64,
    disconnected: bool,
}

impl ChannelSink {
    /// Wrap an existing sender
    pub fn new(tx: Sender<Frame>) -> Self {
        Self {
            tx,
            dropped: 0,
            disconnected: false,
        }
    }
}

/// Create a bounded frame channel
pub fn frame_channel(capacity: usize) -> (ChannelSink, Receiver<Frame>) {
    let (tx, rx) = bounded(capacity.max(1));
    (ChannelSink::new(tx), rx)
}

impl FrameSink for ChannelSink {
    fn deliver(&mut self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                if !self.disconnected {
                    tracing::warn!("Frame receiver disconnected");
                    self.disconnected = true;
                }
                self.dropped += 1;
                false
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        if self.dropped > 0 {
            tracing::warn!("Frame sink closed with {} dropped frames", self.dropped);
        }
    }
}
