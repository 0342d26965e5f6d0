//! pvscope demo entry point
//!
//! Runs a scope against the simulated source and logs every frame.
//!
//! ```text
//! pvscope [SCOPE_FILE] [SECONDS]
//! ```
//!
//! Without a scope file the built-in sample configuration is used.

use anyhow::Context;
use pvscope::{
    config::ScopeConfig,
    display::frame_channel,
    sim::SimulatedSource,
    RefreshCommand, RefreshLoop, ScopeEngine,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pvscope=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ScopeConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => ScopeConfig::sample(),
    };
    let run_for = match args.next() {
        Some(secs) => Duration::from_secs_f64(secs.parse().context("SECONDS must be a number")?),
        None => Duration::from_secs(10),
    };

    tracing::info!("Starting scope '{}' for {:?}", config.name, run_for);

    let engine = Arc::new(ScopeEngine::new(config).context("building scope")?);
    let running = Arc::new(AtomicBool::new(true));
    let (sink, frames) = frame_channel(4);
    let (commands, command_rx) = crossbeam_channel::unbounded();

    // Refresh loop
    let mut refresh = RefreshLoop::new(
        Arc::clone(&engine),
        Box::new(sink),
        command_rx,
        Arc::clone(&running),
    );
    let refresh_handle = std::thread::spawn(move || {
        refresh.run();
        refresh.stats()
    });

    // Simulated subscriptions
    let producer_engine = Arc::clone(&engine);
    let producer_running = Arc::clone(&running);
    let producer_handle = std::thread::spawn(move || {
        let mut source = SimulatedSource::scope_sample();
        let period = Duration::from_secs_f64(source.update_period());
        while producer_running.load(Ordering::SeqCst) {
            for event in source.next_events() {
                if let Err(e) = producer_engine.ingest(event) {
                    if e.is_transient() {
                        tracing::trace!("{}", e);
                    } else {
                        tracing::warn!("Ingest failed: {}", e);
                    }
                }
            }
            std::thread::sleep(period);
        }
        for event in source.disconnect_events() {
            let _ = producer_engine.ingest(event);
        }
    });

    // Stand-in renderer
    let deadline = Instant::now() + run_for;
    while Instant::now() < deadline {
        match frames.recv_timeout(Duration::from_millis(250)) {
            Ok(frame) => {
                let points: usize = frame.channels.iter().map(|c| c.series.len()).sum();
                tracing::debug!(
                    "Frame #{} {}: {} channels, {} points, {}",
                    frame.sequence,
                    frame.mode,
                    frame.channels.len(),
                    points,
                    frame.trigger_status
                );
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("Shutting down...");
    let _ = commands.send(RefreshCommand::Shutdown);
    running.store(false, Ordering::SeqCst);
    // Unblock a sink that is waiting on a full channel
    drop(frames);

    let stats = refresh_handle
        .join()
        .map_err(|_| anyhow::anyhow!("refresh thread panicked"))?;
    producer_handle
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;

    let acquisition = engine.stats();
    tracing::info!(
        "{} frames ({} dropped, {} ticks skipped), {} updates, {} stale, {} triggers fired, {:.1} fps",
        stats.frames_emitted,
        stats.frames_dropped,
        stats.ticks_skipped,
        acquisition.updates_received,
        acquisition.stale_dropped,
        engine.triggers_fired(),
        stats.fps
    );

    Ok(())
}
