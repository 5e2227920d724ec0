//! Offline replay of recorded capture streams
//!
//! Runs the same engine the `capture` command uses, synchronously, against an
//! in-memory port preloaded with the recording.

use super::consumer::CaptureConsumer;
use crate::core::events::ChannelSink;
use crate::core::session::SessionControl;
use crate::core::state_machine::{CaptureEngine, CaptureState, CaptureTiming};
use crate::core::transport::{MemoryFeed, MemoryOpener, PortSession, PortSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REPLAY_PORT: &str = "replay";

/// Outcome of a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    /// Captures decoded to completion
    pub captures: u64,
    /// Engine steps taken
    pub steps: u64,
}

/// Decode every capture in `recording`, passing the events to `consumer`
pub fn replay(recording: &[u8], consumer: &mut CaptureConsumer) -> image::ImageResult<ReplaySummary> {
    let feed = MemoryFeed::new();
    feed.push(recording);

    // One byte at a time so the handshake reset never discards the next capture
    let opener = MemoryOpener::new(feed.clone())
        .keep_input_on_clear()
        .with_chunk_limit(1);
    let port = PortSession::new(Box::new(opener), PortSettings::default());
    let (sink, events) = ChannelSink::unbounded();
    let control = Arc::new(SessionControl::new(REPLAY_PORT));
    let timing = CaptureTiming {
        idle_backoff: Duration::ZERO,
        header_poll: Duration::ZERO,
        data_poll_interval: Duration::ZERO,
        data_poll_attempts: 1,
    };
    let mut engine = CaptureEngine::new(port, sink, control, timing);

    let mut steps = 0u64;
    loop {
        engine.step();
        steps += 1;
        for event in events.try_iter() {
            consumer.handle(event)?;
        }

        let drained = feed.is_empty() && engine.buffered() == 0;
        if drained && engine.state() == CaptureState::AwaitHeader && steps > 1 {
            break;
        }
    }
    engine.shutdown();
    debug!(steps, captures = engine.completed_captures(), "replay finished");

    Ok(ReplaySummary {
        captures: engine.completed_captures(),
        steps,
    })
}
