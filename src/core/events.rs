//! Notifications from the capture worker to its host
//!
//! The worker only ever pushes; it never waits on the consumer. Hosts either
//! implement [`EventSink`] themselves or take a [`ChannelSink`] and drain the
//! receiver on a thread of their choosing. Events arrive in emission order,
//! which matters: pixel-run batches only make sense rendered in sequence.

use super::protocol::PixelRun;
use crossbeam_channel::{Receiver, Sender};

/// Event emitted by the capture engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Transient progress text ("Waiting for header...")
    Status(String),
    /// Informational operator log entry
    Log(String),
    /// Operator warning
    Warning(String),
    /// Operator error; hosts should also sound an alert
    Error(String),
    /// A fresh image is about to arrive
    NewPage,
    /// Next batch of decoded runs
    PixelRuns(Vec<PixelRun>),
}

/// Receiver of engine notifications
pub trait EventSink: Send {
    /// Transient state/progress text
    fn on_status(&self, text: &str);
    /// Persistent log entry
    fn on_log(&self, text: &str);
    /// Persistent warning
    fn on_warning(&self, text: &str);
    /// Persistent error
    fn on_error(&self, text: &str);
    /// Clear the capture surface for a new image
    fn on_new_page(&self);
    /// Ordered batch of decoded runs
    fn on_pixel_runs(&self, batch: Vec<PixelRun>);
}

/// [`EventSink`] that forwards everything into a FIFO channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<CaptureEvent>,
}

impl ChannelSink {
    /// Wrap an existing sender
    pub fn new(tx: Sender<CaptureEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of an unbounded channel
    pub fn unbounded() -> (Self, Receiver<CaptureEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: CaptureEvent) {
        // A host that has hung up no longer cares; keep capturing regardless.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_status(&self, text: &str) {
        self.send(CaptureEvent::Status(text.to_string()));
    }

    fn on_log(&self, text: &str) {
        self.send(CaptureEvent::Log(text.to_string()));
    }

    fn on_warning(&self, text: &str) {
        self.send(CaptureEvent::Warning(text.to_string()));
    }

    fn on_error(&self, text: &str) {
        self.send(CaptureEvent::Error(text.to_string()));
    }

    fn on_new_page(&self) {
        self.send(CaptureEvent::NewPage);
    }

    fn on_pixel_runs(&self, batch: Vec<PixelRun>) {
        self.send(CaptureEvent::PixelRuns(batch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_preserves_order() {
        let (sink, rx) = ChannelSink::unbounded();
        sink.on_status("one");
        sink.on_new_page();
        sink.on_pixel_runs(vec![PixelRun::new(1, 2, 3)]);
        sink.on_error("boom");

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                CaptureEvent::Status("one".into()),
                CaptureEvent::NewPage,
                CaptureEvent::PixelRuns(vec![PixelRun::new(1, 2, 3)]),
                CaptureEvent::Error("boom".into()),
            ]
        );
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = ChannelSink::unbounded();
        drop(rx);
        sink.on_log("nobody listening");
    }
}
