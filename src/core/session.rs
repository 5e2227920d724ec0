//! Capture session: the shared control block and the worker thread
//!
//! The host writes the requested port name and the switch/terminate flags;
//! the worker reads them at its poll points. Each flag is an independent
//! atomic and there is no invariant spanning them, so a stale read only
//! delays a change by one poll cycle. The port name sits behind a lock that
//! is held just long enough to clone or replace the string.

use super::error::CaptureError;
use super::events::EventSink;
use super::state_machine::{CaptureEngine, CaptureTiming};
use super::transport::PortSession;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Values shared between the host and the capture worker
#[derive(Debug)]
pub struct SessionControl {
    requested_port: RwLock<String>,
    switch_pending: AtomicBool,
    terminate: AtomicBool,
}

impl SessionControl {
    /// Create a control block whose first port switch targets `port`
    pub fn new(port: &str) -> Self {
        Self {
            requested_port: RwLock::new(port.trim().to_string()),
            switch_pending: AtomicBool::new(true),
            terminate: AtomicBool::new(false),
        }
    }

    /// Ask the worker to move to another port. Surrounding whitespace is dropped.
    pub fn request_port(&self, name: &str) {
        *self.requested_port.write() = name.trim().to_string();
        self.switch_pending.store(true, Ordering::Release);
    }

    /// Most recently requested port name
    pub fn requested_port(&self) -> String {
        self.requested_port.read().clone()
    }

    /// Check if a port request has not been picked up yet
    pub fn port_switch_pending(&self) -> bool {
        self.switch_pending.load(Ordering::Acquire)
    }

    /// Consume a pending port request
    pub(crate) fn take_port_switch(&self) -> Option<String> {
        self.switch_pending
            .swap(false, Ordering::AcqRel)
            .then(|| self.requested_port())
    }

    /// Ask the worker to stop at its next safe point
    pub fn request_termination(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    /// Check if termination has been requested
    pub fn termination_requested(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }
}

/// Drive `engine` until termination is requested, then close the port.
pub fn run_worker<S: EventSink>(engine: &mut CaptureEngine<S>) {
    let control = Arc::clone(engine.control());
    info!("capture worker started");

    while !control.termination_requested() {
        let delay = engine.step();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    engine.shutdown();
    info!(captures = engine.completed_captures(), "capture worker stopped");
}

/// Handle onto a running capture worker. Dropping it stops the worker.
#[derive(Debug)]
pub struct CaptureHandle {
    control: Arc<SessionControl>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureHandle {
    /// Shared control block
    pub fn control(&self) -> &Arc<SessionControl> {
        &self.control
    }

    /// Ask the worker to move to another port
    pub fn request_port(&self, name: &str) {
        self.control.request_port(name);
    }

    /// Check if the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, thread::JoinHandle::is_finished)
    }

    /// Request termination and wait for the worker to exit
    pub fn stop(&mut self) {
        self.control.request_termination();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("capture worker panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a capture worker thread.
pub fn spawn_worker<S>(
    port: PortSession,
    sink: S,
    control: Arc<SessionControl>,
    timing: CaptureTiming,
) -> Result<CaptureHandle, CaptureError>
where
    S: EventSink + 'static,
{
    let mut engine = CaptureEngine::new(port, sink, Arc::clone(&control), timing);
    let thread = thread::Builder::new()
        .name("tekcap-worker".to_string())
        .spawn(move || run_worker(&mut engine))
        .map_err(CaptureError::Spawn)?;

    debug!("capture worker spawned");
    Ok(CaptureHandle {
        control,
        thread: Some(thread),
    })
}
