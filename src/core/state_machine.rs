//! Capture state machine
//!
//! Drives one acquisition cycle after another: open the port, hunt for the
//! scope's header line, read and validate the announced resolution, wait out
//! the pause before the binary body, then decode the RLE stream into pixel
//! runs. Every state returns the delay the worker should sleep before the
//! next step; no failure ever leaves the machine, it only changes state.

use super::byte_buffer::ByteBuffer;
use super::error::CaptureError;
use super::events::EventSink;
use super::protocol::{
    decode_run, dimension_in_range, is_scope_header, parse_dimension, PixelRun, Resolution,
    DIMENSION_LINE_CAP, HEADER_LINE_CAP, HEADER_LINE_TRIM, LINE_FEED, NUL, RUN_BATCH_SIZE,
};
use super::session::SessionControl;
use super::transport::PortSession;
use crate::utils::WaitIndicator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureState {
    /// Trying to open the configured port
    Opening,
    /// Port open, looking for the identifier line
    AwaitHeader,
    /// Reading the X resolution line
    ReadXRes,
    /// Reading the Y resolution line
    ReadYRes,
    /// Expecting the NUL that ends the preamble
    ReadNull,
    /// Waiting for the scope to start sending the body
    AwaitData,
    /// Decoding the RLE body
    ReceiveData,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opening => "Opening",
            Self::AwaitHeader => "AwaitHeader",
            Self::ReadXRes => "ReadXRes",
            Self::ReadYRes => "ReadYRes",
            Self::ReadNull => "ReadNull",
            Self::AwaitData => "AwaitData",
            Self::ReceiveData => "ReceiveData",
        };
        f.write_str(name)
    }
}

/// Backoff and polling intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Delay between attempts when no port is configured or it will not open
    pub idle_backoff: Duration,
    /// Delay between header polls while the line is incomplete
    pub header_poll: Duration,
    /// Spacing of the availability polls after the preamble
    pub data_poll_interval: Duration,
    /// Availability polls before giving up on the body
    pub data_poll_attempts: u32,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(500),
            header_poll: Duration::from_millis(250),
            data_poll_interval: Duration::from_millis(100),
            data_poll_attempts: 20,
        }
    }
}

/// The acquisition protocol engine
pub struct CaptureEngine<S: EventSink> {
    port: PortSession,
    buffer: ByteBuffer,
    sink: S,
    control: Arc<SessionControl>,
    timing: CaptureTiming,
    state: CaptureState,
    previous_state: Option<CaptureState>,
    header_line: Vec<u8>,
    resolution: Resolution,
    dots: WaitIndicator,
    captures: u64,
}

impl<S: EventSink> CaptureEngine<S> {
    /// Create an engine in the Opening state
    pub fn new(port: PortSession, sink: S, control: Arc<SessionControl>, timing: CaptureTiming) -> Self {
        Self {
            port,
            buffer: ByteBuffer::new(),
            sink,
            control,
            timing,
            state: CaptureState::Opening,
            previous_state: None,
            header_line: Vec::with_capacity(HEADER_LINE_CAP + 1),
            resolution: Resolution::default(),
            dots: WaitIndicator::default(),
            captures: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// State that ran on the previous step
    pub fn previous_state(&self) -> Option<CaptureState> {
        self.previous_state
    }

    /// Shared control block
    pub fn control(&self) -> &Arc<SessionControl> {
        &self.control
    }

    /// Port session
    pub fn port(&self) -> &PortSession {
        &self.port
    }

    /// Event sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Resolution announced by the most recent preamble
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Partial header line collected so far
    pub fn header_line(&self) -> &[u8] {
        &self.header_line
    }

    /// Bytes read from the port but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.pending()
    }

    /// Captures decoded to completion
    pub fn completed_captures(&self) -> u64 {
        self.captures
    }

    /// Run the current state once and return how long to wait before the next step
    pub fn step(&mut self) -> Duration {
        let current = self.state;
        let result = match current {
            CaptureState::Opening => self.opening(),
            CaptureState::AwaitHeader => self.await_header(),
            CaptureState::ReadXRes => self.read_x_res(),
            CaptureState::ReadYRes => self.read_y_res(),
            CaptureState::ReadNull => self.read_null(),
            CaptureState::AwaitData => self.await_data(),
            CaptureState::ReceiveData => self.receive_data(),
        };
        let delay = result.unwrap_or_else(|err| self.recover(err));
        self.previous_state = Some(current);
        delay
    }

    /// Release the port. Called once when the worker exits.
    pub fn shutdown(&mut self) {
        self.port.close();
    }

    fn transition(&mut self, next: CaptureState) {
        if next != self.state {
            debug!(from = %self.state, to = %next, "capture state transition");
        }
        self.state = next;
    }

    fn status_with_dots(&mut self, text: &str) {
        let dots = self.dots.next_dots();
        self.sink.on_status(&format!("{text}{dots}"));
    }

    /// Map a failure to its recovery transition
    fn recover(&mut self, err: CaptureError) -> Duration {
        match err {
            CaptureError::Transport(source) => {
                error!(port = %self.port.name(), error = %source, "serial port failed");
                self.sink
                    .on_error(&format!("Serial port failure ({source}); reopening port."));
                self.port.close();
                self.transition(CaptureState::Opening);
                return Duration::ZERO;
            }
            CaptureError::PortUnavailable { ref port, ref source } => {
                debug!(%port, error = %source, "port unavailable");
                self.status_with_dots("Unable to open specified port");
                return self.timing.idle_backoff;
            }
            CaptureError::UnsupportedResolution { .. } => {
                warn!(error = %err, "unsupported resolution");
                self.sink.on_warning(&err.to_string());
            }
            CaptureError::ProtocolViolation(reason) => {
                error!(reason, "invalid capture data");
                self.sink.on_error("Invalid data received; capture aborted.");
            }
            CaptureError::DataTimeout => {
                error!("capture stalled");
                self.sink.on_error("Timed out waiting for data; capture aborted.");
            }
            CaptureError::HandshakeGarbage(ref detail) => {
                debug!(%detail, "handshake rejected");
            }
            CaptureError::Timeout => {
                debug!(state = %self.state, "read timed out during handshake");
            }
            CaptureError::Spawn(ref source) => {
                error!(error = %source, "unexpected worker error");
            }
        }
        self.transition(CaptureState::AwaitHeader);
        Duration::ZERO
    }

    /// Apply a port change requested by the host. Returns `true` if the
    /// target changed (and the port was closed).
    fn apply_port_switch(&mut self) -> bool {
        let Some(requested) = self.control.take_port_switch() else {
            return false;
        };
        if !self.port.switch_to(&requested) {
            return false;
        }
        info!(port = %requested, "serial port changed");
        self.sink.on_log(&format!("Serial port set to '{requested}'"));
        true
    }

    fn opening(&mut self) -> Result<Duration, CaptureError> {
        self.apply_port_switch();

        if self.port.name().is_empty() {
            self.status_with_dots("No serial port specified");
            return Ok(self.timing.idle_backoff);
        }

        let name = self.port.name().to_string();
        self.port
            .open(&name)
            .map_err(|source| CaptureError::PortUnavailable { port: name, source })?;

        self.transition(CaptureState::AwaitHeader);
        Ok(Duration::ZERO)
    }

    fn await_header(&mut self) -> Result<Duration, CaptureError> {
        if self.apply_port_switch() {
            self.transition(CaptureState::Opening);
            return Ok(Duration::ZERO);
        }

        if self.previous_state != Some(CaptureState::AwaitHeader) {
            self.buffer.reset();
            self.port.clear_input()?;
            self.header_line.clear();
        }

        self.status_with_dots("Waiting for header");

        loop {
            if self.buffer.available(&mut self.port)? == 0 {
                return Ok(self.timing.header_poll);
            }
            let byte = match self.buffer.get_byte(&mut self.port) {
                Ok(byte) => byte,
                Err(CaptureError::Timeout) => return Ok(self.timing.header_poll),
                Err(e) => return Err(e),
            };
            if byte == LINE_FEED {
                break;
            }
            self.header_line.push(byte);
            if self.header_line.len() > HEADER_LINE_CAP {
                self.header_line.truncate(self.header_line.len() - HEADER_LINE_TRIM);
            }
        }

        if !is_scope_header(&self.header_line) {
            debug!(line = %hex::encode(&self.header_line), "discarding unrecognized line");
            self.header_line.clear();
            return Ok(self.timing.header_poll);
        }

        info!(header = %String::from_utf8_lossy(&self.header_line), "scope header recognized");
        self.header_line.clear();
        self.transition(CaptureState::ReadXRes);
        Ok(Duration::ZERO)
    }

    /// Read up to [`DIMENSION_LINE_CAP`] bytes or through the next LF. A
    /// timeout ends the line early.
    fn read_line(&mut self) -> Result<Vec<u8>, CaptureError> {
        let mut line = Vec::new();
        while line.len() < DIMENSION_LINE_CAP {
            match self.buffer.get_byte(&mut self.port) {
                Ok(LINE_FEED) => break,
                Ok(byte) => line.push(byte),
                Err(CaptureError::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(line)
    }

    fn read_dimension(&mut self, axis: &str) -> Result<u32, CaptureError> {
        let line = self.read_line()?;
        let value = parse_dimension(&line);
        dimension_in_range(value)
            .ok_or_else(|| CaptureError::HandshakeGarbage(format!("{axis} resolution {value} out of range")))
    }

    fn read_x_res(&mut self) -> Result<Duration, CaptureError> {
        self.resolution.x = self.read_dimension("X")?;
        self.transition(CaptureState::ReadYRes);
        Ok(Duration::ZERO)
    }

    fn read_y_res(&mut self) -> Result<Duration, CaptureError> {
        self.resolution.y = self.read_dimension("Y")?;
        if !self.resolution.is_supported() {
            return Err(CaptureError::UnsupportedResolution {
                x: self.resolution.x,
                y: self.resolution.y,
            });
        }
        self.transition(CaptureState::ReadNull);
        Ok(Duration::ZERO)
    }

    fn read_null(&mut self) -> Result<Duration, CaptureError> {
        let byte = self.buffer.get_byte(&mut self.port)?;
        if byte != NUL {
            return Err(CaptureError::HandshakeGarbage(format!(
                "expected NUL after preamble, got 0x{byte:02X}"
            )));
        }
        // The scope pauses before the body; AwaitData waits it out rather
        // than letting the first body read time out.
        self.transition(CaptureState::AwaitData);
        Ok(Duration::ZERO)
    }

    fn await_data(&mut self) -> Result<Duration, CaptureError> {
        self.sink.on_status("Header received, waiting for data...");

        for _ in 0..self.timing.data_poll_attempts {
            if self.buffer.available(&mut self.port)? > 0 {
                self.sink.on_new_page();
                self.transition(CaptureState::ReceiveData);
                return Ok(Duration::ZERO);
            }
            std::thread::sleep(self.timing.data_poll_interval);
        }

        debug!("no capture body after preamble");
        self.transition(CaptureState::AwaitHeader);
        Ok(Duration::ZERO)
    }

    fn next_run(&mut self) -> Result<PixelRun, CaptureError> {
        let (buffer, port) = (&mut self.buffer, &mut self.port);
        let first = buffer.get_byte(port)?;
        decode_run(first, || buffer.get_byte(port))
    }

    fn receive_data(&mut self) -> Result<Duration, CaptureError> {
        let total = self.resolution.pixel_count();
        let mut remaining = total;
        let mut batch = Vec::with_capacity(RUN_BATCH_SIZE);

        self.status_with_dots("Receiving data (0%)");
        self.sink.on_log("Beginning screen capture.");
        info!(resolution = %self.resolution, "screen capture started");

        while remaining > 0 {
            let run = self.next_run().map_err(|e| match e {
                CaptureError::Timeout => CaptureError::DataTimeout,
                other => other,
            })?;
            remaining = remaining.saturating_sub(run.pixels());
            batch.push(run);

            if batch.len() == RUN_BATCH_SIZE || remaining == 0 {
                if self.control.termination_requested() {
                    info!("termination requested during capture");
                    return Ok(Duration::ZERO);
                }
                let percent = ((total - remaining) as f64 / total as f64 * 100.0).round() as u32;
                self.status_with_dots(&format!("Receiving data ({percent}%)"));
                self.sink
                    .on_pixel_runs(std::mem::replace(&mut batch, Vec::with_capacity(RUN_BATCH_SIZE)));
            }
        }

        self.captures += 1;
        info!(captures = self.captures, "screen capture finished");
        self.sink.on_log("Screen capture finished.");
        self.transition(CaptureState::AwaitHeader);
        Ok(Duration::ZERO)
    }
}
