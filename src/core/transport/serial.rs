//! Serial port transport implementation

use super::{PortIo, PortOpener, PortSettings, TransportError};
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    None,
    /// Hardware flow control (RTS/CTS)
    #[default]
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

impl From<SerialFlowControl> for FlowControl {
    fn from(flow: SerialFlowControl) -> Self {
        match flow {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        }
    }
}

/// Opens real serial devices through `serialport`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&mut self, name: &str, settings: &PortSettings) -> Result<Box<dyn PortIo>, TransportError> {
        let port = serialport::new(name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(settings.flow_control.into())
            .timeout(settings.read_timeout())
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(name.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(name.to_string())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(name.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        tracing::info!(
            port = name,
            baud = settings.baud_rate,
            flow = ?settings.flow_control,
            "serial port opened (8N1)"
        );

        Ok(Box::new(SystemPort { port }))
    }
}

struct SystemPort {
    port: Box<dyn SerialPort>,
}

impl PortIo for SystemPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| TransportError::IoError(e.into()))
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::IoError(e.into()))
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}
