//! Serial port transport implementation

use crate::stream::{not_connected, Channel, Transport};
use ekm_core::{EkmError, EkmResult};
use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;
use tokio_serial::{ClearBuffer, SerialPort};

/// Line speed the Omnimeter ships with
pub const OMNIMETER_BAUD_RATE: u32 = 9600;

/// Wrapper for the boxed port that implements Debug
struct DebugSerialPort(Box<dyn SerialPort>);

impl fmt::Debug for DebugSerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("name", &self.0.name())
            .finish()
    }
}

/// Serial port transport layer settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// Settings for an Omnimeter: 7 data bits, even parity, 1 stop bit
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Seven,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::Even,
            flow_control: tokio_serial::FlowControl::None,
        }
    }

    /// Omnimeter settings at the factory baud rate
    pub fn omnimeter(port_name: String) -> Self {
        Self::new(port_name, OMNIMETER_BAUD_RATE)
    }
}

/// Serial port transport layer implementation
///
/// The port is driven through the blocking half of `tokio-serial`; the
/// protocol engine is synchronous and runs on a worker thread.
#[derive(Debug)]
pub struct SerialTransport {
    port: Option<DebugSerialPort>,
    settings: SerialSettings,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            port: None,
            settings,
        }
    }

    /// Create serial transport with port name and baud rate
    pub fn new_simple(port_name: String, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    /// Get the settings this transport was built with
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn port(&mut self) -> EkmResult<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .map(|p| &mut p.0)
            .ok_or_else(|| not_connected("Serial port"))
    }
}

fn serial_error(context: &str, e: tokio_serial::Error) -> EkmError {
    EkmError::Connection(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{}: {}", context, e),
    ))
}

impl Transport for SerialTransport {
    fn open(&mut self) -> EkmResult<()> {
        if self.port.is_some() {
            return Err(EkmError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let port = tokio_serial::new(self.settings.port_name.as_str(), self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control)
            .open()
            .map_err(|e| serial_error("Failed to open serial port", e))?;

        log::debug!(
            "Opened serial port {} at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.port = Some(DebugSerialPort(port));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    fn close(&mut self) -> EkmResult<()> {
        if let Some(mut port) = self.port.take() {
            let _ = port.0.flush();
        }
        Ok(())
    }
}

impl Channel for SerialTransport {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> EkmResult<usize> {
        let port = self.port()?;
        port.set_timeout(timeout)
            .map_err(|e| serial_error("Failed to set read timeout", e))?;

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(EkmError::Connection(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> EkmResult<usize> {
        self.port()?.write(buf).map_err(EkmError::Connection)
    }

    fn flush(&mut self) -> EkmResult<()> {
        self.port()?.flush().map_err(EkmError::Connection)
    }

    fn discard_input(&mut self) -> EkmResult<()> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(|e| serial_error("Failed to clear input buffer", e))
    }
}
