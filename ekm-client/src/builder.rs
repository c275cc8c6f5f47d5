//! Channel builder for the meter reader
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use ekm_client::ChannelBuilder;
//!
//! // Meter on a local RS-485 adapter
//! let _serial = ChannelBuilder::new().serial("/dev/ttyUSB0", 9600).connect()?;
//!
//! // Meter behind an iSerial bridge
//! let _tcp = ChannelBuilder::new().tcp("192.168.88.17").connect()?;
//! # Ok::<(), ekm_core::EkmError>(())
//! ```

use crate::config::TransportConfig;
use ekm_core::{EkmError, EkmResult};
use ekm_transport::{SerialSettings, SerialTransport, TcpSettings, TcpTransport, Transport};
use std::time::Duration;

/// Builder for the transport a reader polls through
///
/// # Configuration Flow
/// 1. Create builder with `ChannelBuilder::new()` or `from_config()`
/// 2. Pick the transport (TCP or Serial)
/// 3. Build it closed with `build()`, or opened with `connect()`
#[derive(Debug, Clone)]
pub struct ChannelBuilder {
    transport_type: TransportType,
    connect_timeout: Option<Duration>,
}

/// Transport type configuration
#[derive(Debug, Clone)]
enum TransportType {
    Tcp { address: String },
    Serial { port_name: String, baud_rate: u32 },
    None,
}

impl ChannelBuilder {
    /// Create a builder with no transport selected
    pub fn new() -> Self {
        Self {
            transport_type: TransportType::None,
            connect_timeout: None,
        }
    }

    /// Create a builder from the `[transport]` section of the configuration
    pub fn from_config(config: &TransportConfig) -> Self {
        match config {
            TransportConfig::Serial { port, baud_rate } => Self::new().serial(port, *baud_rate),
            TransportConfig::Tcp { address } => Self::new().tcp(address),
        }
    }

    /// Configure TCP transport
    ///
    /// `address` is "host:port", or a bare host for the bridge's default port.
    pub fn tcp(mut self, address: &str) -> Self {
        self.transport_type = TransportType::Tcp {
            address: address.to_string(),
        };
        self
    }

    /// Configure Serial transport with the meter's 7E1 line settings
    pub fn serial(mut self, port_name: &str, baud_rate: u32) -> Self {
        self.transport_type = TransportType::Serial {
            port_name: port_name.to_string(),
            baud_rate,
        };
        self
    }

    /// TCP connect timeout; ignored for serial ports
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the transport without opening it
    ///
    /// # Errors
    /// `InvalidData` if no transport was configured or the address is bad.
    pub fn build(self) -> EkmResult<Box<dyn Transport>> {
        match self.transport_type {
            TransportType::Tcp { address } => {
                let mut transport = TcpTransport::from_address(&address)?;
                if let Some(timeout) = self.connect_timeout {
                    transport = TcpTransport::new(TcpSettings::with_timeout(
                        transport.settings().address,
                        timeout,
                    ));
                }
                Ok(Box::new(transport))
            }
            TransportType::Serial {
                port_name,
                baud_rate,
            } => Ok(Box::new(SerialTransport::new(SerialSettings::new(
                port_name, baud_rate,
            )))),
            TransportType::None => Err(EkmError::InvalidData(
                "Transport type must be configured".to_string(),
            )),
        }
    }

    /// Build and open the transport
    pub fn connect(self) -> EkmResult<Box<dyn Transport>> {
        let mut transport = self.build()?;
        transport.open()?;
        Ok(transport)
    }
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
