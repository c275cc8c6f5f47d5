//! TCP transport implementation
//!
//! Talks to a meter behind a serial-to-Ethernet bridge. The bridge does the
//! 7E1 line framing; this side only moves bytes.

use crate::stream::{not_connected, Channel, Transport};
use ekm_core::{EkmError, EkmResult};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Port the EKM iSerial bridge listens on
pub const DEFAULT_BRIDGE_PORT: u16 = 50000;

const DRAIN_CHUNK: usize = 64;

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub connect_timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Create TCP settings with timeout
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout: Some(timeout),
        }
    }
}

/// TCP transport layer implementation
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    settings: TcpSettings,
}

impl TcpTransport {
    /// Create a new TCP transport layer
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
        }
    }

    /// Create TCP transport from address string
    ///
    /// A bare host without a port gets the bridge's default port.
    pub fn from_address(address: &str) -> EkmResult<Self> {
        let addr: SocketAddr = match address.parse() {
            Ok(addr) => addr,
            Err(_) => format!("{}:{}", address, DEFAULT_BRIDGE_PORT)
                .parse()
                .map_err(|e| EkmError::InvalidData(format!("Invalid TCP address: {}", e)))?,
        };
        Ok(Self::new(TcpSettings::new(addr)))
    }

    /// Wrap an already-connected stream
    pub fn from_connected_stream(stream: TcpStream) -> EkmResult<Self> {
        let address = stream.peer_addr()?;
        Ok(Self {
            stream: Some(stream),
            settings: TcpSettings::new(address),
        })
    }

    /// Get the settings this transport was built with
    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    fn stream(&mut self) -> EkmResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| not_connected("TCP stream"))
    }

    fn drain(stream: &mut TcpStream) -> EkmResult<usize> {
        let mut chunk = [0u8; DRAIN_CHUNK];
        let mut dropped = 0;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(EkmError::Connection(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "Bridge closed the connection",
                    )));
                }
                Ok(n) => dropped += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(dropped),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(EkmError::Connection(e)),
            }
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> EkmResult<()> {
        if self.stream.is_some() {
            return Err(EkmError::Connection(std::io::Error::new(
                ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let stream = match self.settings.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&self.settings.address, timeout),
            None => TcpStream::connect(self.settings.address),
        }
        .map_err(EkmError::Connection)?;
        stream.set_nodelay(true)?;

        log::debug!("Connected to meter bridge at {}", self.settings.address);
        self.stream = Some(stream);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn close(&mut self) -> EkmResult<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }
}

impl Channel for TcpTransport {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> EkmResult<usize> {
        let stream = self.stream()?;
        // A zero timeout means "block forever" to the socket layer.
        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        match stream.read(buf) {
            Ok(0) => {
                self.stream = None;
                Err(EkmError::Connection(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "Bridge closed the connection",
                )))
            }
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(EkmError::Connection(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> EkmResult<usize> {
        self.stream()?.write(buf).map_err(EkmError::Connection)
    }

    fn flush(&mut self) -> EkmResult<()> {
        self.stream()?.flush().map_err(EkmError::Connection)
    }

    fn discard_input(&mut self) -> EkmResult<()> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let result = Self::drain(stream);
        stream.set_nonblocking(false)?;
        let dropped = result?;
        if dropped > 0 {
            log::debug!("Discarded {} stale bytes", dropped);
        }
        Ok(())
    }
}
