//! Channel trait for the transport layer

use ekm_core::{EkmError, EkmResult};
use std::time::Duration;

/// Blocking byte channel to a remote meter
///
/// The protocol engine borrows a channel for the length of an exchange and
/// never opens or closes it. Implementations must be usable from a worker
/// thread, hence the `Send` bound.
pub trait Channel: Send {
    /// Wait up to `timeout` for input and read what is available
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if nothing arrived within `timeout`.
    /// Transient not-ready conditions may also surface as
    /// `EkmError::Connection` with kind `WouldBlock` or `Interrupted`.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> EkmResult<usize>;

    /// Write data to the channel
    ///
    /// # Returns
    ///
    /// Number of bytes written
    fn write(&mut self, buf: &[u8]) -> EkmResult<usize>;

    /// Write all data to the channel
    fn write_all(&mut self, buf: &[u8]) -> EkmResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(EkmError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered output
    fn flush(&mut self) -> EkmResult<()>;

    /// Drop input that is already buffered, without waiting for more
    ///
    /// Used to clear partial frames left behind by an aborted exchange.
    fn discard_input(&mut self) -> EkmResult<()>;
}

/// Channel backed by a physical link that can be opened and closed
pub trait Transport: Channel {
    /// Open the physical connection
    fn open(&mut self) -> EkmResult<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Close the connection
    fn close(&mut self) -> EkmResult<()>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> EkmResult<usize> {
        (**self).read_timeout(buf, timeout)
    }

    fn write(&mut self, buf: &[u8]) -> EkmResult<usize> {
        (**self).write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> EkmResult<()> {
        (**self).write_all(buf)
    }

    fn flush(&mut self) -> EkmResult<()> {
        (**self).flush()
    }

    fn discard_input(&mut self) -> EkmResult<()> {
        (**self).discard_input()
    }
}

pub(crate) fn not_connected(what: &str) -> EkmError {
    EkmError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        format!("{} not connected", what),
    ))
}
