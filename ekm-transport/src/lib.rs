//! Transport layer for the EKM meter protocol
//!
//! This crate provides the blocking byte channel the protocol engine talks
//! through, with Serial, TCP and in-memory implementations.

pub mod stream;
pub mod serial;
pub mod tcp;
pub mod memory;

pub use ekm_core::{EkmError, EkmResult};
pub use stream::{Channel, Transport};
pub use serial::{SerialSettings, SerialTransport};
pub use tcp::{TcpSettings, TcpTransport, DEFAULT_BRIDGE_PORT};
pub use memory::MemoryChannel;
