//! Session layer for the EKM meter protocol
//!
//! This crate holds the protocol engine proper: the masked CRC-16, request
//! framing, response validation, the byte-offset layouts of the meter's
//! responses and the open / authenticate / set-clock / history exchanges.
//!
//! Everything here is blocking. One `MeterSession` drives one channel; run
//! one session per thread to talk to several meters at once.

pub mod checksum;
pub mod frame;
pub mod layout;
pub mod reader;
pub mod session;
pub mod state;
pub mod statistics;

pub use ekm_core::{EkmError, EkmResult};
pub use checksum::{checksum, ChecksumCalc};
pub use frame::{build_request, validate_response, Command, PeriodTableBlock, ACK, RESPONSE_LENGTH};
pub use reader::{read_exact_timeout, DEFAULT_READ_TIMEOUT};
pub use session::MeterSession;
pub use state::SessionState;
pub use statistics::SessionStatistics;
