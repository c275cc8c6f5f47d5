//! ekm - Rust reader for EKM Omnimeter power meters
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `ekm-core`: Error type, meter ids, fixed-width decoders, reading model
//! - `ekm-transport`: Byte channels (Serial, TCP, in-memory)
//! - `ekm-session`: Checksum, framing and the meter session
//! - `ekm-client`: Configuration, polling cycle and report log
//!
//! # Implementation Status
//!
//! ## ✅ 已完成
//! - 校验和（CRC-16 掩码 0x7F7F）
//! - 定宽 ASCII 字段解码
//! - 打开 / 密码 / 校时 / 历史 / 节假日 / 时段表
//! - 串口与 TCP 传输
//! - 轮询守护进程
//!
//! # Usage
//!
//! ```no_run
//! use ekm::client::ChannelBuilder;
//! use ekm::session::MeterSession;
//! use ekm::MeterId;
//!
//! let mut channel = ChannelBuilder::new().serial("/dev/cuaU0", 9600).connect()?;
//! let mut session = MeterSession::new(channel.as_mut());
//! let snapshot = session.open(MeterId::new(13491)?)?;
//! println!("{:.1} kWh", snapshot.forward.total);
//! session.close()?;
//! # Ok::<(), ekm::EkmError>(())
//! ```

pub mod daemon;

// Re-export core types
pub use ekm_core::{EkmError, EkmResult, MeterId};
pub use ekm_core::reading::*;

// Re-export transport layer
pub mod transport {
    pub use ekm_transport::*;
}

// Re-export session layer
pub mod session {
    pub use ekm_session::*;
}

// Re-export client API
pub mod client {
    pub use ekm_client::*;
}
