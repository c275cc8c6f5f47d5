//! Polling client for EKM Omnimeters
//!
//! This crate turns the protocol engine into a meter reader: it loads the
//! reader configuration, builds the channel, runs one polling cycle per
//! meter and appends the text report.
//!
//! # TODO
//!
//! ## 轮询
//! - [x] 通道构建器（Serial / TCP）
//! - [x] 时钟偏差校正
//! - [x] 历史数据触发文件
//! - [x] 文本报告
//! - [ ] 节假日和时段表写入

pub mod builder;
pub mod config;
pub mod poller;
pub mod report;

pub use builder::ChannelBuilder;
pub use config::{MeterConfig, ReaderConfig, TransportConfig};
pub use poller::{CycleReport, Poller};
pub use report::{format_record, ReportWriter};
