//! Core types and utilities for the EKM Omnimeter protocol
//!
//! This crate provides the error type, meter identifiers, the fixed-width
//! ASCII field decoders and the decoded reading model shared by the rest
//! of the workspace.

pub mod error;
pub mod meter_id;
pub mod datatypes;
pub mod reading;

pub use error::{EkmError, EkmResult};
pub use meter_id::MeterId;
pub use datatypes::{decode_decimal, decode_integer, decode_power_factor, parse_meter_time};
pub use reading::{Holiday, HolidayTable, MeterHistory, MeterSnapshot, PhaseReading, TouTotals};
