//! Fixed-width ASCII field decoding
//!
//! Every numeric value in a meter response is a run of ASCII digits with an
//! implied decimal point. These helpers turn such runs into numbers and
//! reject anything that is not a digit.

pub mod fixed_width;
pub mod meter_time;

pub use fixed_width::{decode_decimal, decode_integer, decode_power_factor};
pub use meter_time::{format_meter_time, parse_meter_time, METER_TIME_LENGTH};
