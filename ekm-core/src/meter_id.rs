use crate::error::{EkmError, EkmResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest serial number that fits the 12-digit address field
pub const MAX_METER_ID: u64 = 999_999_999_999;

/// Number of digits a meter address occupies on the wire
pub const METER_ID_DIGITS: usize = 12;

/// Meter serial number
///
/// Omnimeters are addressed by the serial number printed on the case. On
/// the wire it is always rendered as 12 zero-padded decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct MeterId(u64);

impl MeterId {
    /// Create a meter id, rejecting values wider than 12 digits
    pub fn new(serial: u64) -> EkmResult<Self> {
        if serial > MAX_METER_ID {
            return Err(EkmError::InvalidData(format!(
                "Meter id {} exceeds {} digits",
                serial, METER_ID_DIGITS
            )));
        }
        Ok(Self(serial))
    }

    /// Get the numeric serial number
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The 12 ASCII digits sent in the open command
    pub fn to_wire(&self) -> String {
        format!("{:012}", self.0)
    }
}

impl TryFrom<u64> for MeterId {
    type Error = EkmError;

    fn try_from(value: u64) -> EkmResult<Self> {
        Self::new(value)
    }
}

impl From<MeterId> for u64 {
    fn from(id: MeterId) -> u64 {
        id.0
    }
}

impl FromStr for MeterId {
    type Err = EkmError;

    fn from_str(s: &str) -> EkmResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EkmError::InvalidData(format!("Invalid meter id: {}", s)));
        }
        let value = trimmed
            .parse::<u64>()
            .map_err(|_| EkmError::InvalidData(format!("Invalid meter id: {}", s)))?;
        Self::new(value)
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_id_wire_format() {
        let id = MeterId::new(13491).unwrap();
        assert_eq!(id.to_wire(), "000000013491");
        assert_eq!(id.to_string(), "13491");
    }

    #[test]
    fn test_meter_id_range() {
        assert!(MeterId::new(MAX_METER_ID).is_ok());
        assert!(MeterId::new(MAX_METER_ID + 1).is_err());
    }

    #[test]
    fn test_meter_id_from_str() {
        assert_eq!("000000013491".parse::<MeterId>().unwrap().value(), 13491);
        assert!("12a4".parse::<MeterId>().is_err());
        assert!("".parse::<MeterId>().is_err());
    }
}
