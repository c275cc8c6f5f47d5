//! Byte layouts of the meter's block responses
//!
//! Responses are fixed 255-byte frames of ASCII fields. Each field is
//! described by its offset, width and implied decimal position, and decoded
//! straight out of the validated frame.

use crate::frame::RESPONSE_LENGTH;
use ekm_core::datatypes::{decode_decimal, decode_integer, decode_power_factor, parse_meter_time};
use ekm_core::reading::{Holiday, HISTORY_MONTHS, HOLIDAY_SLOTS, PHASES, TOU_PERIODS};
use ekm_core::{EkmError, EkmResult, HolidayTable, MeterId, MeterSnapshot, PhaseReading, TouTotals};

/// One fixed-width field in a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub length: usize,
    /// Position of the implied decimal point, 0 for none
    pub decimal: usize,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, length: usize, decimal: usize) -> Self {
        Self {
            name,
            offset,
            length,
            decimal,
        }
    }

    /// The `index`-th field of a run of identical fields
    pub const fn nth(&self, index: usize) -> Self {
        Self::new(self.name, self.offset + index * self.length, self.length, self.decimal)
    }

    /// The same field shifted by `base` bytes
    pub const fn shifted(&self, base: usize) -> Self {
        Self::new(self.name, self.offset + base, self.length, self.decimal)
    }

    /// Raw bytes of the field
    pub fn bytes<'a>(&self, frame: &'a [u8]) -> EkmResult<&'a [u8]> {
        frame
            .get(self.offset..self.offset + self.length)
            .ok_or_else(|| EkmError::InvalidData(format!("Field {} outside frame", self.name)))
    }

    pub fn decimal(&self, frame: &[u8]) -> EkmResult<f64> {
        decode_decimal(self.bytes(frame)?, self.decimal).map_err(|e| e.in_field(self.name))
    }

    pub fn integer(&self, frame: &[u8]) -> EkmResult<u64> {
        decode_integer(self.bytes(frame)?).map_err(|e| e.in_field(self.name))
    }

    /// Sign byte followed by digits; the decimal position counts from the first digit
    pub fn power_factor(&self, frame: &[u8]) -> EkmResult<f64> {
        decode_power_factor(self.bytes(frame)?, self.decimal).map_err(|e| e.in_field(self.name))
    }

    pub fn byte(&self, frame: &[u8]) -> EkmResult<u8> {
        Ok(self.bytes(frame)?[0])
    }
}

/// Width of one energy register: 8 digits, tenths of a kWh
const ENERGY: Field = Field::new("energy", 0, 8, 7);

/// Width of a total plus its four time-of-use registers
pub const TOU_BLOCK_LENGTH: usize = ENERGY.length * (TOU_PERIODS + 1);

/// Open response
pub mod open {
    use super::Field;

    pub const MODEL: Field = Field::new("model", 1, 2, 0);
    pub const FIRMWARE: Field = Field::new("firmware", 3, 1, 0);
    pub const ADDRESS: Field = Field::new("address", 4, 12, 0);
    pub const FORWARD: usize = 16;
    pub const REVERSE: usize = 56;
    pub const VOLTS: Field = Field::new("volts", 96, 4, 3);
    pub const AMPS: Field = Field::new("amps", 108, 5, 4);
    pub const POWER: Field = Field::new("power", 123, 7, 0);
    pub const TOTAL_POWER: Field = Field::new("total power", 144, 7, 0);
    pub const POWER_FACTOR: Field = Field::new("power factor", 151, 4, 1);
    pub const MAX_DEMAND: Field = Field::new("max demand", 163, 7, 0);
    pub const DEMAND_PERIOD: Field = Field::new("demand period", 171, 1, 0);
    pub const DATE: Field = Field::new("meter time", 172, 14, 0);
    pub const CT_SIZE: Field = Field::new("CT size", 186, 4, 0);
    pub const PULSE_COUNT: Field = Field::new("pulse count", 190, 8, 0);
    pub const PULSE_RATIO: Field = Field::new("pulse ratio", 214, 4, 0);
    pub const PULSE_TRIGGER: Field = Field::new("pulse trigger", 229, 1, 0);
}

/// History (registers 0011 / 0012) response
pub mod history {
    pub const MONTHS: usize = 6;
}

/// Holiday (register 00B0) response
pub mod holidays {
    use super::Field;

    pub const DATE: Field = Field::new("holiday", 6, 4, 0);
    pub const WEEKEND_SCHEDULE: Field = Field::new("weekend schedule", 86, 2, 0);
    pub const HOLIDAY_SCHEDULE: Field = Field::new("holiday schedule", 88, 2, 0);
}

fn check_length(frame: &[u8]) -> EkmResult<()> {
    if frame.len() != RESPONSE_LENGTH {
        return Err(EkmError::ShortRead {
            expected: RESPONSE_LENGTH,
            received: frame.len(),
        });
    }
    Ok(())
}

/// Decode a total and its four TOU registers starting at `base`
pub fn decode_tou_block(frame: &[u8], base: usize) -> EkmResult<TouTotals> {
    let block = ENERGY.shifted(base);
    let mut tou = [0.0; TOU_PERIODS];
    for (i, value) in tou.iter_mut().enumerate() {
        *value = block.nth(i + 1).decimal(frame)?;
    }
    Ok(TouTotals {
        total: block.decimal(frame)?,
        tou,
    })
}

/// Decode a validated open response into a snapshot
///
/// Forward totals come back net of the reverse totals.
pub fn decode_snapshot(frame: &[u8]) -> EkmResult<MeterSnapshot> {
    check_length(frame)?;

    let model_bytes = open::MODEL.bytes(frame)?;
    let forward = decode_tou_block(frame, open::FORWARD)?;
    let reverse = decode_tou_block(frame, open::REVERSE)?;

    let mut phases = [PhaseReading::default(); PHASES];
    for (i, phase) in phases.iter_mut().enumerate() {
        *phase = PhaseReading {
            volts: open::VOLTS.nth(i).decimal(frame)?,
            amps: open::AMPS.nth(i).decimal(frame)?,
            power: open::POWER.nth(i).integer(frame)?,
            power_factor: open::POWER_FACTOR.nth(i).power_factor(frame)?,
            pulse_count: open::PULSE_COUNT.nth(i).integer(frame)?,
            pulse_ratio: open::PULSE_RATIO.nth(i).integer(frame)?,
            pulse_trigger: open::PULSE_TRIGGER.nth(i).byte(frame)?,
        };
    }

    Ok(MeterSnapshot {
        address: MeterId::new(open::ADDRESS.integer(frame)?)?,
        model: [model_bytes[0], model_bytes[1]],
        firmware: open::FIRMWARE.byte(frame)?,
        forward: forward.net_of(&reverse),
        reverse,
        phases,
        total_power: open::TOTAL_POWER.integer(frame)?,
        ct_size: open::CT_SIZE.integer(frame)?,
        max_demand: open::MAX_DEMAND.integer(frame)?,
        demand_period: open::DEMAND_PERIOD.byte(frame)?,
        meter_time: parse_meter_time(open::DATE.bytes(frame)?)
            .map_err(|e| e.in_field(open::DATE.name))?,
    })
}

/// Decode the six monthly blocks of a validated history response
pub fn decode_history_table(frame: &[u8]) -> EkmResult<[TouTotals; HISTORY_MONTHS]> {
    check_length(frame)?;

    let mut months = [TouTotals::default(); HISTORY_MONTHS];
    for (m, month) in months.iter_mut().enumerate() {
        *month = decode_tou_block(frame, 6 + m * TOU_BLOCK_LENGTH)?;
    }
    Ok(months)
}

/// Decode a validated holiday response
pub fn decode_holidays(frame: &[u8]) -> EkmResult<HolidayTable> {
    check_length(frame)?;

    let mut slots = [None; HOLIDAY_SLOTS];
    for (i, slot) in slots.iter_mut().enumerate() {
        let field = holidays::DATE.nth(i);
        let raw = field.bytes(frame)?;
        let month = Field::new(field.name, field.offset, 2, 0).integer(frame)?;
        let day = Field::new(field.name, field.offset + 2, 2, 0).integer(frame)?;
        *slot = match (month, day) {
            (0, _) | (_, 0) => None,
            (1..=12, 1..=31) => Some(Holiday {
                month: month as u8,
                day: day as u8,
            }),
            _ => {
                return Err(EkmError::InvalidData(format!(
                    "Holiday {} out of range: {}",
                    i + 1,
                    String::from_utf8_lossy(raw)
                )));
            }
        };
    }

    Ok(HolidayTable {
        holidays: slots,
        weekend_schedule: holidays::WEEKEND_SCHEDULE.integer(frame)? as u8,
        holiday_schedule: holidays::HOLIDAY_SCHEDULE.integer(frame)? as u8,
    })
}
