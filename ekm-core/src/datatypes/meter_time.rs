//! Meter clock encoding
//!
//! The meter reports and accepts its clock as 14 ASCII digits laid out as
//! `yy mm dd ww HH MM SS`, where `ww` is the day of week (01 = Sunday).
//! The weekday is redundant, so it is checked for digits and then ignored
//! when parsing.

use crate::datatypes::fixed_width::decode_integer;
use crate::error::{EkmError, EkmResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Length of an encoded meter timestamp
pub const METER_TIME_LENGTH: usize = 14;

const CENTURY: i32 = 2000;

fn pair(field: &[u8], at: usize) -> EkmResult<u32> {
    let value = decode_integer(&field[at..at + 2]).map_err(|e| match e {
        EkmError::MalformedField { position, byte, .. } => EkmError::MalformedField {
            field: "meter time",
            position: at + position,
            byte,
        },
        other => other,
    })?;
    // Two digits never exceed 99.
    Ok(value as u32)
}

/// Parse a 14-byte meter timestamp
///
/// The result is a naive local time; the meter has no notion of zones.
pub fn parse_meter_time(field: &[u8]) -> EkmResult<NaiveDateTime> {
    if field.len() != METER_TIME_LENGTH {
        return Err(EkmError::InvalidData(format!(
            "Meter time must be {} bytes, got {}",
            METER_TIME_LENGTH,
            field.len()
        )));
    }

    let year = pair(field, 0)?;
    let month = pair(field, 2)?;
    let day = pair(field, 4)?;
    let _weekday = pair(field, 6)?;
    let hour = pair(field, 8)?;
    let minute = pair(field, 10)?;
    let second = pair(field, 12)?;

    NaiveDate::from_ymd_opt(CENTURY + year as i32, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            EkmError::InvalidData(format!(
                "Meter time out of range: {}",
                String::from_utf8_lossy(field)
            ))
        })
}

/// Render a local time in the meter's 14-digit clock layout
pub fn format_meter_time(time: &NaiveDateTime) -> String {
    format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}{:02}",
        time.year() - CENTURY,
        time.month(),
        time.day(),
        time.weekday().num_days_from_sunday() + 1,
        time.hour(),
        time.minute(),
        time.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meter_time() {
        // 2021-03-14 was a Sunday.
        let time = parse_meter_time(b"21031401153007").unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 3, 14)
            .unwrap()
            .and_hms_opt(15, 30, 7)
            .unwrap();
        assert_eq!(time, expected);
    }

    #[test]
    fn test_weekday_placeholder_ignored() {
        let a = parse_meter_time(b"21031400153007").unwrap();
        let b = parse_meter_time(b"21031405153007").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_rejects_bad_fields() {
        match parse_meter_time(b"2103140115x007") {
            Err(EkmError::MalformedField { position, .. }) => assert_eq!(position, 10),
            other => panic!("expected MalformedField, got {:?}", other),
        }
        assert!(matches!(parse_meter_time(b"21133101153007"), Err(EkmError::InvalidData(_))));
        assert!(parse_meter_time(b"2103140115300").is_err());
    }

    #[test]
    fn test_format_round_trip() {
        let time = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        // 2024-02-29 was a Thursday: weekday 05.
        assert_eq!(format_meter_time(&time), "24022905235958");
        assert_eq!(parse_meter_time(format_meter_time(&time).as_bytes()).unwrap(), time);
    }
}
