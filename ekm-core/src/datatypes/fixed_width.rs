//! Fixed-width ASCII numeric fields

use crate::error::{EkmError, EkmResult};

/// Sign character marking a capacitive (leading) power factor
pub const CAPACITIVE: u8 = b'C';

fn check_digits(field: &[u8], kind: &'static str) -> EkmResult<()> {
    match field.iter().position(|b| !b.is_ascii_digit()) {
        Some(position) => Err(EkmError::MalformedField {
            field: kind,
            position,
            byte: field[position],
        }),
        None => Ok(()),
    }
}

/// Decode a run of ASCII digits with an implied decimal point
///
/// The point is inserted `decimal_offset` characters from the left, so
/// `b"12345678"` with offset 7 reads as `1234567.8`. An offset of 0 means
/// the field is a whole number.
///
/// # Errors
///
/// Returns `MalformedField` if any byte is not an ASCII digit and
/// `InvalidData` if the offset lies beyond the end of the field.
pub fn decode_decimal(field: &[u8], decimal_offset: usize) -> EkmResult<f64> {
    if field.is_empty() {
        return Err(EkmError::InvalidData("Empty numeric field".to_string()));
    }
    if decimal_offset > field.len() {
        return Err(EkmError::InvalidData(format!(
            "Decimal offset {} beyond field length {}",
            decimal_offset,
            field.len()
        )));
    }
    check_digits(field, "decimal")?;

    let mut text = String::with_capacity(field.len() + 1);
    for (i, &b) in field.iter().enumerate() {
        if decimal_offset > 0 && i == decimal_offset {
            text.push('.');
        }
        text.push(b as char);
    }

    text.parse::<f64>()
        .map_err(|e| EkmError::InvalidData(format!("Cannot parse {:?}: {}", text, e)))
}

/// Decode a run of ASCII digits as an unsigned integer
pub fn decode_integer(field: &[u8]) -> EkmResult<u64> {
    if field.is_empty() {
        return Err(EkmError::InvalidData("Empty numeric field".to_string()));
    }
    check_digits(field, "integer")?;

    field.iter().try_fold(0u64, |acc, &b| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| EkmError::InvalidData("Integer field overflows u64".to_string()))
    })
}

/// Decode a power factor field
///
/// The first byte carries the sign: `'C'` for capacitive, which reads as
/// negative, anything else (usually `'L'` or a space) for inductive. The
/// remaining bytes are digits with the decimal point `decimal_offset` places
/// in.
pub fn decode_power_factor(field: &[u8], decimal_offset: usize) -> EkmResult<f64> {
    let (&sign, digits) = field
        .split_first()
        .ok_or_else(|| EkmError::InvalidData("Empty power factor field".to_string()))?;

    let magnitude = decode_decimal(digits, decimal_offset).map_err(|e| match e {
        EkmError::MalformedField { position, byte, .. } => EkmError::MalformedField {
            field: "power factor",
            position: position + 1,
            byte,
        },
        other => other,
    })?;

    Ok(if sign == CAPACITIVE { -magnitude } else { magnitude })
}
