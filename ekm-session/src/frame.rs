//! Request framing and response validation

use crate::checksum::{checksum, ChecksumCalc};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDateTime;
use ekm_core::datatypes::format_meter_time;
use ekm_core::{EkmError, EkmResult, MeterId};
use std::fmt;

/// Start of header
pub const SOH: u8 = 0x01;
/// Start of text
pub const STX: u8 = 0x02;
/// End of text
pub const ETX: u8 = 0x03;
/// Positive acknowledgement
pub const ACK: u8 = 0x06;
/// Negative acknowledgement
pub const NAK: u8 = 0x15;

/// Length of every block response (open, history, holidays, period tables)
pub const RESPONSE_LENGTH: usize = 255;

/// Length of the trailing checksum
pub const CHECKSUM_LENGTH: usize = 2;

/// Close is sent verbatim; its trailer byte is fixed by the firmware
pub const CLOSE_FRAME: &[u8] = b"\x01B0\x03\x75";

/// Longest password the meter accepts
pub const MAX_PASSWORD_LENGTH: usize = 8;

/// Which half of the tariff period tables to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodTableBlock {
    First,
    Second,
}

impl PeriodTableBlock {
    fn register(&self) -> &'static [u8; 4] {
        match self {
            PeriodTableBlock::First => b"0070",
            PeriodTableBlock::Second => b"0071",
        }
    }
}

/// A command the meter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/?<12-digit id>!\r\n`
    Open(MeterId),
    /// Fixed close frame
    Close,
    /// `P1` with the password in parentheses
    Password(&'a str),
    /// `W1` register 0060 with the 14-digit clock
    SetTime(NaiveDateTime),
    /// `R1` register 0011
    HistoryForward,
    /// `R1` register 0012
    HistoryReverse,
    /// `R1` register 0070 / 0071
    PeriodTable(PeriodTableBlock),
    /// `R1` register 00B0
    Holidays,
}

impl Command<'_> {
    /// Whether the frame carries a trailing checksum
    pub fn is_checksummed(&self) -> bool {
        !matches!(self, Command::Open(_) | Command::Close)
    }

    fn read_register(register: &[u8], buf: &mut BytesMut) {
        buf.put_u8(SOH);
        buf.put_slice(b"R1");
        buf.put_u8(STX);
        buf.put_slice(register);
        buf.put_u8(ETX);
    }

    fn encode_body(&self, buf: &mut BytesMut) -> EkmResult<()> {
        match self {
            Command::Open(id) => {
                buf.put_slice(b"/?");
                buf.put_slice(id.to_wire().as_bytes());
                buf.put_slice(b"!\r\n");
            }
            Command::Close => buf.put_slice(CLOSE_FRAME),
            Command::Password(password) => {
                validate_password(password)?;
                buf.put_u8(SOH);
                buf.put_slice(b"P1");
                buf.put_u8(STX);
                buf.put_u8(b'(');
                buf.put_slice(password.as_bytes());
                buf.put_u8(b')');
                buf.put_u8(ETX);
            }
            Command::SetTime(time) => {
                buf.put_u8(SOH);
                buf.put_slice(b"W1");
                buf.put_u8(STX);
                buf.put_slice(b"0060(");
                buf.put_slice(format_meter_time(time).as_bytes());
                buf.put_u8(b')');
                buf.put_u8(ETX);
            }
            Command::HistoryForward => Self::read_register(b"0011", buf),
            Command::HistoryReverse => Self::read_register(b"0012", buf),
            Command::PeriodTable(block) => Self::read_register(block.register(), buf),
            Command::Holidays => Self::read_register(b"00B0", buf),
        }
        Ok(())
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Open(id) => write!(f, "open meter {}", id),
            Command::Close => write!(f, "close"),
            Command::Password(_) => write!(f, "password"),
            Command::SetTime(time) => write!(f, "set time {}", time),
            Command::HistoryForward => write!(f, "read forward history"),
            Command::HistoryReverse => write!(f, "read reverse history"),
            Command::PeriodTable(block) => write!(f, "read period table {:?}", block),
            Command::Holidays => write!(f, "read holidays"),
        }
    }
}

/// Check that `password` can be sent in a password command
pub fn validate_password(password: &str) -> EkmResult<()> {
    if password.is_empty() || password.len() > MAX_PASSWORD_LENGTH {
        return Err(EkmError::InvalidData(format!(
            "Password must be 1 to {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    if !password
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b'(' && b != b')')
    {
        return Err(EkmError::InvalidData(
            "Password must be printable ASCII without parentheses".to_string(),
        ));
    }
    Ok(())
}

/// Build the bytes for `command`
///
/// Checksummed commands get the CRC of everything after the leading start
/// byte appended as two big-endian bytes.
pub fn build_request(command: &Command<'_>) -> EkmResult<Bytes> {
    let mut buf = BytesMut::with_capacity(32);
    command.encode_body(&mut buf)?;

    if command.is_checksummed() {
        let mut calc = ChecksumCalc::new();
        calc.update_bytes(&buf[1..]);
        buf.put_u16(calc.value());
    }

    Ok(buf.freeze())
}

/// Checksum carried in the last two bytes of a frame
pub fn trailing_checksum(frame: &[u8]) -> Option<u16> {
    let at = frame.len().checked_sub(CHECKSUM_LENGTH)?;
    Some(u16::from_be_bytes([frame[at], frame[at + 1]]))
}

/// Check a response frame's length and checksum
///
/// # Errors
///
/// `ShortRead` if the frame is not `expected_length` bytes long,
/// `ChecksumMismatch` if the trailing checksum does not cover
/// `frame[1..len - 2]`.
pub fn validate_response(frame: &[u8], expected_length: usize) -> EkmResult<()> {
    if frame.len() != expected_length || expected_length < CHECKSUM_LENGTH + 1 {
        return Err(EkmError::ShortRead {
            expected: expected_length,
            received: frame.len(),
        });
    }

    let body_end = frame.len() - CHECKSUM_LENGTH;
    let computed = checksum(&frame[1..body_end]);
    let received = u16::from_be_bytes([frame[body_end], frame[body_end + 1]]);
    if computed != received {
        return Err(EkmError::ChecksumMismatch { computed, received });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn assert_trailer_covers_body(frame: &[u8]) {
        let end = frame.len() - CHECKSUM_LENGTH;
        assert_eq!(trailing_checksum(frame), Some(checksum(&frame[1..end])));
    }

    #[test]
    fn test_open_and_close_are_verbatim() {
        let id = MeterId::new(13491).unwrap();
        let open = build_request(&Command::Open(id)).unwrap();
        assert_eq!(&open[..], b"/?000000013491!\r\n");

        let close = build_request(&Command::Close).unwrap();
        assert_eq!(&close[..], CLOSE_FRAME);
    }

    #[test]
    fn test_history_requests() {
        let forward = build_request(&Command::HistoryForward).unwrap();
        assert_eq!(&forward[..], b"\x01R1\x020011\x03\x2E\x15");
        let reverse = build_request(&Command::HistoryReverse).unwrap();
        assert_eq!(&reverse[..], b"\x01R1\x020012\x03\x2E\x65");
    }

    #[test]
    fn test_password_request() {
        let frame = build_request(&Command::Password("00000000")).unwrap();
        assert_eq!(&frame[..frame.len() - 2], b"\x01P1\x02(00000000)\x03");
        assert_eq!(trailing_checksum(&frame), Some(0x3244));
    }

    #[test]
    fn test_password_validation() {
        assert!(build_request(&Command::Password("")).is_err());
        assert!(build_request(&Command::Password("123456789")).is_err());
        assert!(build_request(&Command::Password("12)4")).is_err());
        assert!(build_request(&Command::Password("1234")).is_ok());
    }

    #[test]
    fn test_set_time_request() {
        let time = NaiveDate::from_ymd_opt(2021, 3, 14)
            .unwrap()
            .and_hms_opt(15, 30, 7)
            .unwrap();
        let frame = build_request(&Command::SetTime(time)).unwrap();
        assert_eq!(&frame[..frame.len() - 2], b"\x01W1\x020060(21031401153007)\x03");
        assert_trailer_covers_body(&frame);
    }

    #[test]
    fn test_every_checksummed_request_round_trips() {
        let commands = [
            Command::Password("1234"),
            Command::HistoryForward,
            Command::HistoryReverse,
            Command::PeriodTable(PeriodTableBlock::First),
            Command::PeriodTable(PeriodTableBlock::Second),
            Command::Holidays,
        ];
        for command in commands {
            let frame = build_request(&command).unwrap();
            assert!(command.is_checksummed());
            assert_trailer_covers_body(&frame);
        }
    }

    #[test]
    fn test_validate_response() {
        let mut frame = vec![0x02u8; RESPONSE_LENGTH];
        let crc = checksum(&frame[1..RESPONSE_LENGTH - 2]);
        frame[RESPONSE_LENGTH - 2..].copy_from_slice(&crc.to_be_bytes());
        assert!(validate_response(&frame, RESPONSE_LENGTH).is_ok());

        // The start byte is outside the checksum.
        frame[0] = 0xFF;
        assert!(validate_response(&frame, RESPONSE_LENGTH).is_ok());

        frame[100] ^= 0x01;
        assert!(matches!(
            validate_response(&frame, RESPONSE_LENGTH),
            Err(EkmError::ChecksumMismatch { .. })
        ));

        assert!(matches!(
            validate_response(&frame[..200], RESPONSE_LENGTH),
            Err(EkmError::ShortRead { expected: 255, received: 200 })
        ));
    }
}
