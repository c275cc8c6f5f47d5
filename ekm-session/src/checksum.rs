//! Masked CRC-16 used by the meter
//!
//! The table is the usual CRC-16/ARC one (reflected polynomial 0xA001).
//! What is peculiar to the meter is the tail: the accumulator is byte-swapped
//! and masked with 0x7F7F, because the link only carries 7 data bits per
//! byte. Keep the mask; the meter rejects anything else.

const INITIAL_CRC: u16 = 0xFFFF;
const KEY: u16 = 0xA001; // Bit-reversed 0x8005
const WIRE_MASK: u16 = 0x7F7F;

/// Precomputed CRC table
static CRC_TABLE: once_cell::sync::Lazy<[u16; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [0u16; 256];
    for b in 0..=0xFF {
        let mut v = b as u16;
        for _ in 0..8 {
            if (v & 1) == 1 {
                v = (v >> 1) ^ KEY;
            } else {
                v >>= 1;
            }
        }
        table[b as usize] = v;
    }
    table
});

/// Incremental checksum calculator
pub struct ChecksumCalc {
    crc: u16,
}

impl ChecksumCalc {
    /// Create a new calculator
    pub fn new() -> Self {
        Self { crc: INITIAL_CRC }
    }

    /// Reset to the initial state
    pub fn reset(&mut self) {
        self.crc = INITIAL_CRC;
    }

    /// Update with a single byte
    pub fn update(&mut self, data: u8) {
        self.crc = (self.crc >> 8) ^ CRC_TABLE[((self.crc ^ data as u16) & 0xFF) as usize];
    }

    /// Update with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Finished checksum: byte-swapped and masked to 7 bits per byte
    pub fn value(&self) -> u16 {
        self.crc.swap_bytes() & WIRE_MASK
    }

    /// Finished checksum as it appears on the wire (big-endian)
    pub fn value_bytes(&self) -> [u8; 2] {
        self.value().to_be_bytes()
    }
}

impl Default for ChecksumCalc {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of a complete byte range
pub fn checksum(data: &[u8]) -> u16 {
    let mut calc = ChecksumCalc::new();
    calc.update_bytes(data);
    calc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_arc() {
        assert_eq!(CRC_TABLE[0], 0x0000);
        assert_eq!(CRC_TABLE[1], 0xC0C1);
        assert_eq!(CRC_TABLE[2], 0xC181);
        assert_eq!(CRC_TABLE[128], 0xA001);
        assert_eq!(CRC_TABLE[255], 0x4040);
    }

    #[test]
    fn test_empty_range() {
        assert_eq!(checksum(&[]), 0x7F7F);
    }

    #[test]
    fn test_known_vectors() {
        // CRC-16/MODBUS of "123456789" is 0x4B37; swapped and masked.
        assert_eq!(checksum(b"123456789"), 0x374B);
        assert_eq!(checksum(b"R1\x020011\x03"), 0x2E15);
        assert_eq!(checksum(b"R1\x020012\x03"), 0x2E65);
        assert_eq!(checksum(b"P1\x02(00000000)\x03"), 0x3244);
    }

    #[test]
    fn test_mask_and_determinism() {
        let mut data = Vec::new();
        for i in 0..=255u8 {
            data.push(i);
            let crc = checksum(&data);
            assert_eq!(crc & !0x7F7F, 0);
            assert_eq!(crc, checksum(&data));
        }
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut calc = ChecksumCalc::new();
        calc.update_bytes(b"1234");
        calc.update_bytes(b"56789");
        assert_eq!(calc.value(), checksum(b"123456789"));
        assert_eq!(calc.value_bytes(), [0x37, 0x4B]);
        calc.reset();
        assert_eq!(calc.value(), 0x7F7F);
    }
}
