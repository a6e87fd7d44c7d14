//! CRC-16/MODBUS.
//!
//! Reflected CRC-16 with initial value `0xFFFF` and polynomial `0xA001`,
//! processed least-significant bit first. The same computation covers
//! encoding (checksum over header and payload) and decoding (verification
//! against the two trailing wire bytes).

/// Initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Reflected feedback polynomial.
pub const CRC16_POLY: u16 = 0xA001;

/// Compute the CRC-16 of a byte span.
pub fn checksum(data: &[u8]) -> u16 {
    Crc16::new().update(data).finish()
}

/// Incremental CRC-16 over discontiguous spans.
///
/// ```
/// use framelink_frame::{checksum, Crc16};
///
/// let crc = Crc16::new().update(b"1234").update(b"56789").finish();
/// assert_eq!(crc, checksum(b"123456789"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    state: u16,
}

impl Crc16 {
    /// Start a new computation.
    pub const fn new() -> Self {
        Self { state: CRC16_INIT }
    }

    /// Feed more bytes.
    #[must_use]
    pub fn update(mut self, data: &[u8]) -> Self {
        for &byte in data {
            self.state ^= u16::from(byte);
            for _ in 0..8 {
                let lsb = self.state & 0x0001 != 0;
                self.state >>= 1;
                if lsb {
                    self.state ^= CRC16_POLY;
                }
            }
        }
        self
    }

    /// The checksum of everything fed so far.
    pub fn finish(self) -> u16 {
        self.state
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}
