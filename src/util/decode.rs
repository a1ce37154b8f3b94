//! Little-endian field decoders for SMART pages.
//!
//! All functions are total over their fixed-size inputs.

/// A 128-bit NVMe counter split into its two 64-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counter128 {
    pub low:  u64,
    pub high: u64,
}

impl Counter128 {
    /// True when the counter does not fit in 64 bits.
    pub fn overflows(&self) -> bool {
        self.high != 0
    }

    /// The value if it fits in 64 bits, `None` on overflow.
    pub fn value(&self) -> Option<u64> {
        if self.overflows() { None } else { Some(self.low) }
    }

    /// The value clamped to `u64::MAX` on overflow.
    pub fn saturating(&self) -> u64 {
        self.value().unwrap_or(u64::MAX)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.low.to_le_bytes());
        out[8..].copy_from_slice(&self.high.to_le_bytes());
        out
    }
}

impl From<u64> for Counter128 {
    fn from(low: u64) -> Self {
        Counter128 { low, high: 0 }
    }
}

pub fn decode_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

pub fn decode_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Split a 16-byte little-endian counter into (low, high) words.
pub fn decode_u64_le_128(bytes: [u8; 16]) -> Counter128 {
    let mut low  = [0u8; 8];
    let mut high = [0u8; 8];
    low.copy_from_slice(&bytes[..8]);
    high.copy_from_slice(&bytes[8..]);
    Counter128 { low: u64::from_le_bytes(low), high: u64::from_le_bytes(high) }
}

/// Accumulate the 6-byte ATA raw field.
pub fn decode_ata_raw6(bytes: [u8; 6]) -> u64 {
    bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Inverse of [`decode_ata_raw6`]; bits above 48 are dropped.
pub fn encode_ata_raw6(value: u64) -> [u8; 6] {
    let le = value.to_le_bytes();
    [le[0], le[1], le[2], le[3], le[4], le[5]]
}

/// Copy `N` bytes starting at `offset`. Caller guarantees the range is in bounds.
pub(crate) fn array_at<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}
