//! Sequential reader over an in-memory byte buffer
//!
//! The dataset formats mix byte orders: TrackVis files are little-endian while
//! FreeSurfer surface and curvature files are big-endian ("swapped"). The
//! cursor exposes both flavours explicitly rather than carrying an order flag.
//!
//! Floats are rebuilt from their sign, exponent and mantissa bits instead of
//! being transmuted, matching how the formats were historically read. The
//! reconstruction only handles normalized values and the all-zero pattern;
//! infinities, NaNs and subnormals are outside what these files contain.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::FormatError;
use crate::Result;

/// Rebuild an IEEE-754 single precision value from its raw bits.
pub fn reconstruct_f32(bits: u32) -> f32 {
    let sign = if bits >> 31 == 1 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 23) & 0xff) as i32 - 127;
    let mantissa = bits & 0x007f_ffff;

    if mantissa == 0 && exponent == -127 {
        return 0.0;
    }

    let significand = 1.0 + mantissa as f64 * 2f64.powi(-23);
    (sign * significand * 2f64.powi(exponent)) as f32
}

/// Bounds-checked cursor over a borrowed byte buffer
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a cursor positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            position: offset,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check that `needed` bytes are available without consuming them
    pub fn ensure(&self, needed: usize) -> Result<()> {
        match self.position.checked_add(needed) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(FormatError::UnexpectedEof {
                offset: self.position,
                needed,
                len: self.data.len(),
            }),
        }
    }

    /// Consume `count` bytes and return them
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure(count)?;
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Read `length` raw bytes as a fixed-width string, one char per byte.
    ///
    /// Nothing is trimmed: embedded and trailing NUL bytes are kept.
    pub fn read_fixed_string(&mut self, length: usize) -> Result<String> {
        Ok(self.take(length)?.iter().map(|&b| b as char).collect())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        let value = self.read_u8()?;
        Ok(if value > 127 {
            (value as i16 - 256) as i8
        } else {
            value as i8
        })
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// 24-bit big-endian integer, as used by FreeSurfer magic numbers
    pub fn read_u24_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.take(3)?) & 0x00ff_ffff)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_f32_le(&mut self) -> Result<f32> {
        Ok(reconstruct_f32(LittleEndian::read_u32(self.take(4)?)))
    }

    pub fn read_f32_be(&mut self) -> Result<f32> {
        Ok(reconstruct_f32(BigEndian::read_u32(self.take(4)?)))
    }

    pub fn read_u16_le_array(&mut self, count: usize) -> Result<Vec<u16>> {
        self.ensure(count.saturating_mul(2))?;
        (0..count).map(|_| self.read_u16_le()).collect()
    }

    pub fn read_f32_le_array(&mut self, count: usize) -> Result<Vec<f32>> {
        self.ensure(count.saturating_mul(4))?;
        (0..count).map(|_| self.read_f32_le()).collect()
    }

    pub fn read_f32_be_array(&mut self, count: usize) -> Result<Vec<f32>> {
        self.ensure(count.saturating_mul(4))?;
        (0..count).map(|_| self.read_f32_be()).collect()
    }

    pub fn read_u32_be_array(&mut self, count: usize) -> Result<Vec<u32>> {
        self.ensure(count.saturating_mul(4))?;
        (0..count).map(|_| self.read_u32_be()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruct_matches_ieee_for_normalized_values() {
        let samples = [
            1.0f32,
            -1.0,
            0.5,
            3.25,
            -123.456,
            1.0e-30,
            -7.5e20,
            f32::MAX,
            f32::MIN_POSITIVE,
            std::f32::consts::PI,
        ];

        for value in samples {
            let rebuilt = reconstruct_f32(value.to_bits());
            assert_eq!(rebuilt, value, "bits {:#010x}", value.to_bits());
        }
    }

    #[test]
    fn test_reconstruct_zero_pattern() {
        assert_eq!(reconstruct_f32(0), 0.0);
        // Negative zero shares the zero exponent and mantissa
        assert_eq!(reconstruct_f32(0x8000_0000), 0.0);
    }

    #[test]
    fn test_float_byte_orders() {
        let value = -2.75f32;
        let mut buffer = value.to_le_bytes().to_vec();
        buffer.extend_from_slice(&value.to_be_bytes());

        let mut cursor = ByteCursor::new(&buffer);
        assert_eq!(cursor.read_f32_le().unwrap(), value);
        assert_eq!(cursor.read_f32_be().unwrap(), value);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_integer_reads() {
        let buffer = [
            0xff, // u8 / i8
            0x34, 0x12, // u16 le
            0x78, 0x56, 0x34, 0x12, // u32 le
            0xff, 0xff, 0xff, // u24 be
            0x12, 0x34, 0x56, 0x78, // u32 be
        ];

        let mut cursor = ByteCursor::new(&buffer);
        assert_eq!(cursor.read_u8().unwrap(), 255);
        cursor.set_position(0);
        assert_eq!(cursor.read_i8().unwrap(), -1);
        assert_eq!(cursor.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(cursor.read_u24_be().unwrap(), 16_777_215);
        assert_eq!(cursor.read_u32_be().unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_fixed_string_keeps_padding() {
        let buffer = b"TRACK\0xyz";
        let mut cursor = ByteCursor::new(buffer);
        assert_eq!(cursor.read_fixed_string(6).unwrap(), "TRACK\0");
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn test_short_read_fails() {
        let buffer = [0u8; 3];
        let mut cursor = ByteCursor::at(&buffer, 1);
        let err = cursor.read_u32_be().unwrap_err();
        assert!(matches!(
            err,
            FormatError::UnexpectedEof {
                offset: 1,
                needed: 4,
                len: 3
            }
        ));
        // Failed reads leave the position untouched
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_array_reads() {
        let mut buffer = Vec::new();
        for v in [1.5f32, 2.5, -3.0] {
            buffer.extend_from_slice(&v.to_le_bytes());
        }
        let mut cursor = ByteCursor::new(&buffer);
        assert_eq!(cursor.read_f32_le_array(3).unwrap(), vec![1.5, 2.5, -3.0]);

        let mut cursor = ByteCursor::new(&buffer);
        assert!(cursor.read_f32_le_array(4).is_err());
    }
}
