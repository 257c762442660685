//! The WOFF2 variable length integer encodings: 255UInt16 and UIntBase128.

use bytes::{Buf, BufMut};

use crate::error::ConvertError;

/// Reading the variable length encodings from any [`Buf`].
pub(crate) trait BufVariableExt: Buf {
    /// Read a 255UInt16 value (MicroType Express section 6.1.1).
    fn try_get_variable_255_u16(&mut self) -> Result<u16, ConvertError> {
        const WORD_CODE: u8 = 253;
        const ONE_MORE_BYTE_CODE_2: u8 = 254;
        const ONE_MORE_BYTE_CODE_1: u8 = 255;
        const LOWEST_U_CODE: u16 = 253;

        let code = self.try_get_u8()?;
        Ok(match code {
            WORD_CODE => self.try_get_u16()?,
            ONE_MORE_BYTE_CODE_1 => self.try_get_u8()? as u16 + LOWEST_U_CODE,
            ONE_MORE_BYTE_CODE_2 => self.try_get_u8()? as u16 + LOWEST_U_CODE * 2,
            _ => code as u16,
        })
    }

    /// Read a UIntBase128 value: big-endian groups of 7 bits, high bit set on
    /// all but the last byte. At most 5 bytes; a leading 0x80 is invalid.
    fn try_get_variable_128_u32(&mut self) -> Result<u32, ConvertError> {
        let mut result: u32 = 0;
        for i in 0..5 {
            let code = self.try_get_u8()?;
            if i == 0 && code == 0x80 {
                return Err(ConvertError::CorruptContainer(
                    "leading zero byte in UIntBase128",
                ));
            }
            // If any of the top seven bits are set then the shift overflows.
            if result & 0xfe00_0000 != 0 {
                return Err(ConvertError::CorruptContainer("UIntBase128 overflow"));
            }
            result = (result << 7) | (code & 0x7f) as u32;
            if code & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(ConvertError::CorruptContainer("UIntBase128 exceeds 5 bytes"))
    }
}

impl<T: Buf> BufVariableExt for T {}

pub(crate) fn put_variable_255_u16(out: &mut impl BufMut, value: u16) {
    if value < 253 {
        out.put_u8(value as u8);
    } else if value < 506 {
        out.put_u8(255);
        out.put_u8((value - 253) as u8);
    } else if value < 762 {
        out.put_u8(254);
        out.put_u8((value - 506) as u8);
    } else {
        out.put_u8(253);
        out.put_u16(value);
    }
}

pub(crate) fn put_variable_128_u32(out: &mut impl BufMut, value: u32) {
    let size = base_128_size(value);
    for i in (0..size).rev() {
        let mut byte = ((value >> (7 * i)) & 0x7f) as u8;
        if i > 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
    }
}

fn base_128_size(mut value: u32) -> u32 {
    let mut size = 1;
    while value >= 128 {
        value >>= 7;
        size += 1;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_255(value: u16) -> (u16, usize) {
        let mut buf = Vec::new();
        put_variable_255_u16(&mut buf, value);
        let len = buf.len();
        let mut input = buf.as_slice();
        let decoded = input.try_get_variable_255_u16().unwrap();
        assert!(input.is_empty());
        (decoded, len)
    }

    #[test]
    fn variable_255_u16_boundaries() {
        for (value, expected_len) in [
            (0u16, 1),
            (252, 1),
            (253, 2),
            (505, 2),
            (506, 2),
            (761, 2),
            (762, 3),
            (u16::MAX, 3),
        ] {
            let (decoded, len) = round_trip_255(value);
            assert_eq!(decoded, value);
            assert_eq!(len, expected_len, "value {value}");
        }
    }

    #[test]
    fn variable_255_u16_truncated() {
        let mut input: &[u8] = &[253, 0x12];
        assert!(input.try_get_variable_255_u16().is_err());
    }

    fn round_trip_128(value: u32) -> (u32, usize) {
        let mut buf = Vec::new();
        put_variable_128_u32(&mut buf, value);
        let len = buf.len();
        let mut input = buf.as_slice();
        let decoded = input.try_get_variable_128_u32().unwrap();
        assert!(input.is_empty());
        (decoded, len)
    }

    #[test]
    fn variable_128_u32_boundaries() {
        for (value, expected_len) in [
            (0u32, 1),
            (127, 1),
            (128, 2),
            (16383, 2),
            (16384, 3),
            (2097151, 3),
            (2097152, 4),
            (268435455, 4),
            (268435456, 5),
            (u32::MAX, 5),
        ] {
            let (decoded, len) = round_trip_128(value);
            assert_eq!(decoded, value);
            assert_eq!(len, expected_len, "value {value}");
        }
    }

    #[test]
    fn variable_128_u32_rejects_leading_zero_byte() {
        let mut input: &[u8] = &[0x80, 0x01];
        assert!(input.try_get_variable_128_u32().is_err());
    }

    #[test]
    fn variable_128_u32_rejects_overlong() {
        // 6 continuation bytes can never terminate within the limit
        let mut input: &[u8] = &[0x81, 0x80, 0x80, 0x80, 0x80, 0x00];
        assert!(input.try_get_variable_128_u32().is_err());
    }

    #[test]
    fn variable_128_u32_rejects_overflow() {
        // 0x10_FFFF_FFFF does not fit in 32 bits
        let mut input: &[u8] = &[0x90, 0xFF, 0xFF, 0xFF, 0x7F];
        assert!(input.try_get_variable_128_u32().is_err());
    }
}
