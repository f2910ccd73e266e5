//! Variable-length integers: unsigned LEB128 and zigzag-mapped signed.

use crate::bytes::{BytesReader, BytesWriter};
use crate::error::{BareWireError, Result};

/// A `u64` never needs more than ten 7-bit groups.
pub(crate) const MAX_UINT_BYTES: usize = 10;

/// Encode an unsigned integer as LEB128: 7-bit groups least-significant
/// first, continuation bit set on every byte except the last.
pub fn write_uint(writer: &mut BytesWriter, mut value: u64) -> Result<()> {
    while value >= 0x80 {
        writer.write_byte((value as u8) | 0x80)?;
        value >>= 7;
    }
    writer.write_byte(value as u8)
}

/// Decode a LEB128 unsigned integer, rejecting encodings that overflow 64
/// bits.
pub fn read_uint(reader: &mut BytesReader<'_>) -> Result<u64> {
    let mut value = 0u64;
    for group in 0..MAX_UINT_BYTES - 1 {
        let byte = reader.read_byte()?;
        value |= u64::from(byte & 0x7F) << (7 * group);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    // Only one bit of the tenth group fits into a u64, and it must be the
    // final group.
    let last = reader.read_byte()?;
    if last > 0x01 {
        return Err(BareWireError::decoding("uint overflow"));
    }
    Ok(value | (u64::from(last) << 63))
}

/// Encode a signed integer: zigzag-map, then LEB128.
pub fn write_int(writer: &mut BytesWriter, value: i64) -> Result<()> {
    write_uint(writer, zigzag(value))
}

pub fn read_int(reader: &mut BytesReader<'_>) -> Result<i64> {
    Ok(unzigzag(read_uint(reader)?))
}

/// `n ↦ (n << 1) XOR (n >> 63)`, mapping small magnitudes of either sign to
/// small unsigned values.
pub fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

pub fn unzigzag(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

/// Encoded length of a LEB128 unsigned integer: one byte per started 7-bit
/// group.
pub fn uint_len(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(7)
    }
}

pub fn int_len(value: i64) -> usize {
    uint_len(zigzag(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_uint(value: u64) -> Vec<u8> {
        let mut writer = BytesWriter::new();
        write_uint(&mut writer, value).unwrap();
        writer.into_vec()
    }

    fn encode_int(value: i64) -> Vec<u8> {
        let mut writer = BytesWriter::new();
        write_int(&mut writer, value).unwrap();
        writer.into_vec()
    }

    #[test]
    fn test_uint_known_encodings() {
        assert_eq!(encode_uint(0), [0x00]);
        assert_eq!(encode_uint(1), [0x01]);
        assert_eq!(encode_uint(127), [0x7F]);
        assert_eq!(encode_uint(128), [0x80, 0x01]);
        assert_eq!(encode_uint(300), [0xAC, 0x02]);
    }

    #[test]
    fn test_uint_max_is_ten_bytes() {
        let bytes = encode_uint(u64::MAX);
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[9], 0x01);
        let mut reader = BytesReader::new(&bytes);
        assert_eq!(read_uint(&mut reader).unwrap(), u64::MAX);
    }

    #[test]
    fn test_uint_length_matches_bit_count() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::MAX / 2, u64::MAX] {
            assert_eq!(encode_uint(value).len(), uint_len(value), "value {value}");
        }
    }

    #[test]
    fn test_uint_roundtrip_random() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let value: u64 = rng.random();
            let bytes = encode_uint(value);
            let mut reader = BytesReader::new(&bytes);
            assert_eq!(read_uint(&mut reader).unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_uint_overflow_rejected() {
        // Ten continuation bytes: the tenth group must be final.
        let bytes = [0xFF; 10];
        let mut reader = BytesReader::new(&bytes);
        assert_eq!(
            read_uint(&mut reader).unwrap_err(),
            BareWireError::Decoding("uint overflow".into())
        );

        // Tenth group carrying more than one bit.
        let mut bytes = [0x80; 10];
        bytes[9] = 0x02;
        let mut reader = BytesReader::new(&bytes);
        assert!(read_uint(&mut reader).is_err());
    }

    #[test]
    fn test_uint_truncated_input() {
        let mut reader = BytesReader::new(&[0x80, 0x80]);
        assert!(matches!(
            read_uint(&mut reader).unwrap_err(),
            BareWireError::OutOfBounds { .. }
        ));
    }

    #[test]
    fn test_zigzag_known_values() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag(i64::MIN), u64::MAX);
    }

    #[test]
    fn test_int_known_encodings() {
        assert_eq!(encode_int(-1), [0x01]);
        assert_eq!(encode_int(63), [0x7E]);
        assert_eq!(encode_int(64), [0x80, 0x01]);
    }

    #[test]
    fn test_int_roundtrip_extremes() {
        for value in [0i64, -1, 1, i64::MIN, i64::MAX, -64, 64] {
            let bytes = encode_int(value);
            assert_eq!(bytes.len(), int_len(value));
            let mut reader = BytesReader::new(&bytes);
            assert_eq!(read_int(&mut reader).unwrap(), value);
        }
    }
}
