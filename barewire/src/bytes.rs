//! Bounded little-endian cursors over byte slices.
//!
//! `BytesReader` and `BytesWriter` are the only way the crate touches raw
//! bytes: every access is bounds-checked and fails with `OutOfBounds` instead
//! of panicking. All multi-byte primitives are little-endian.

use crate::error::{BareWireError, Result};

macro_rules! impl_le_reads {
    ($($name:ident -> $t:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$t> {
                let bytes = self.read_exact(std::mem::size_of::<$t>())?;
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                Ok(<$t>::from_le_bytes(buf))
            }
        )*
    };
}

macro_rules! impl_le_writes {
    ($($name:ident -> $t:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: $t) -> Result<()> {
                self.write_exact(&value.to_le_bytes())
            }
        )*
    };
}

/// Read-only cursor over a byte slice with position tracking.
#[derive(Debug)]
pub struct BytesReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BytesReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BytesReader { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Move the cursor to an absolute position within the slice.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(BareWireError::OutOfBounds {
                offset: position,
                length: 0,
            });
        }
        self.position = position;
        Ok(())
    }

    /// Advance the cursor without looking at the bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_exact(n).map(|_| ())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let bytes = self.read_exact(1)?;
        Ok(bytes[0])
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(BareWireError::OutOfBounds {
                offset: self.position,
                length: n,
            });
        }
        let bytes = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(bytes)
    }

    impl_le_reads! {
        read_u16_le -> u16,
        read_u32_le -> u32,
        read_u64_le -> u64,
        read_i8_le -> i8,
        read_i16_le -> i16,
        read_i32_le -> i32,
        read_i64_le -> i64,
        read_f32_le -> f32,
        read_f64_le -> f64,
    }
}

/// Appending writer, growable by default or capped at a fixed capacity.
#[derive(Debug, Default)]
pub struct BytesWriter {
    buf: Vec<u8>,
    capacity_limit: Option<usize>,
}

impl BytesWriter {
    pub fn new() -> Self {
        BytesWriter::default()
    }

    /// Growable writer with a preallocated buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        BytesWriter {
            buf: Vec::with_capacity(capacity),
            capacity_limit: None,
        }
    }

    /// Writer that refuses to grow past `limit` bytes.
    pub fn with_capacity_limit(limit: usize) -> Self {
        BytesWriter {
            buf: Vec::with_capacity(limit),
            capacity_limit: Some(limit),
        }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_exact(&[byte])
    }

    pub fn write_exact(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(limit) = self.capacity_limit {
            if self.buf.len() + bytes.len() > limit {
                return Err(BareWireError::OutOfBounds {
                    offset: self.buf.len(),
                    length: bytes.len(),
                });
            }
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Overwrite a previously written little-endian `u32` in place, for
    /// length fields whose value is only known after the payload is written.
    pub fn patch_u32_le(&mut self, position: usize, value: u32) -> Result<()> {
        if position + 4 > self.buf.len() {
            return Err(BareWireError::OutOfBounds {
                offset: position,
                length: 4,
            });
        }
        self.buf[position..position + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    impl_le_writes! {
        write_u16_le -> u16,
        write_u32_le -> u32,
        write_u64_le -> u64,
        write_i8_le -> i8,
        write_i16_le -> i16,
        write_i32_le -> i32,
        write_i64_le -> i64,
        write_f32_le -> f32,
        write_f64_le -> f64,
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_tracks_position() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut reader = BytesReader::new(&data);
        assert_eq!(reader.read_byte().unwrap(), 0x01);
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.read_exact(2).unwrap(), &[0x02, 0x03]);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_reader_little_endian() {
        let data = [0x78, 0x56, 0x34, 0x12, 0xFF, 0xFF];
        let mut reader = BytesReader::new(&data);
        assert_eq!(reader.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(reader.read_i16_le().unwrap(), -1);
    }

    #[test]
    fn test_reader_out_of_bounds() {
        let data = [0x01, 0x02];
        let mut reader = BytesReader::new(&data);
        reader.read_byte().unwrap();
        let err = reader.read_u32_le().unwrap_err();
        assert_eq!(err, BareWireError::OutOfBounds { offset: 1, length: 4 });
        // The cursor stays where the failing access started.
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_reader_seek_past_end_fails() {
        let data = [0u8; 4];
        let mut reader = BytesReader::new(&data);
        assert!(reader.seek(4).is_ok());
        assert!(reader.seek(5).is_err());
    }

    #[test]
    fn test_writer_roundtrip() {
        let mut writer = BytesWriter::new();
        writer.write_u16_le(0xBEEF).unwrap();
        writer.write_f64_le(1.5).unwrap();
        writer.write_byte(0x7F).unwrap();

        let bytes = writer.into_vec();
        let mut reader = BytesReader::new(&bytes);
        assert_eq!(reader.read_u16_le().unwrap(), 0xBEEF);
        assert_eq!(reader.read_f64_le().unwrap(), 1.5);
        assert_eq!(reader.read_byte().unwrap(), 0x7F);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_writer_capacity_limit() {
        let mut writer = BytesWriter::with_capacity_limit(3);
        writer.write_u16_le(7).unwrap();
        let err = writer.write_u16_le(8).unwrap_err();
        assert_eq!(err, BareWireError::OutOfBounds { offset: 2, length: 2 });
        // Nothing was partially written.
        assert_eq!(writer.position(), 2);
    }

    #[test]
    fn test_writer_patch_u32() {
        let mut writer = BytesWriter::new();
        writer.write_u32_le(0).unwrap();
        writer.write_exact(b"payload").unwrap();
        writer.patch_u32_le(0, 7).unwrap();

        let bytes = writer.into_vec();
        assert_eq!(&bytes[..4], &[7, 0, 0, 0]);
        assert!(BytesWriter::new().patch_u32_le(0, 1).is_err());
    }

    #[test]
    fn test_nan_bit_pattern_preserved() {
        let nan = f64::from_bits(0x7FF8_0000_0000_1234);
        let mut writer = BytesWriter::new();
        writer.write_f64_le(nan).unwrap();
        let bytes = writer.into_vec();
        let mut reader = BytesReader::new(&bytes);
        assert_eq!(reader.read_f64_le().unwrap().to_bits(), nan.to_bits());
    }
}
