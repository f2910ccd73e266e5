//! Framed message encoding.
//!
//! Every framed message starts with a fixed-layout header (all multi-byte
//! fields little-endian), optionally followed by key/value headers, then the
//! payload:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 1    | Protocol version (`1`) |
//! | 1      | 1    | Message type (`0`..`3`) |
//! | 2      | 1    | Flags (bit 0 compressed, bit 1 encrypted, bit 2 has-headers) |
//! | 3      | 16   | Message id (RFC 4122 v4 UUID) |
//! | 19     | 8    | Timestamp (signed Unix seconds) |
//! | 27     | 4    | Payload length in bytes |
//! | 31     | var  | Headers when bit 2 is set: u16 count, then per header a u16-length-prefixed key and value |
//! | ...    | var  | Payload (exactly payload-length bytes) |
//!
//! The compressed and encrypted bits are reserved for extensions; frames
//! carrying them are rejected, as are frames with any undefined flag bit,
//! an unknown message type or a foreign version.

use bitflags::bitflags;
use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::bytes::{BytesReader, BytesWriter};
use crate::error::{BareWireError, Result};

pub const PROTOCOL_VERSION: u8 = 1;

/// Bytes before the optional headers section.
pub const FIXED_HEADER_LEN: usize = 31;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const COMPRESSED = 0b0000_0001;
        const ENCRYPTED = 0b0000_0010;
        const HAS_HEADERS = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Response = 1,
    Notification = 2,
    Error = 3,
}

impl MessageType {
    fn from_u8(value: u8) -> Option<MessageType> {
        match value {
            0 => Some(MessageType::Request),
            1 => Some(MessageType::Response),
            2 => Some(MessageType::Notification),
            3 => Some(MessageType::Error),
            _ => None,
        }
    }
}

/// One framed message. Flags are derived at encode time; a frame value never
/// carries reserved bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub message_id: Uuid,
    /// Unix seconds at creation; for responses and errors the id (not the
    /// timestamp) correlates with the request.
    pub timestamp: i64,
    pub headers: IndexMap<String, String>,
    pub payload: Vec<u8>,
}

impl Frame {
    fn new(message_type: MessageType, message_id: Uuid, payload: Vec<u8>) -> Frame {
        Frame {
            message_type,
            message_id,
            timestamp: Utc::now().timestamp(),
            headers: IndexMap::new(),
            payload,
        }
    }

    /// A request frame with a fresh message id.
    pub fn request(payload: Vec<u8>) -> Frame {
        Frame::new(MessageType::Request, Uuid::new_v4(), payload)
    }

    /// A response frame correlated to `request_id`.
    pub fn response(request_id: Uuid, payload: Vec<u8>) -> Frame {
        Frame::new(MessageType::Response, request_id, payload)
    }

    /// A one-way notification frame with a fresh message id.
    pub fn notification(payload: Vec<u8>) -> Frame {
        Frame::new(MessageType::Notification, Uuid::new_v4(), payload)
    }

    /// An error frame correlated to `request_id`. The payload carries the
    /// peer's message bytes.
    pub fn error(request_id: Uuid, payload: Vec<u8>) -> Frame {
        Frame::new(MessageType::Error, request_id, payload)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Frame {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_len = u32::try_from(self.payload.len())
            .map_err(|_| BareWireError::encoding("frame payload exceeds 4 GiB"))?;
        let mut flags = FrameFlags::empty();
        if !self.headers.is_empty() {
            flags |= FrameFlags::HAS_HEADERS;
        }

        let mut writer = BytesWriter::with_capacity(FIXED_HEADER_LEN + self.payload.len());
        writer.write_byte(PROTOCOL_VERSION)?;
        writer.write_byte(self.message_type as u8)?;
        writer.write_byte(flags.bits())?;
        writer.write_exact(self.message_id.as_bytes())?;
        writer.write_i64_le(self.timestamp)?;
        writer.write_u32_le(payload_len)?;

        if !self.headers.is_empty() {
            let count = u16::try_from(self.headers.len())
                .map_err(|_| BareWireError::encoding("too many frame headers"))?;
            writer.write_u16_le(count)?;
            for (key, value) in &self.headers {
                write_header_str(&mut writer, key)?;
                write_header_str(&mut writer, value)?;
            }
        }

        writer.write_exact(&self.payload)?;
        Ok(writer.into_vec())
    }

    /// Decode one frame from the front of `bytes`. Returns the frame and the
    /// number of bytes consumed; trailing bytes are the caller's to keep.
    pub fn decode(bytes: &[u8]) -> Result<(Frame, usize)> {
        let mut reader = BytesReader::new(bytes);

        let version = read_or_truncated(reader.read_byte())?;
        if version != PROTOCOL_VERSION {
            return Err(BareWireError::decoding(format!(
                "unsupported protocol version {version}"
            )));
        }
        let raw_type = read_or_truncated(reader.read_byte())?;
        let message_type = MessageType::from_u8(raw_type).ok_or_else(|| {
            BareWireError::decoding(format!("unknown message type {raw_type}"))
        })?;
        let flags = decode_flags(read_or_truncated(reader.read_byte())?)?;

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(read_or_truncated(reader.read_exact(16))?);
        let message_id = Uuid::from_bytes(id_bytes);
        let timestamp = read_or_truncated(reader.read_i64_le())?;
        let payload_len = read_or_truncated(reader.read_u32_le())? as usize;

        let mut headers = IndexMap::new();
        if flags.contains(FrameFlags::HAS_HEADERS) {
            let count = read_or_truncated(reader.read_u16_le())?;
            for _ in 0..count {
                let key = read_header_str(&mut reader)?;
                let value = read_header_str(&mut reader)?;
                headers.insert(key, value);
            }
        }

        if reader.remaining() < payload_len {
            return Err(BareWireError::decoding(format!(
                "frame truncated: payload of {payload_len} byte(s) not available"
            )));
        }
        let payload = reader.read_exact(payload_len)?.to_vec();

        Ok((
            Frame {
                message_type,
                message_id,
                timestamp,
                headers,
                payload,
            },
            reader.position(),
        ))
    }

    /// Total encoded length of the frame at the front of `buffer`, or `None`
    /// when more bytes are needed to tell. Malformed prefixes fail early so
    /// stream transports can drop the connection instead of buffering
    /// garbage forever.
    pub(crate) fn required_len(buffer: &[u8]) -> Result<Option<usize>> {
        if buffer.len() < 3 {
            return Ok(None);
        }
        if buffer[0] != PROTOCOL_VERSION {
            return Err(BareWireError::decoding(format!(
                "unsupported protocol version {}",
                buffer[0]
            )));
        }
        if MessageType::from_u8(buffer[1]).is_none() {
            return Err(BareWireError::decoding(format!(
                "unknown message type {}",
                buffer[1]
            )));
        }
        let flags = decode_flags(buffer[2])?;

        if buffer.len() < FIXED_HEADER_LEN {
            return Ok(None);
        }
        let payload_len =
            u32::from_le_bytes([buffer[27], buffer[28], buffer[29], buffer[30]]) as usize;

        let mut cursor = FIXED_HEADER_LEN;
        if flags.contains(FrameFlags::HAS_HEADERS) {
            let Some(count) = read_u16_at(buffer, cursor) else {
                return Ok(None);
            };
            cursor += 2;
            for _ in 0..count {
                // Key, then value, each u16-length-prefixed.
                for _ in 0..2 {
                    let Some(len) = read_u16_at(buffer, cursor) else {
                        return Ok(None);
                    };
                    cursor += 2 + len as usize;
                }
            }
            if cursor > buffer.len() {
                return Ok(None);
            }
        }

        Ok(Some(cursor + payload_len))
    }
}

fn decode_flags(raw: u8) -> Result<FrameFlags> {
    let flags = FrameFlags::from_bits(raw).ok_or_else(|| {
        BareWireError::decoding(format!("reserved frame flag bits set: 0x{raw:02X}"))
    })?;
    if flags.contains(FrameFlags::COMPRESSED) {
        return Err(BareWireError::decoding(
            "compressed frames are not supported",
        ));
    }
    if flags.contains(FrameFlags::ENCRYPTED) {
        return Err(BareWireError::decoding(
            "encrypted frames are not supported",
        ));
    }
    Ok(flags)
}

fn write_header_str(writer: &mut BytesWriter, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| BareWireError::encoding("frame header entry exceeds 64 KiB"))?;
    writer.write_u16_le(len)?;
    writer.write_exact(s.as_bytes())
}

fn read_header_str(reader: &mut BytesReader<'_>) -> Result<String> {
    let len = read_or_truncated(reader.read_u16_le())? as usize;
    let bytes = read_or_truncated(reader.read_exact(len))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| BareWireError::decoding("frame header is not valid utf-8"))
}

fn read_u16_at(buffer: &[u8], at: usize) -> Option<u16> {
    let bytes = buffer.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Frame decoding treats a short buffer as malformed input.
fn read_or_truncated<T>(result: Result<T>) -> Result<T> {
    result.map_err(|err| match err {
        BareWireError::OutOfBounds { offset, .. } => {
            BareWireError::decoding(format!("frame truncated at offset {offset}"))
        }
        other => other,
    })
}
