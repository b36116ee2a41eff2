//! Self-delimiting message records used to persist and replay messages.

use crate::address::Address;
use crate::message::{Message, MessageId, MAX_PRIORITY};
use crate::properties::TypedProperties;
use crate::protocol::constants::MAX_BODY_SIZE;
use crate::protocol::{wire, ProtocolError, ProtocolResult};
use crate::types;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Record magic bytes: b"KAEX"
pub const PROTOCOL_MAGIC: [u8; 4] = [0x4B, 0x41, 0x45, 0x58];

/// Current record version
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Record header size in bytes
pub const RECORD_HEADER_SIZE: usize = 16;

/// Bytes covered by the checksum ahead of the body.
const CHECKSUMMED_HEADER: usize = 12;

/// Record flag bits.
pub mod flags {
    /// Message is durable.
    pub const DURABLE: u8 = 0x01;
    /// Body carries an expiration timestamp.
    pub const HAS_EXPIRATION: u8 = 0x02;
    /// Body carries a user id.
    pub const HAS_USER_ID: u8 = 0x04;
    /// Every defined bit.
    pub const ALL: u8 = DURABLE | HAS_EXPIRATION | HAS_USER_ID;
}

/// Parsed fixed-size record header.
///
/// ```text
/// Offset | Size | Field
/// -------|------|-------------
///   0    |  4   | Magic bytes (b"KAEX")
///   4    |  1   | Record version
///   5    |  1   | Flags
///   6    |  2   | Reserved
///   8    |  4   | Body length
///  12    |  4   | CRC32 of bytes 0..12 followed by the body
///  16    |  ?   | Body
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Flag bits, see [`flags`]
    pub flags: u8,
    /// Body length in bytes
    pub body_length: u32,
    /// Stored checksum
    pub checksum: u32,
}

impl RecordHeader {
    /// Total record size described by this header.
    #[must_use]
    pub const fn record_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.body_length as usize
    }

    /// Parse and validate a header from the front of `data`.
    ///
    /// Returns `None` when fewer than [`RECORD_HEADER_SIZE`] bytes are present.
    ///
    /// # Errors
    /// Fails on bad magic, an unsupported version or an oversized body.
    pub fn peek(data: &[u8]) -> ProtocolResult<Option<Self>> {
        if data.len() < RECORD_HEADER_SIZE {
            return Ok(None);
        }
        let mut buf = &data[..RECORD_HEADER_SIZE];

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != PROTOCOL_MAGIC {
            return Err(ProtocolError::InvalidMagic { expected: PROTOCOL_MAGIC, actual: magic });
        }

        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion { version, supported: PROTOCOL_VERSION });
        }

        let flags = buf.get_u8();
        let _reserved = buf.get_u16();
        let body_length = buf.get_u32();
        if body_length > MAX_BODY_SIZE {
            return Err(ProtocolError::RecordTooLarge {
                actual: body_length as usize,
                max: MAX_BODY_SIZE as usize,
            });
        }
        let checksum = buf.get_u32();

        Ok(Some(Self { flags, body_length, checksum }))
    }
}

fn checksum(header: &[u8], body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(body);
    hasher.finalize()
}

/// Encoded body size of `message`.
#[must_use]
pub fn body_size(message: &Message) -> usize {
    16 + wire::simple_string_size(message.address.as_str())
        + 1
        + 8
        + message.expiration.map_or(0, |_| 8)
        + message.user_id.as_deref().map_or(0, wire::simple_string_size)
        + message.properties.encode_size()
        + 4
        + message.body.len()
}

/// Append the record for `message` to `buf`.
///
/// # Errors
/// Returns `RecordTooLarge` when the body exceeds the maximum size.
pub fn write_record(message: &Message, buf: &mut BytesMut) -> ProtocolResult<()> {
    let body_len = body_size(message);
    let body_len_field = u32::try_from(body_len)
        .ok()
        .filter(|len| *len <= MAX_BODY_SIZE)
        .ok_or(ProtocolError::RecordTooLarge { actual: body_len, max: MAX_BODY_SIZE as usize })?;

    let mut record_flags = 0;
    if message.durable {
        record_flags |= flags::DURABLE;
    }
    if message.expiration.is_some() {
        record_flags |= flags::HAS_EXPIRATION;
    }
    if message.user_id.is_some() {
        record_flags |= flags::HAS_USER_ID;
    }

    let start = buf.len();
    buf.reserve(RECORD_HEADER_SIZE + body_len);
    buf.put_slice(&PROTOCOL_MAGIC);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(record_flags);
    buf.put_u16(0);
    buf.put_u32(body_len_field);
    buf.put_u32(0); // checksum placeholder

    buf.put_slice(message.id.as_uuid().as_bytes());
    wire::put_simple_string(buf, message.address.as_str());
    buf.put_u8(message.priority);
    buf.put_i64(message.timestamp.timestamp_millis());
    if let Some(expiration) = message.expiration {
        buf.put_i64(expiration.timestamp_millis());
    }
    if let Some(user_id) = message.user_id.as_deref() {
        wire::put_simple_string(buf, user_id);
    }
    message.properties.encode(buf);
    wire::put_bytes(buf, &message.body);

    let body_start = start + RECORD_HEADER_SIZE;
    debug_assert_eq!(buf.len() - body_start, body_len);
    let crc = checksum(&buf[start..start + CHECKSUMMED_HEADER], &buf[body_start..]);
    buf[start + CHECKSUMMED_HEADER..body_start].copy_from_slice(&crc.to_be_bytes());
    Ok(())
}

/// Decode one complete record.
///
/// # Errors
/// Fails on a malformed header, a checksum mismatch, a truncated record or
/// an invalid body.
pub fn read_record(data: &Bytes) -> ProtocolResult<Message> {
    let header = RecordHeader::peek(data)?.ok_or(ProtocolError::BufferUnderflow {
        required: RECORD_HEADER_SIZE,
        remaining: data.len(),
    })?;
    let size = header.record_size();
    if data.len() < size {
        return Err(ProtocolError::BufferUnderflow { required: size, remaining: data.len() });
    }

    let actual = checksum(&data[..CHECKSUMMED_HEADER], &data[RECORD_HEADER_SIZE..size]);
    if actual != header.checksum {
        return Err(ProtocolError::ChecksumMismatch { expected: header.checksum, actual });
    }

    let mut body = data.slice(RECORD_HEADER_SIZE..size);
    let message = read_body(header.flags, &mut body)?;
    if body.has_remaining() {
        return Err(ProtocolError::decoding(format!(
            "{} trailing bytes after record body",
            body.remaining()
        )));
    }
    Ok(message)
}

fn read_timestamp(buf: &mut Bytes, field: &str) -> ProtocolResult<types::Timestamp> {
    let millis = wire::get_i64(buf)?;
    types::from_millis(millis)
        .ok_or_else(|| ProtocolError::decoding(format!("{field} {millis} out of range")))
}

fn read_body(record_flags: u8, buf: &mut Bytes) -> ProtocolResult<Message> {
    if record_flags & !flags::ALL != 0 {
        return Err(ProtocolError::decoding(format!("unknown record flags {record_flags:#04x}")));
    }

    wire::ensure_remaining(buf, 16)?;
    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);

    let address = Address::new(wire::get_simple_string(buf)?)
        .map_err(|e| ProtocolError::decoding(e.to_string()))?;

    let priority = wire::get_u8(buf)?;
    if priority > MAX_PRIORITY {
        return Err(ProtocolError::decoding(format!("priority {priority} out of range")));
    }

    let timestamp = read_timestamp(buf, "timestamp")?;
    let expiration = if record_flags & flags::HAS_EXPIRATION != 0 {
        Some(read_timestamp(buf, "expiration")?)
    } else {
        None
    };
    let user_id = if record_flags & flags::HAS_USER_ID != 0 {
        Some(wire::get_simple_string(buf)?)
    } else {
        None
    };

    let properties = TypedProperties::decode_new(buf)?;
    let body = wire::get_bytes(buf)?;

    Ok(Message {
        id: MessageId::from_uuid(Uuid::from_bytes(id)),
        address,
        body,
        durable: record_flags & flags::DURABLE != 0,
        priority,
        timestamp,
        expiration,
        user_id,
        properties,
    })
}
