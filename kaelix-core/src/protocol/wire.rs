//! Primitive readers and writers for the binary encoding.
//!
//! `bytes::Buf` getters panic on short buffers, so every reader here checks
//! the remaining length first and reports [`ProtocolError::BufferUnderflow`].

use crate::protocol::data_constants::SIZE_INT;
use crate::protocol::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes};

/// Fail with `BufferUnderflow` unless `required` bytes remain.
#[inline]
pub fn ensure_remaining<B: Buf + ?Sized>(buf: &B, required: usize) -> ProtocolResult<()> {
    let remaining = buf.remaining();
    if remaining < required {
        return Err(ProtocolError::BufferUnderflow { required, remaining });
    }
    Ok(())
}

/// Number of payload bytes a string occupies (two per UTF-16 code unit).
#[inline]
#[must_use]
pub fn string_data_len(value: &str) -> usize {
    value.encode_utf16().count() * 2
}

/// Encoded size of a simple string: length prefix plus UTF-16 data.
#[inline]
#[must_use]
pub fn simple_string_size(value: &str) -> usize {
    SIZE_INT + string_data_len(value)
}

/// Write a length-prefixed simple string.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn put_simple_string<B: BufMut + ?Sized>(buf: &mut B, value: &str) {
    buf.put_i32(string_data_len(value) as i32);
    for unit in value.encode_utf16() {
        buf.put_u16_le(unit);
    }
}

/// Read a length-prefixed simple string.
///
/// # Errors
/// Fails on a truncated buffer, a negative or odd length, or invalid UTF-16.
pub fn get_simple_string<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<String> {
    let len = get_length(buf)?;
    if len % 2 != 0 {
        return Err(ProtocolError::InvalidLength { length: i32::try_from(len).unwrap_or(-1) });
    }
    ensure_remaining(buf, len)?;

    let mut units = Vec::with_capacity(len / 2);
    for _ in 0..len / 2 {
        units.push(buf.get_u16_le());
    }

    String::from_utf16(&units).map_err(|e| ProtocolError::InvalidString { message: e.to_string() })
}

/// Write a length-prefixed byte array.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn put_bytes<B: BufMut + ?Sized>(buf: &mut B, value: &[u8]) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
}

/// Read a length-prefixed byte array.
///
/// # Errors
/// Fails on a truncated buffer or a negative length.
pub fn get_bytes<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<Bytes> {
    let len = get_length(buf)?;
    ensure_remaining(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Read a non-negative 4-byte length prefix.
///
/// # Errors
/// Fails on a truncated buffer or a negative length.
pub fn get_length<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<usize> {
    let length = get_i32(buf)?;
    usize::try_from(length).map_err(|_| ProtocolError::InvalidLength { length })
}

macro_rules! checked_getter {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $size:expr, $get:ident) => {
        $(#[$doc])*
        ///
        /// # Errors
        /// Fails with `BufferUnderflow` on a truncated buffer.
        #[inline]
        pub fn $name<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<$ty> {
            ensure_remaining(buf, $size)?;
            Ok(buf.$get())
        }
    };
}

checked_getter!(
    /// Read one unsigned byte.
    get_u8, u8, 1, get_u8
);
checked_getter!(
    /// Read one signed byte.
    get_i8, i8, 1, get_i8
);
checked_getter!(
    /// Read a big-endian 16-bit integer.
    get_i16, i16, 2, get_i16
);
checked_getter!(
    /// Read a big-endian 16-bit unsigned integer.
    get_u16, u16, 2, get_u16
);
checked_getter!(
    /// Read a big-endian 32-bit integer.
    get_i32, i32, 4, get_i32
);
checked_getter!(
    /// Read a big-endian 32-bit unsigned integer.
    get_u32, u32, 4, get_u32
);
checked_getter!(
    /// Read a big-endian 64-bit integer.
    get_i64, i64, 8, get_i64
);
checked_getter!(
    /// Read a big-endian 64-bit unsigned integer.
    get_u64, u64, 8, get_u64
);

/// Read a boolean byte; any non-zero value is `true`.
///
/// # Errors
/// Fails with `BufferUnderflow` on a truncated buffer.
#[inline]
pub fn get_bool<B: Buf + ?Sized>(buf: &mut B) -> ProtocolResult<bool> {
    Ok(get_u8(buf)? != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_simple_string_layout() {
        let mut buf = BytesMut::new();
        put_simple_string(&mut buf, "ab");

        // length 4, then 'a' and 'b' as little-endian UTF-16 units
        assert_eq!(&buf[..], &[0, 0, 0, 4, b'a', 0, b'b', 0]);
        assert_eq!(simple_string_size("ab"), buf.len());
    }

    #[test]
    fn test_simple_string_non_bmp() {
        let value = "route-\u{1F680}";
        let mut buf = BytesMut::new();
        put_simple_string(&mut buf, value);
        assert_eq!(simple_string_size(value), buf.len());

        let mut read = buf.freeze();
        assert_eq!(get_simple_string(&mut read).unwrap(), value);
        assert!(!read.has_remaining());
    }

    #[test]
    fn test_truncated_string() {
        let mut buf = BytesMut::new();
        put_simple_string(&mut buf, "hello");
        let mut truncated = buf.freeze().slice(..7);

        let err = get_simple_string(&mut truncated).unwrap_err();
        assert!(matches!(err, ProtocolError::BufferUnderflow { .. }));
    }

    #[test]
    fn test_negative_length() {
        let mut buf = BytesMut::new();
        buf.put_i32(-2);
        let err = get_bytes(&mut buf.freeze()).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLength { length: -2 });
    }

    #[test]
    fn test_checked_getters() {
        let mut empty = Bytes::new();
        assert!(get_i64(&mut empty).is_err());
        assert!(get_u8(&mut empty).is_err());

        let mut buf = Bytes::from_static(&[0, 0, 0, 7]);
        assert_eq!(get_i32(&mut buf).unwrap(), 7);
    }
}
