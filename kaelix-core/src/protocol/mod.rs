//! Binary wire encoding shared by typed properties and message records.
//!
//! All integers are big-endian. Strings use the simple-string layout: a
//! 4-byte byte length followed by UTF-16 code units, each written low byte
//! first. Property containers are embedded verbatim inside message records,
//! so the type tags below are shared by every encoder in the crate.
//!
//! ## Record Structure
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | Magic                             | Ver    | Flags  | Reserved        |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | Body Length                       | CRC32 Checksum                    |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | Body: id, address, headers, typed properties, payload (variable)      |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kaelix_core::protocol::{MessageDecoder, MessageEncoder};
//! use kaelix_core::Message;
//! use bytes::Bytes;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut message = Message::new("orders.eu", Bytes::from_static(b"hello"))?;
//! message.properties.put_int("quantity", 3);
//!
//! let mut encoder = MessageEncoder::new();
//! let encoded = encoder.encode(&message)?;
//!
//! let mut decoder = MessageDecoder::new();
//! let decoded = decoder.decode(&encoded)?.unwrap();
//! assert_eq!(message, decoded);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod record;
pub mod wire;

pub use codec::{DecoderStats, MessageDecoder, MessageEncoder};
pub use error::{ProtocolError, ProtocolResult};
pub use record::{PROTOCOL_MAGIC, PROTOCOL_VERSION, RECORD_HEADER_SIZE};

/// Type tags and size constants of the binary encoding.
pub mod data_constants {
    /// Container marker: no properties were ever written.
    pub const NULL: u8 = 0;
    /// Container marker: entry count and entries follow.
    pub const NOT_NULL: u8 = 1;

    /// Encoded boolean `true`.
    pub const TRUE: u8 = 1;
    /// Encoded boolean `false`.
    pub const FALSE: u8 = 0;

    /// Property type tag for a null value (shares the value of [`NULL`]).
    pub const NULL_TYPE: u8 = 0;
    /// Property type tag for booleans.
    pub const BOOLEAN: u8 = 2;
    /// Property type tag for signed bytes.
    pub const BYTE: u8 = 3;
    /// Property type tag for byte arrays.
    pub const BYTES: u8 = 4;
    /// Property type tag for 16-bit integers.
    pub const SHORT: u8 = 5;
    /// Property type tag for 32-bit integers.
    pub const INT: u8 = 6;
    /// Property type tag for 64-bit integers.
    pub const LONG: u8 = 7;
    /// Property type tag for 32-bit floats.
    pub const FLOAT: u8 = 8;
    /// Property type tag for 64-bit floats.
    pub const DOUBLE: u8 = 9;
    /// Property type tag for strings.
    pub const STRING: u8 = 10;
    /// Property type tag for UTF-16 code units.
    pub const CHAR: u8 = 11;

    /// Encoded size of a byte.
    pub const SIZE_BYTE: usize = 1;
    /// Encoded size of a boolean.
    pub const SIZE_BOOLEAN: usize = 1;
    /// Encoded size of a short or char.
    pub const SIZE_SHORT: usize = 2;
    /// Encoded size of a char.
    pub const SIZE_CHAR: usize = 2;
    /// Encoded size of an int or float.
    pub const SIZE_INT: usize = 4;
    /// Encoded size of a float.
    pub const SIZE_FLOAT: usize = 4;
    /// Encoded size of a long or double.
    pub const SIZE_LONG: usize = 8;
    /// Encoded size of a double.
    pub const SIZE_DOUBLE: usize = 8;
}

/// Protocol constants for record handling.
pub mod constants {
    /// Maximum record body size in bytes (16MB).
    pub const MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;

    /// Minimum record size (header only).
    pub const MIN_RECORD_SIZE: usize = super::RECORD_HEADER_SIZE;

    /// Maximum record size (header + max body).
    pub const MAX_RECORD_SIZE: usize = super::RECORD_HEADER_SIZE + MAX_BODY_SIZE as usize;
}
