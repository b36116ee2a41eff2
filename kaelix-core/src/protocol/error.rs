//! Protocol-specific error types and handling.

use thiserror::Error;

/// Errors raised while reading or writing the binary wire encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unrecognized property type tag. The container being decoded must not be used.
    #[error("Invalid property type: {type_tag}")]
    InvalidPropertyType {
        /// Tag byte found on the wire.
        type_tag: u8,
    },

    /// Container marker byte is neither the null nor the not-null marker.
    #[error("Invalid container marker: {marker}")]
    InvalidMarker {
        /// Marker byte found on the wire.
        marker: u8,
    },

    /// Buffer ended before a complete value could be read.
    #[error("Buffer underflow: need {required} bytes, {remaining} remaining")]
    BufferUnderflow {
        /// Bytes needed by the reader.
        required: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Length prefix is negative, odd for a UTF-16 payload, or otherwise unusable.
    #[error("Invalid length prefix: {length}")]
    InvalidLength {
        /// Raw length read from the wire.
        length: i32,
    },

    /// String payload is not valid UTF-16.
    #[error("Invalid string encoding: {message}")]
    InvalidString {
        /// Error message.
        message: String,
    },

    /// Invalid record magic bytes.
    #[error("Invalid record magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: [u8; 4],
        /// Actual magic bytes found.
        actual: [u8; 4],
    },

    /// Unsupported record version.
    #[error("Unsupported protocol version: {version} (supported: {supported})")]
    UnsupportedVersion {
        /// Protocol version found.
        version: u8,
        /// Supported version.
        supported: u8,
    },

    /// Record size exceeds maximum allowed.
    #[error("Record size {actual} exceeds maximum {max}")]
    RecordTooLarge {
        /// Actual record size.
        actual: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Checksum mismatch indicating corruption.
    #[error("Checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from the record header.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Record encoding error.
    #[error("Encoding error: {message}")]
    EncodingError {
        /// Error message.
        message: String,
    },

    /// Record decoding error.
    #[error("Decoding error: {message}")]
    DecodingError {
        /// Error message.
        message: String,
    },
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    /// Create an encoding error with a message.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::EncodingError { message: message.into() }
    }

    /// Create a decoding error with a message.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::DecodingError { message: message.into() }
    }

    /// Check if this error indicates record corruption that a streaming
    /// decoder can skip past.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::ChecksumMismatch { .. }
                | Self::InvalidPropertyType { .. }
                | Self::InvalidMarker { .. }
                | Self::InvalidString { .. }
                | Self::InvalidLength { .. }
        )
    }

    /// Check if this error indicates a protocol violation.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::UnsupportedVersion { .. } | Self::RecordTooLarge { .. })
    }
}
