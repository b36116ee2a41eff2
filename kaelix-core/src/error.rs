//! Error types for the Kaelix core library.

use crate::protocol::ProtocolError;
use thiserror::Error;

/// Main error type for Kaelix core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A typed property could not be read as the requested type
    #[error("Property conversion failed for '{key}': {message}")]
    PropertyConversion { key: String, message: String },

    /// Wire encoding or decoding failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Empty or malformed address
    #[error("Invalid address: {message}")]
    InvalidAddress { message: String },

    /// Filter expression failed to parse
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Invalid message format or content
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for Kaelix operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a property conversion error.
    pub fn property_conversion(key: &str, message: impl Into<String>) -> Self {
        Self::PropertyConversion { key: key.to_string(), message: message.into() }
    }

    /// Build an invalid address error.
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::InvalidAddress { message: message.into() }
    }

    /// Build an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter { message: message.into() }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Configuration(format!("I/O error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(format!("Failed to parse TOML: {err}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Configuration(format!("Failed to serialize TOML: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Configuration(format!("Validation failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::property_conversion("qty", "cannot convert bytes to int");
        assert_eq!(err.to_string(), "Property conversion failed for 'qty': cannot convert bytes to int");

        let err: Error = ProtocolError::InvalidPropertyType { type_tag: 77 }.into();
        assert_eq!(err.to_string(), "Protocol error: Invalid property type: 77");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(Error::from(io), Error::Configuration(_)));
    }
}
