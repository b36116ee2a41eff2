//! Broker error types.

use kaelix_core::message::MessageId;
use thiserror::Error;

/// Errors raised by binding management and delivery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// Failure in the core library (addresses, filters, config, codec)
    #[error(transparent)]
    Core(#[from] kaelix_core::Error),

    /// A binding with this name already exists
    #[error("Binding '{name}' already exists")]
    DuplicateBinding {
        /// Rejected binding name
        name: String,
    },

    /// No queue with this name
    #[error("Queue '{name}' not found")]
    QueueNotFound {
        /// Requested queue name
        name: String,
    },

    /// No divert with this name
    #[error("Divert '{name}' not found")]
    DivertNotFound {
        /// Requested divert name
        name: String,
    },

    /// The message is not being delivered from this queue
    #[error("Message {id} is not in delivery on queue '{queue}'")]
    ReferenceNotFound {
        /// Queue name
        queue: String,
        /// Message id
        id: MessageId,
    },

    /// The message store failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },
}

impl BrokerError {
    /// Build a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }
}

impl From<kaelix_core::protocol::ProtocolError> for BrokerError {
    fn from(err: kaelix_core::protocol::ProtocolError) -> Self {
        Self::Storage { message: err.to_string() }
    }
}

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
