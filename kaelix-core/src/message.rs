//! Broker messages.

use crate::address::Address;
use crate::properties::TypedProperties;
use crate::types::{self, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Well-known property names set by the broker.
pub mod headers {
    /// Property whose value groups messages in a last-value queue.
    pub const HDR_LAST_VALUE_NAME: &str = "_AMQ_LVQ_NAME";
    /// Address a message was published to before a divert or dead-lettering.
    pub const HDR_ORIGINAL_ADDRESS: &str = "_AMQ_ORIG_ADDRESS";
    /// Id of the message a diverted copy was made from.
    pub const HDR_ORIG_MESSAGE_ID: &str = "_AMQ_ORIG_MESSAGE_ID";
    /// Queue a dead-lettered or expired message was removed from.
    pub const HDR_ORIGINAL_QUEUE: &str = "_AMQ_ORIG_QUEUE";
    /// Expiration time (epoch millis) of an expired message.
    pub const HDR_ACTUAL_EXPIRY_TIME: &str = "_AMQ_ACTUAL_EXPIRY";
}

/// Lowest message priority.
pub const MIN_PRIORITY: u8 = 0;
/// Highest message priority.
pub const MAX_PRIORITY: u8 = 9;
/// Priority of a message that does not set one.
pub const DEFAULT_PRIORITY: u8 = 4;

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new unique message ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a message ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message with headers, typed properties and an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier
    pub id: MessageId,

    /// Address the message is routed by
    pub address: Address,

    /// Message body (zero-copy)
    pub body: Bytes,

    /// Whether the message survives a restart
    pub durable: bool,

    /// Delivery priority, 0 to 9
    pub priority: u8,

    /// Creation time
    pub timestamp: Timestamp,

    /// Time after which the message is no longer delivered
    pub expiration: Option<Timestamp>,

    /// Validated user of the producer
    pub user_id: Option<String>,

    /// Application and broker properties
    pub properties: TypedProperties,
}

impl Message {
    /// Create a non-durable message with default priority.
    ///
    /// # Errors
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>, body: Bytes) -> crate::Result<Self> {
        Ok(Self {
            id: MessageId::new(),
            address: Address::new(address)?,
            body,
            durable: false,
            priority: DEFAULT_PRIORITY,
            timestamp: types::now(),
            expiration: None,
            user_id: None,
            properties: TypedProperties::new(),
        })
    }

    /// Create a message builder for more complex construction.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Copy the message under a new id. Properties are deep-copied.
    #[must_use]
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        copy.id = MessageId::new();
        copy
    }

    /// Check whether the message expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }

    /// Value of the last-value property `key` rendered as a string.
    ///
    /// Byte-array values never group and read as `None`.
    #[must_use]
    pub fn last_value(&self, key: &str) -> Option<String> {
        self.properties.get_string(key).ok().flatten()
    }

    /// Get the body size in bytes.
    #[must_use]
    pub fn body_size(&self) -> usize {
        self.body.len()
    }

    /// Rough in-memory footprint in bytes.
    #[must_use]
    pub fn memory_estimate(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.address.as_str().len()
            + self.body.len()
            + self.user_id.as_ref().map_or(0, String::len)
            + self.properties.memory_offset()
    }
}

/// Builder for constructing messages with various options.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    address: Option<String>,
    body: Option<Bytes>,
    durable: bool,
    priority: Option<u8>,
    expiration: Option<Timestamp>,
    user_id: Option<String>,
    properties: TypedProperties,
}

impl MessageBuilder {
    /// Set the message address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the message body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Mark the message durable.
    #[must_use]
    pub const fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Set the delivery priority.
    #[must_use]
    pub const fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the expiration time.
    #[must_use]
    pub const fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the producer's user id.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add a typed property.
    #[must_use]
    pub fn property(
        self,
        key: impl Into<String>,
        value: impl Into<crate::properties::PropertyValue>,
    ) -> Self {
        self.properties.put(key, value);
        self
    }

    /// Build the message.
    ///
    /// # Errors
    /// Returns an error if the address is missing or invalid, or the
    /// priority is above 9.
    pub fn build(self) -> crate::Result<Message> {
        let address = self.address.ok_or_else(|| crate::Error::InvalidMessage {
            message: "Address is required".to_string(),
        })?;

        let priority = self.priority.unwrap_or(DEFAULT_PRIORITY);
        if priority > MAX_PRIORITY {
            return Err(crate::Error::InvalidMessage {
                message: format!("Priority {priority} is outside {MIN_PRIORITY}..={MAX_PRIORITY}"),
            });
        }

        Ok(Message {
            id: MessageId::new(),
            address: Address::new(address)?,
            body: self.body.unwrap_or_default(),
            durable: self.durable,
            priority,
            timestamp: types::now(),
            expiration: self.expiration,
            user_id: self.user_id,
            properties: self.properties,
        })
    }
}
