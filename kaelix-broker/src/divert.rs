//! Diverts: forwarding rules between addresses.

use kaelix_core::address::Address;
use kaelix_core::message::headers::{HDR_ORIGINAL_ADDRESS, HDR_ORIG_MESSAGE_ID};
use kaelix_core::Message;

/// Forwards copies of messages published to one address to another.
///
/// An exclusive divert claims the message: nothing else bound to the source
/// address receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divert {
    name: String,
    address: Address,
    forwarding_address: Address,
    exclusive: bool,
}

impl Divert {
    /// Create a divert.
    #[must_use]
    pub fn new(name: impl Into<String>, address: Address, forwarding_address: Address, exclusive: bool) -> Self {
        Self { name: name.into(), address, forwarding_address, exclusive }
    }

    /// Divert name, unique among bindings.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source address or pattern.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Destination of forwarded copies.
    #[must_use]
    pub const fn forwarding_address(&self) -> &Address {
        &self.forwarding_address
    }

    /// Whether the divert claims the messages it forwards.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Copy `message` for forwarding: new id, address rewritten, origin
    /// recorded in headers.
    #[must_use]
    pub fn transform(&self, message: &Message) -> Message {
        let mut copy = message.copy();
        copy.properties.put_string(HDR_ORIGINAL_ADDRESS, message.address.as_str());
        copy.properties.put_string(HDR_ORIG_MESSAGE_ID, message.id.to_string());
        copy.address = self.forwarding_address.clone();
        copy
    }
}
