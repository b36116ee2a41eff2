//! # Kaelix Core
//!
//! Message model and addressing primitives for the Kaelix broker.
//!
//! ## Features
//!
//! - **Typed properties**: self-describing property maps with a compact
//!   length-prefixed binary encoding and JMS-style type conversions
//! - **Wildcard addressing**: `*` / `#` pattern matching and a segment trie
//!   that finds every pattern matching an address
//! - **Filters**: JMS selector expressions over properties and headers
//! - **Message records**: checksummed, self-delimiting records for replay
//!
//! ## Quick Start
//!
//! ```rust
//! use kaelix_core::{address, Message};
//! use bytes::Bytes;
//!
//! # fn main() -> kaelix_core::Result<()> {
//! let message = Message::builder()
//!     .address("orders.eu.created")
//!     .body(Bytes::from("Hello, Kaelix!"))
//!     .property("region", "eu")
//!     .build()?;
//!
//! assert!(address::matches("orders.*.created", message.address.as_str()));
//! assert_eq!(message.properties.get_string("region")?.as_deref(), Some("eu"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`properties`]: typed property container and its wire encoding
//! - [`address`]: addresses, wildcard matching and the address trie
//! - [`filter`]: selector parsing and evaluation
//! - [`message`]: messages, builders and header names
//! - [`protocol`]: message record encoding and streaming decoding
//! - [`config`]: configuration schema, loading and validation
//! - [`telemetry`]: log subscriber bootstrap
//! - [`error`]: error types and result handling

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod config;
pub mod error;
pub mod filter;
pub mod message;
pub mod prelude;
pub mod properties;
pub mod protocol;
pub mod telemetry;
pub mod types;

pub use crate::{
    address::{Address, AddressTrie, WildcardConfiguration},
    config::KaelixConfig,
    error::{Error, Result},
    filter::{Filter, FilterContext},
    message::{Message, MessageBuilder, MessageId},
    properties::{PropertyType, PropertyValue, TypedProperties},
    types::Timestamp,
};
