//! # Prelude
//!
//! Commonly used types and traits from Kaelix Core.

pub use crate::{
    address::{Address, AddressTrie, WildcardConfiguration},
    config::{ConfigLoader, KaelixConfig},
    error::{Error, Result},
    filter::{Filter, FilterContext},
    message::{Message, MessageBuilder, MessageId},
    properties::{PropertyValue, TypedProperties},
    protocol::{MessageDecoder, MessageEncoder},
    types::Timestamp,
};

pub use bytes::Bytes;
pub use chrono::{DateTime, Utc};
