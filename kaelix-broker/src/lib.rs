//! # Kaelix Broker
//!
//! Binding registry, router, diverts and queues for the Kaelix broker.
//!
//! This crate provides:
//! - A registry of queue and divert bindings indexed by wildcard address
//! - Routing with exclusive and non-exclusive diverts, chained with a hop
//!   limit and cycle guard
//! - Queues with acknowledgement, redelivery, dead-lettering, expiry and
//!   last-value collapsing
//! - Address settings resolved by pattern specificity
//! - A message store collaborator and replay on recovery
//!
//! ## Examples
//!
//! ```rust
//! use bytes::Bytes;
//! use kaelix_broker::Broker;
//! use kaelix_core::config::{KaelixConfig, QueueConfig};
//! use kaelix_core::Message;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Broker::new(KaelixConfig::default())?;
//! broker.create_queue(&QueueConfig {
//!     name: "orders".to_string(),
//!     address: "orders.*".to_string(),
//!     filter: None,
//!     durable: true,
//! })?;
//!
//! let result = broker.publish(Message::new("orders.eu", Bytes::from_static(b"hello"))?)?;
//! assert_eq!(result.queue_names(), vec!["orders"]);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod broker;
pub mod divert;
pub mod error;
pub mod queue;
pub mod registry;
pub mod routing;
pub mod settings;
pub mod storage;

pub use binding::{Binding, BindingId, BindingKind};
pub use broker::{Broker, BrokerStats};
pub use divert::Divert;
pub use error::{BrokerError, Result};
pub use queue::{CancelOutcome, MessageReference, Queue, ReferenceAction};
pub use registry::BindingRegistry;
pub use routing::{RoutePlan, Router, RouterStats, RoutingResult};
pub use settings::{AddressSettingsRepository, ResolvedSettings};
pub use storage::{MemoryMessageStore, MessageStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{Broker, BrokerError, CancelOutcome, ReferenceAction, RoutingResult};
    pub use kaelix_core::prelude::*;
}
