//! Bindings: queues and diverts attached to an address.

use crate::divert::Divert;
use crate::queue::Queue;
use kaelix_core::address::Address;
use kaelix_core::{Filter, Message};
use std::fmt;
use std::sync::Arc;

/// Registry-assigned binding id; increases with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// What a binding delivers to.
#[derive(Debug, Clone)]
pub enum BindingKind {
    /// Store matching messages in a queue
    Queue(Arc<Queue>),
    /// Forward matching messages elsewhere
    Divert(Arc<Divert>),
}

/// A named queue or divert bound to an address pattern.
#[derive(Debug)]
pub struct Binding {
    /// Registry id
    pub id: BindingId,
    /// Unique name
    pub name: String,
    /// Address or wildcard pattern
    pub address: Address,
    /// Optional filter; `None` accepts everything
    pub filter: Option<Filter>,
    /// Target
    pub kind: BindingKind,
}

impl Binding {
    /// Whether this is an exclusive divert.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        matches!(&self.kind, BindingKind::Divert(d) if d.is_exclusive())
    }

    /// Whether this binding is a queue.
    #[must_use]
    pub const fn is_queue(&self) -> bool {
        matches!(self.kind, BindingKind::Queue(_))
    }

    /// Whether `message` passes the filter.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(message))
    }
}
