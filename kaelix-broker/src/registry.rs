//! Binding registry keyed by address pattern.

use crate::binding::{Binding, BindingId, BindingKind};
use crate::{BrokerError, Result};
use kaelix_core::address::{Address, AddressTrie, WildcardConfiguration};
use kaelix_core::Filter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct RegistryState {
    trie: AddressTrie<Arc<Binding>>,
    by_name: HashMap<String, Arc<Binding>>,
}

/// All bindings, indexed for wildcard lookup and by name.
///
/// Lookups take a read lock; registration and removal take the write lock,
/// so a lookup never sees a half-registered binding.
#[derive(Debug)]
pub struct BindingRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
}

impl BindingRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(wildcard: WildcardConfiguration) -> Self {
        Self {
            state: RwLock::new(RegistryState { trie: AddressTrie::new(wildcard), by_name: HashMap::new() }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wildcard syntax in use.
    #[must_use]
    pub fn wildcard(&self) -> WildcardConfiguration {
        self.state.read().trie.config().clone()
    }

    /// Register a binding.
    ///
    /// # Errors
    /// Returns `DuplicateBinding` when `name` is taken.
    pub fn add_binding(
        &self,
        name: impl Into<String>,
        address: Address,
        filter: Option<Filter>,
        kind: BindingKind,
    ) -> Result<Arc<Binding>> {
        let name = name.into();
        let mut state = self.state.write();
        if state.by_name.contains_key(&name) {
            return Err(BrokerError::DuplicateBinding { name });
        }

        let id = BindingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let binding = Arc::new(Binding { id, name: name.clone(), address, filter, kind });
        state.trie.insert(binding.address.as_str(), Arc::clone(&binding));
        state.by_name.insert(name, Arc::clone(&binding));
        debug!(binding = %binding.name, address = %binding.address, %id, "Binding added");
        Ok(binding)
    }

    /// Remove a binding by name.
    pub fn remove_binding(&self, name: &str) -> Option<Arc<Binding>> {
        let mut state = self.state.write();
        let binding = state.by_name.remove(name)?;
        let id = binding.id;
        state.trie.remove_where(binding.address.as_str(), |b| b.id == id);
        debug!(binding = %name, "Binding removed");
        Some(binding)
    }

    /// Binding by name.
    #[must_use]
    pub fn get_binding(&self, name: &str) -> Option<Arc<Binding>> {
        self.state.read().by_name.get(name).cloned()
    }

    /// Bindings whose pattern matches `address`, in registration order.
    #[must_use]
    pub fn bindings_for_address(&self, address: &str) -> Vec<Arc<Binding>> {
        let state = self.state.read();
        let mut found: Vec<Arc<Binding>> = state.trie.lookup(address).into_iter().cloned().collect();
        found.sort_by_key(|b| b.id);
        found
    }

    /// Every binding, in registration order.
    #[must_use]
    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        let mut all: Vec<_> = self.state.read().by_name.values().cloned().collect();
        all.sort_by_key(|b| b.id);
        all
    }

    /// Number of bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.state.read().by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::divert::Divert;

    fn divert(name: &str, address: &str) -> BindingKind {
        BindingKind::Divert(Arc::new(Divert::new(
            name,
            Address::new(address).unwrap(),
            Address::new("elsewhere").unwrap(),
            false,
        )))
    }

    fn add(registry: &BindingRegistry, name: &str, address: &str) -> Result<Arc<Binding>> {
        registry.add_binding(name, Address::new(address).unwrap(), None, divert(name, address))
    }

    #[test]
    fn test_wildcard_lookup_in_registration_order() {
        let registry = BindingRegistry::new(WildcardConfiguration::default());
        add(&registry, "any", "orders.#").unwrap();
        add(&registry, "exact", "orders.eu").unwrap();
        add(&registry, "single", "orders.*").unwrap();
        add(&registry, "other", "billing.*").unwrap();

        let names: Vec<_> = registry.bindings_for_address("orders.eu").iter().map(|b| b.name.clone()).collect();
        assert_eq!(names, vec!["any", "exact", "single"]);
        assert!(registry.bindings_for_address("shipping").is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = BindingRegistry::new(WildcardConfiguration::default());
        add(&registry, "x", "a").unwrap();
        assert_eq!(
            add(&registry, "x", "b").unwrap_err(),
            BrokerError::DuplicateBinding { name: "x".to_string() }
        );
        assert_eq!(registry.binding_count(), 1);
    }

    #[test]
    fn test_remove_only_named_binding() {
        let registry = BindingRegistry::new(WildcardConfiguration::default());
        add(&registry, "first", "a.b").unwrap();
        add(&registry, "second", "a.b").unwrap();

        assert!(registry.remove_binding("first").is_some());
        assert!(registry.remove_binding("first").is_none());
        let left: Vec<_> = registry.bindings_for_address("a.b").iter().map(|b| b.name.clone()).collect();
        assert_eq!(left, vec!["second"]);
        assert!(registry.get_binding("first").is_none());
    }
}
