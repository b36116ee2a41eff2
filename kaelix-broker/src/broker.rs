//! Broker facade: deployment, publishing, delivery bookkeeping and recovery.

use crate::binding::BindingKind;
use crate::divert::Divert;
use crate::queue::{CancelOutcome, MessageReference, Queue, ReferenceAction};
use crate::registry::BindingRegistry;
use crate::routing::{RoutePlan, Router, RouterStats, RoutingResult};
use crate::settings::AddressSettingsRepository;
use crate::storage::{MemoryMessageStore, MessageStore};
use crate::{BrokerError, Result};
use dashmap::DashMap;
use kaelix_core::address::Address;
use kaelix_core::config::{AddressSettings, ConfigValidator, DivertConfig, KaelixConfig, QueueConfig};
use kaelix_core::message::headers::{
    HDR_ACTUAL_EXPIRY_TIME, HDR_ORIGINAL_ADDRESS, HDR_ORIGINAL_QUEUE, HDR_ORIG_MESSAGE_ID,
};
use kaelix_core::message::MessageId;
use kaelix_core::{Filter, Message, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Broker-wide counters snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
    /// Router counters
    pub router: RouterStats,
    /// Deployed queues
    pub queue_count: usize,
    /// Deployed diverts
    pub divert_count: usize,
    /// Registered bindings
    pub binding_count: usize,
    /// Messages held across all queues
    pub messages_held: usize,
    /// Distinct messages currently persisted
    pub durable_messages: usize,
    /// Messages published
    pub messages_published: u64,
    /// Messages acknowledged
    pub messages_acknowledged: u64,
    /// Messages sent to a dead-letter address or dropped after exhausting
    /// delivery attempts
    pub messages_dead_lettered: u64,
    /// Messages removed by expiry
    pub messages_expired: u64,
}

/// The broker core.
#[derive(Debug)]
pub struct Broker {
    config: KaelixConfig,
    registry: Arc<BindingRegistry>,
    router: Router,
    settings: AddressSettingsRepository,
    queues: DashMap<String, Arc<Queue>>,
    diverts: DashMap<String, Arc<Divert>>,
    store: Arc<dyn MessageStore>,
    /// Durable queues holding each persisted message
    durable_refs: DashMap<MessageId, usize>,
    messages_published: AtomicU64,
    messages_acknowledged: AtomicU64,
    messages_dead_lettered: AtomicU64,
    messages_expired: AtomicU64,
}

impl Broker {
    /// Create a broker with an in-memory message store and deploy the
    /// configured queues and diverts.
    ///
    /// # Errors
    /// Returns an error when the configuration is invalid.
    pub fn new(config: KaelixConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryMessageStore::new()))
    }

    /// Create a broker persisting to `store`.
    ///
    /// Stored messages are not replayed until [`Broker::recover`] is called.
    ///
    /// # Errors
    /// Returns an error when the configuration is invalid.
    pub fn with_store(config: KaelixConfig, store: Arc<dyn MessageStore>) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let registry = Arc::new(BindingRegistry::new(config.wildcard.clone()));
        let broker = Self {
            router: Router::new(Arc::clone(&registry), config.routing.max_divert_hops),
            settings: AddressSettingsRepository::new(
                config.wildcard.clone(),
                config.delivery.clone(),
                config.address_settings.clone(),
            ),
            registry,
            queues: DashMap::new(),
            diverts: DashMap::new(),
            store,
            durable_refs: DashMap::new(),
            messages_published: AtomicU64::new(0),
            messages_acknowledged: AtomicU64::new(0),
            messages_dead_lettered: AtomicU64::new(0),
            messages_expired: AtomicU64::new(0),
            config,
        };

        for queue in &broker.config.queues {
            broker.create_queue(queue)?;
        }
        for divert in &broker.config.diverts {
            broker.create_divert(divert)?;
        }
        info!(
            queues = broker.queues.len(),
            diverts = broker.diverts.len(),
            address_settings = broker.config.address_settings.len(),
            "Broker deployed"
        );
        Ok(broker)
    }

    /// Configuration the broker was built from.
    #[must_use]
    pub const fn config(&self) -> &KaelixConfig {
        &self.config
    }

    /// Binding registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<BindingRegistry> {
        &self.registry
    }

    /// Router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Address settings repository.
    #[must_use]
    pub const fn address_settings(&self) -> &AddressSettingsRepository {
        &self.settings
    }

    /// Add or replace address settings. Queues pick settings up when they
    /// are created.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid pattern, a zero delivery
    /// attempt limit, or an invalid or wildcard dead-letter or expiry address.
    pub fn add_address_settings(&self, pattern: impl Into<String>, settings: AddressSettings) -> Result<()> {
        self.settings.add_match(pattern, settings)
    }

    /// Create and bind a queue.
    ///
    /// # Errors
    /// Returns `DuplicateBinding` when the name is taken, or a core error for
    /// an invalid address or filter.
    pub fn create_queue(&self, config: &QueueConfig) -> Result<Arc<Queue>> {
        let address = Address::new(config.address.as_str())?;
        let filter = Filter::parse_optional(config.filter.as_deref())?;
        let settings = self.settings.resolve(address.as_str());
        let queue = Arc::new(Queue::new(config.name.as_str(), address.clone(), config.durable, settings));

        self.registry
            .add_binding(config.name.as_str(), address, filter, BindingKind::Queue(Arc::clone(&queue)))?;
        self.queues.insert(config.name.clone(), Arc::clone(&queue));
        info!(
            queue = %config.name,
            address = %config.address,
            durable = config.durable,
            last_value = queue.is_last_value(),
            "Queue created"
        );
        Ok(queue)
    }

    /// Unbind and delete a queue, discarding its messages.
    ///
    /// # Errors
    /// Returns `QueueNotFound` when no such queue exists.
    pub fn delete_queue(&self, name: &str) -> Result<()> {
        let (_, queue) = self
            .queues
            .remove(name)
            .ok_or_else(|| BrokerError::QueueNotFound { name: name.to_string() })?;
        self.registry.remove_binding(name);

        let discarded = queue.drain();
        for reference in &discarded {
            self.release(&queue, &reference.message)?;
        }
        info!(queue = %name, discarded = discarded.len(), "Queue deleted");
        Ok(())
    }

    /// Create and bind a divert.
    ///
    /// # Errors
    /// Returns `DuplicateBinding` when the name is taken, or a core error for
    /// an invalid address or filter.
    pub fn create_divert(&self, config: &DivertConfig) -> Result<Arc<Divert>> {
        let address = Address::new(config.address.as_str())?;
        let forwarding_address = Address::new(config.forwarding_address.as_str())?;
        if forwarding_address.is_wildcard(&self.config.wildcard) {
            return Err(kaelix_core::Error::invalid_address(format!(
                "divert '{}' cannot forward to wildcard address '{forwarding_address}'",
                config.name
            ))
            .into());
        }
        if forwarding_address == address {
            return Err(kaelix_core::Error::invalid_address(format!(
                "divert '{}' cannot forward to its own address '{address}'",
                config.name
            ))
            .into());
        }
        let filter = Filter::parse_optional(config.filter.as_deref())?;
        let divert = Arc::new(Divert::new(config.name.as_str(), address.clone(), forwarding_address, config.exclusive));

        self.registry
            .add_binding(config.name.as_str(), address, filter, BindingKind::Divert(Arc::clone(&divert)))?;
        self.diverts.insert(config.name.clone(), Arc::clone(&divert));
        info!(
            divert = %config.name,
            address = %config.address,
            forwarding_address = %config.forwarding_address,
            exclusive = config.exclusive,
            "Divert created"
        );
        Ok(divert)
    }

    /// Unbind a divert.
    ///
    /// # Errors
    /// Returns `DivertNotFound` when no such divert exists.
    pub fn destroy_divert(&self, name: &str) -> Result<()> {
        self.diverts
            .remove(name)
            .ok_or_else(|| BrokerError::DivertNotFound { name: name.to_string() })?;
        self.registry.remove_binding(name);
        info!(divert = %name, "Divert destroyed");
        Ok(())
    }

    /// Queue by name.
    #[must_use]
    pub fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|q| Arc::clone(q.value()))
    }

    /// Divert by name.
    #[must_use]
    pub fn divert(&self, name: &str) -> Option<Arc<Divert>> {
        self.diverts.get(name).map(|d| Arc::clone(d.value()))
    }

    /// Names of deployed queues, sorted.
    #[must_use]
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Route a message to its address.
    ///
    /// Durable messages reaching durable queues are persisted before any
    /// queue holds them, so a consumer never sees an unpersisted message.
    ///
    /// # Errors
    /// Returns an error when the store rejects the message; nothing is
    /// enqueued in that case.
    pub fn publish(&self, message: Message) -> Result<RoutingResult> {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        let plan = self.router.plan(&message, &message.address);
        self.commit(plan, true)
    }

    /// Take the next message from a queue.
    ///
    /// # Errors
    /// Returns `QueueNotFound` when no such queue exists.
    pub fn receive(&self, queue: &str) -> Result<Option<MessageReference>> {
        Ok(self.require_queue(queue)?.poll())
    }

    /// Acknowledge a delivered message.
    ///
    /// # Errors
    /// Returns `QueueNotFound` or `ReferenceNotFound`.
    pub fn acknowledge(&self, queue: &str, id: MessageId) -> Result<()> {
        let queue = self.require_queue(queue)?;
        let reference = queue.acknowledge(id)?;
        self.messages_acknowledged.fetch_add(1, Ordering::Relaxed);
        self.release(&queue, &reference.message)
    }

    /// Give a delivered message back. Once its delivery attempts are
    /// exhausted it is sent to the dead-letter address, or dropped when the
    /// queue has none.
    ///
    /// # Errors
    /// Returns `QueueNotFound` or `ReferenceNotFound`, or a store error while
    /// dead-lettering.
    pub fn cancel_delivery(&self, queue: &str, id: MessageId) -> Result<CancelOutcome> {
        let queue = self.require_queue(queue)?;
        let outcome = queue.cancel(id)?;

        if let CancelOutcome::DeadLetter { reference, address } = &outcome {
            self.messages_dead_lettered.fetch_add(1, Ordering::Relaxed);
            match address {
                Some(address) => {
                    let copy = Self::forward_copy(&reference.message, &queue, address);
                    let routed = self.publish(copy)?;
                    if routed.is_empty() {
                        warn!(queue = %queue.name(), %address, "Dead-letter address has no queues; message dropped");
                    }
                },
                None => warn!(queue = %queue.name(), message = %id, "No dead-letter address; message dropped"),
            }
            self.release(&queue, &reference.message)?;
        }
        Ok(outcome)
    }

    /// Remove messages expired at `now` from every queue, sending each to
    /// its queue's expiry address when one is set.
    ///
    /// # Errors
    /// Returns a store error while forwarding.
    pub fn expire_messages(&self, now: Timestamp) -> Result<usize> {
        let queues: Vec<Arc<Queue>> = self.queues.iter().map(|e| Arc::clone(e.value())).collect();
        let mut total = 0;

        for queue in queues {
            let expired = queue.expire(now);
            for reference in &expired {
                if let Some(address) = &queue.settings().expiry_address {
                    let mut copy = Self::forward_copy(&reference.message, &queue, address);
                    copy.properties.put_long(HDR_ACTUAL_EXPIRY_TIME, now.timestamp_millis());
                    copy.expiration = None;
                    self.publish(copy)?;
                }
                self.release(&queue, &reference.message)?;
            }
            if !expired.is_empty() {
                debug!(queue = %queue.name(), count = expired.len(), "Expired messages");
            }
            total += expired.len();
        }

        self.messages_expired.fetch_add(total as u64, Ordering::Relaxed);
        Ok(total)
    }

    /// Replay persisted messages into the durable queues bound to their
    /// addresses. Messages no queue accepts any more are removed from the
    /// store.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn recover(&self) -> Result<usize> {
        let messages = self.store.load()?;
        let mut recovered = 0;

        for message in messages {
            let id = message.id;
            let plan = self.router.plan_replay(Arc::new(message));
            if plan.is_empty() {
                debug!(message = %id, "No durable queue for stored message; removing");
                self.store.remove(&id)?;
                continue;
            }
            self.commit(plan, false)?;
            recovered += 1;
        }

        info!(recovered, "Recovered persisted messages");
        Ok(recovered)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            router: self.router.stats(),
            queue_count: self.queues.len(),
            divert_count: self.diverts.len(),
            binding_count: self.registry.binding_count(),
            messages_held: self.queues.iter().map(|e| e.value().message_count()).sum(),
            durable_messages: self.durable_refs.len(),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_acknowledged: self.messages_acknowledged.load(Ordering::Relaxed),
            messages_dead_lettered: self.messages_dead_lettered.load(Ordering::Relaxed),
            messages_expired: self.messages_expired.load(Ordering::Relaxed),
        }
    }

    fn require_queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.queue(name).ok_or_else(|| BrokerError::QueueNotFound { name: name.to_string() })
    }

    /// Copy of `message` bound for `address`, recording where it came from.
    fn forward_copy(message: &Message, queue: &Queue, address: &Address) -> Message {
        let mut copy = message.copy();
        copy.properties.put_string(HDR_ORIGINAL_ADDRESS, message.address.as_str());
        copy.properties.put_string(HDR_ORIGINAL_QUEUE, queue.name());
        copy.properties.put_string(HDR_ORIG_MESSAGE_ID, message.id.to_string());
        copy.address = address.clone();
        copy
    }

    /// Apply a routing plan. Durable references are persisted (when
    /// `persist` is set) and counted before the queues see the message;
    /// last-value replacements are released afterwards.
    fn commit(&self, plan: RoutePlan, persist: bool) -> Result<RoutingResult> {
        let mut held: HashMap<MessageId, (Arc<Message>, usize)> = HashMap::new();
        for (queue, message) in plan.deliveries() {
            if message.durable && queue.is_durable() {
                held.entry(message.id).or_insert_with(|| (Arc::clone(message), 0)).1 += 1;
            }
        }

        if persist {
            self.persist(&held)?;
        }
        for (id, (_, count)) in &held {
            *self.durable_refs.entry(*id).or_insert(0) += count;
        }

        let result = self.router.commit(plan);
        for reference in &result.references {
            if let ReferenceAction::Replaced { previous } = reference.action {
                if reference.queue.is_durable() {
                    self.release_id(previous)?;
                }
            }
        }
        Ok(result)
    }

    /// Append every held message, removing the ones already written when a
    /// later append fails.
    fn persist(&self, held: &HashMap<MessageId, (Arc<Message>, usize)>) -> Result<()> {
        let mut written = Vec::with_capacity(held.len());
        for (id, (message, _)) in held {
            if let Err(e) = self.store.append(message) {
                for id in &written {
                    if let Err(undo) = self.store.remove(id) {
                        warn!(message = %id, error = %undo, "Failed to roll back persisted message");
                    }
                }
                warn!(message = %id, error = %e, "Store rejected message; nothing enqueued");
                return Err(e);
            }
            written.push(*id);
        }
        Ok(())
    }

    fn release(&self, queue: &Queue, message: &Message) -> Result<()> {
        if message.durable && queue.is_durable() {
            self.release_id(message.id)?;
        }
        Ok(())
    }

    fn release_id(&self, id: MessageId) -> Result<()> {
        let gone = match self.durable_refs.get_mut(&id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            },
            None => return Ok(()),
        };
        if gone {
            self.durable_refs.remove_if(&id, |_, count| *count == 0);
            self.store.remove(&id)?;
        }
        Ok(())
    }
}
