//! Queues: delivery, redelivery, expiry and last-value collapsing.

use crate::settings::ResolvedSettings;
use crate::{BrokerError, Result};
use kaelix_core::address::Address;
use kaelix_core::message::MessageId;
use kaelix_core::{Message, Timestamp};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A message held by a queue, with its delivery count.
#[derive(Debug, Clone)]
pub struct MessageReference {
    /// Shared message; the same message may sit in several queues
    pub message: Arc<Message>,
    /// Deliveries so far
    pub delivery_count: u32,
    /// Last-value key read once when the queue accepted the message
    last_value: Option<String>,
}

impl MessageReference {
    fn new(message: Arc<Message>, last_value: Option<String>) -> Self {
        Self { message, delivery_count: 0, last_value }
    }

    /// Id of the referenced message.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.message.id
    }
}

/// Outcome of adding a message to a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceAction {
    /// Appended as a new reference
    Added,
    /// Took the place of an undelivered reference with the same last-value key
    Replaced {
        /// Id of the message that was dropped
        previous: MessageId,
    },
}

/// Outcome of cancelling a delivery.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// Back at the head of the queue
    Redelivered {
        /// Deliveries so far
        delivery_count: u32,
    },
    /// Delivery attempts exhausted; removed from the queue
    DeadLetter {
        /// The removed reference
        reference: MessageReference,
        /// Where it should go; dropped when unset
        address: Option<Address>,
    },
}

/// Position of an undelivered reference; never reused within a queue.
type Slot = u64;

#[derive(Debug, Default)]
struct QueueState {
    /// Undelivered slots in delivery order
    order: VecDeque<Slot>,
    pending: HashMap<Slot, MessageReference>,
    /// Last-value key to the undelivered slot a newer message replaces
    last_values: HashMap<String, Slot>,
    next_slot: Slot,
    delivering: HashMap<MessageId, MessageReference>,
    /// Expired references found by `poll`, handed out by the next `expire`
    expired: Vec<MessageReference>,
}

impl QueueState {
    fn push(&mut self, reference: MessageReference, front: bool) {
        let slot = self.next_slot;
        self.next_slot += 1;
        if let Some(key) = &reference.last_value {
            self.last_values.entry(key.clone()).or_insert(slot);
        }
        self.pending.insert(slot, reference);
        if front {
            self.order.push_front(slot);
        } else {
            self.order.push_back(slot);
        }
    }

    fn pop_front(&mut self) -> Option<MessageReference> {
        while let Some(slot) = self.order.pop_front() {
            if let Some(reference) = self.take(slot) {
                return Some(reference);
            }
        }
        None
    }

    /// Remove a slot's reference, dropping its key from the index when the
    /// index points at it.
    fn take(&mut self, slot: Slot) -> Option<MessageReference> {
        let reference = self.pending.remove(&slot)?;
        if let Some(key) = &reference.last_value {
            if self.last_values.get(key) == Some(&slot) {
                self.last_values.remove(key);
            }
        }
        Some(reference)
    }
}

/// Queue counters.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// References added, including replacements
    pub messages_added: AtomicU64,
    /// References acknowledged
    pub messages_acknowledged: AtomicU64,
    /// References replaced by a newer last-value message
    pub messages_replaced: AtomicU64,
    /// References removed because they expired
    pub messages_expired: AtomicU64,
    /// References removed after too many delivery attempts
    pub messages_killed: AtomicU64,
}

/// A queue bound to an address.
#[derive(Debug)]
pub struct Queue {
    name: String,
    address: Address,
    durable: bool,
    settings: ResolvedSettings,
    state: Mutex<QueueState>,
    stats: QueueStats,
}

impl Queue {
    /// Create an empty queue.
    #[must_use]
    pub fn new(name: impl Into<String>, address: Address, durable: bool, settings: ResolvedSettings) -> Self {
        Self {
            name: name.into(),
            address,
            durable,
            settings,
            state: Mutex::new(QueueState::default()),
            stats: QueueStats::default(),
        }
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound address or pattern.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Whether durable messages in this queue are persisted.
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        self.durable
    }

    /// Settings resolved for the queue's address at creation.
    #[must_use]
    pub const fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    /// Whether this is a last-value queue.
    #[must_use]
    pub fn is_last_value(&self) -> bool {
        self.settings.last_value_key.is_some()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Add a message.
    ///
    /// In a last-value queue an undelivered reference carrying the same
    /// last-value key is replaced in place, found through the key index
    /// rather than a scan. References in delivery are never replaced.
    pub fn add(&self, message: Arc<Message>) -> ReferenceAction {
        let key = self.settings.last_value_key.as_deref().and_then(|k| message.last_value(k));
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.stats.messages_added.fetch_add(1, Ordering::Relaxed);

        if let Some(key) = key.as_deref() {
            let existing = state.last_values.get(key).and_then(|slot| state.pending.get_mut(slot));
            if let Some(reference) = existing {
                let previous = reference.id();
                *reference = MessageReference::new(message, Some(key.to_string()));
                self.stats.messages_replaced.fetch_add(1, Ordering::Relaxed);
                debug!(queue = %self.name, %key, %previous, "Replaced last-value reference");
                return ReferenceAction::Replaced { previous };
            }
        }

        state.push(MessageReference::new(message, key), false);
        ReferenceAction::Added
    }

    /// Take the next deliverable reference, moving it into delivery.
    ///
    /// Expired references met on the way are set aside for [`Queue::expire`].
    pub fn poll(&self) -> Option<MessageReference> {
        let now = kaelix_core::types::now();
        let mut state = self.state.lock();
        while let Some(mut reference) = state.pop_front() {
            if reference.message.is_expired(now) {
                state.expired.push(reference);
                continue;
            }
            reference.delivery_count += 1;
            state.delivering.insert(reference.id(), reference.clone());
            return Some(reference);
        }
        None
    }

    /// Acknowledge a delivered message, removing it for good.
    ///
    /// # Errors
    /// Returns `ReferenceNotFound` when `id` is not in delivery.
    pub fn acknowledge(&self, id: MessageId) -> Result<MessageReference> {
        let reference = self.state.lock().delivering.remove(&id).ok_or_else(|| self.not_found(id))?;
        self.stats.messages_acknowledged.fetch_add(1, Ordering::Relaxed);
        Ok(reference)
    }

    /// Return a delivered message to the head of the queue, or dead-letter it
    /// once `max_delivery_attempts` deliveries have failed.
    ///
    /// # Errors
    /// Returns `ReferenceNotFound` when `id` is not in delivery.
    pub fn cancel(&self, id: MessageId) -> Result<CancelOutcome> {
        let mut state = self.state.lock();
        let reference = state.delivering.remove(&id).ok_or_else(|| self.not_found(id))?;

        if reference.delivery_count >= self.settings.max_delivery_attempts {
            drop(state);
            self.stats.messages_killed.fetch_add(1, Ordering::Relaxed);
            warn!(
                queue = %self.name,
                message = %id,
                attempts = reference.delivery_count,
                dead_letter_address = ?self.settings.dead_letter_address.as_ref().map(Address::as_str),
                "Delivery attempts exhausted"
            );
            return Ok(CancelOutcome::DeadLetter {
                reference,
                address: self.settings.dead_letter_address.clone(),
            });
        }

        let delivery_count = reference.delivery_count;
        state.push(reference, true);
        Ok(CancelOutcome::Redelivered { delivery_count })
    }

    /// Remove every undelivered reference expired at `now`, together with
    /// those `poll` set aside.
    pub fn expire(&self, now: Timestamp) -> Vec<MessageReference> {
        let mut state = self.state.lock();
        let mut expired = std::mem::take(&mut state.expired);
        let order = std::mem::take(&mut state.order);
        for slot in order {
            let stale = state.pending.get(&slot).is_some_and(|r| r.message.is_expired(now));
            if !stale {
                state.order.push_back(slot);
            } else if let Some(reference) = state.take(slot) {
                expired.push(reference);
            }
        }
        drop(state);

        self.stats.messages_expired.fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired
    }

    /// Remove every reference, pending or in delivery.
    pub fn drain(&self) -> Vec<MessageReference> {
        let mut state = self.state.lock();
        let mut all = Vec::with_capacity(state.pending.len() + state.delivering.len() + state.expired.len());
        while let Some(reference) = state.pop_front() {
            all.push(reference);
        }
        all.extend(state.delivering.drain().map(|(_, r)| r));
        all.append(&mut state.expired);
        all
    }

    /// Messages held: undelivered plus in delivery.
    #[must_use]
    pub fn message_count(&self) -> usize {
        let state = self.state.lock();
        state.pending.len() + state.delivering.len() + state.expired.len()
    }

    /// Messages in delivery.
    #[must_use]
    pub fn delivering_count(&self) -> usize {
        self.state.lock().delivering.len()
    }

    /// Undelivered messages in delivery order.
    #[must_use]
    pub fn browse(&self) -> Vec<Arc<Message>> {
        let state = self.state.lock();
        state.order.iter().filter_map(|slot| state.pending.get(slot)).map(|r| Arc::clone(&r.message)).collect()
    }

    fn not_found(&self, id: MessageId) -> BrokerError {
        BrokerError::ReferenceNotFound { queue: self.name.clone(), id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use kaelix_core::message::headers::HDR_LAST_VALUE_NAME;

    fn settings(last_value: bool, attempts: u32) -> ResolvedSettings {
        ResolvedSettings {
            last_value_key: last_value.then(|| HDR_LAST_VALUE_NAME.to_string()),
            max_delivery_attempts: attempts,
            dead_letter_address: Some(Address::new("DLQ").unwrap()),
            expiry_address: None,
        }
    }

    fn queue(last_value: bool, attempts: u32) -> Queue {
        Queue::new("q", Address::new("a").unwrap(), true, settings(last_value, attempts))
    }

    fn message(body: &'static [u8]) -> Arc<Message> {
        Arc::new(Message::new("a", Bytes::from_static(body)).unwrap())
    }

    fn keyed(body: &'static [u8], key: &str) -> Arc<Message> {
        let message = message(body);
        message.properties.put_string(HDR_LAST_VALUE_NAME, key);
        message
    }

    #[test]
    fn test_fifo_delivery_and_ack() {
        let q = queue(false, 3);
        let first = message(b"1");
        q.add(Arc::clone(&first));
        q.add(message(b"2"));

        let delivered = q.poll().unwrap();
        assert_eq!(delivered.id(), first.id);
        assert_eq!(delivered.delivery_count, 1);
        assert_eq!(q.delivering_count(), 1);
        assert_eq!(q.message_count(), 2);

        q.acknowledge(first.id).unwrap();
        assert_eq!(q.message_count(), 1);
        assert!(matches!(q.acknowledge(first.id), Err(BrokerError::ReferenceNotFound { .. })));
    }

    #[test]
    fn test_last_value_collapse() {
        let q = queue(true, 3);
        let m1 = keyed(b"m1", "K");
        let m2 = keyed(b"m2", "K");

        assert_eq!(q.add(Arc::clone(&m1)), ReferenceAction::Added);
        assert_eq!(q.add(m2), ReferenceAction::Replaced { previous: m1.id });
        assert_eq!(q.message_count(), 1);
        assert_eq!(&q.poll().unwrap().message.body[..], b"m2");
    }

    #[test]
    fn test_last_value_keeps_position_and_other_keys() {
        let q = queue(true, 3);
        q.add(keyed(b"a1", "A"));
        q.add(keyed(b"b1", "B"));
        q.add(message(b"plain"));
        q.add(keyed(b"a2", "A"));

        let bodies: Vec<_> = q.browse().iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies, vec![Bytes::from_static(b"a2"), Bytes::from_static(b"b1"), Bytes::from_static(b"plain")]);
    }

    #[test]
    fn test_in_flight_reference_is_not_replaced() {
        let q = queue(true, 3);
        q.add(keyed(b"m1", "K"));
        q.poll().unwrap();
        assert_eq!(q.add(keyed(b"m2", "K")), ReferenceAction::Added);
        assert_eq!(q.message_count(), 2);
    }

    #[test]
    fn test_redelivered_reference_collapses_by_key() {
        let q = queue(true, 5);
        let m1 = keyed(b"m1", "K");
        q.add(Arc::clone(&m1));
        q.poll().unwrap();
        q.cancel(m1.id).unwrap();

        // back in the queue and undelivered again, so a newer value replaces it
        assert_eq!(q.add(keyed(b"m2", "K")), ReferenceAction::Replaced { previous: m1.id });
        assert_eq!(q.message_count(), 1);
    }

    #[test]
    fn test_redelivery_behind_newer_value_keeps_newest_replaceable() {
        let q = queue(true, 5);
        let m1 = keyed(b"m1", "K");
        q.add(Arc::clone(&m1));
        q.poll().unwrap();
        let m2 = keyed(b"m2", "K");
        assert_eq!(q.add(Arc::clone(&m2)), ReferenceAction::Added);
        q.cancel(m1.id).unwrap();

        assert_eq!(q.add(keyed(b"m3", "K")), ReferenceAction::Replaced { previous: m2.id });
        let bodies: Vec<_> = q.browse().iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies, vec![Bytes::from_static(b"m1"), Bytes::from_static(b"m3")]);
    }

    #[test]
    fn test_key_index_follows_poll_and_expiry() {
        let q = queue(true, 3);
        let past = kaelix_core::types::now() - chrono::Duration::seconds(1);
        let stale = Arc::new(Message::builder().address("a").expiration(past).build().unwrap());
        stale.properties.put_string(HDR_LAST_VALUE_NAME, "S");
        q.add(Arc::clone(&stale));
        q.add(keyed(b"k1", "K"));

        assert_eq!(q.expire(kaelix_core::types::now()).len(), 1);
        assert_eq!(q.add(keyed(b"s2", "S")), ReferenceAction::Added);

        assert_eq!(&q.poll().unwrap().message.body[..], b"k1");
        assert_eq!(q.add(keyed(b"k2", "K")), ReferenceAction::Added);
        assert_eq!(q.message_count(), 3);
    }

    #[test]
    fn test_many_keys_collapse_independently() {
        let q = queue(true, 3);
        for round in 0..3 {
            for key in 0..500 {
                let m = message(b"v");
                m.properties.put_string(HDR_LAST_VALUE_NAME, format!("key-{key}"));
                m.properties.put_int("round", round);
                q.add(m);
            }
        }
        let held = q.browse();
        assert_eq!(held.len(), 500);
        assert!(held.iter().all(|m| m.properties.get_int("round").unwrap() == 2));
        assert_eq!(q.stats().messages_replaced.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn test_redelivery_then_dead_letter() {
        let q = queue(false, 2);
        let m = message(b"x");
        q.add(Arc::clone(&m));

        q.poll().unwrap();
        match q.cancel(m.id).unwrap() {
            CancelOutcome::Redelivered { delivery_count } => assert_eq!(delivery_count, 1),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(q.poll().unwrap().delivery_count, 2);
        match q.cancel(m.id).unwrap() {
            CancelOutcome::DeadLetter { reference, address } => {
                assert_eq!(reference.id(), m.id);
                assert_eq!(address.unwrap().as_str(), "DLQ");
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(q.message_count(), 0);
        assert_eq!(q.stats().messages_killed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_cancel_returns_to_head() {
        let q = queue(false, 5);
        let first = message(b"1");
        q.add(Arc::clone(&first));
        q.add(message(b"2"));
        q.poll().unwrap();
        q.cancel(first.id).unwrap();
        assert_eq!(q.poll().unwrap().id(), first.id);
    }

    #[test]
    fn test_expiry() {
        let q = queue(false, 3);
        let past = kaelix_core::types::now() - chrono::Duration::seconds(1);
        let expired = Arc::new(
            Message::builder().address("a").expiration(past).build().unwrap(),
        );
        let live = message(b"live");
        q.add(Arc::clone(&expired));
        q.add(Arc::clone(&live));

        // poll skips the expired reference and sets it aside
        assert_eq!(q.poll().unwrap().id(), live.id);
        let removed = q.expire(kaelix_core::types::now());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), expired.id);
        assert_eq!(q.stats().messages_expired.load(Ordering::Relaxed), 1);
    }
}
