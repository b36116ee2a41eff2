//! Message routing across queue and divert bindings.
//!
//! For each address a message reaches, matching bindings are split into
//! diverts and queues. The first matching exclusive divert (in registration
//! order) claims the message and the queues bound there get nothing.
//! Otherwise every matching non-exclusive divert forwards its own copy and
//! every matching queue receives the message. Forwarded copies are routed
//! again at their new address from an explicit work list, bounded by a hop
//! limit and a per-chain visited set.

use crate::binding::{Binding, BindingId, BindingKind};
use crate::divert::Divert;
use crate::queue::{Queue, ReferenceAction};
use crate::registry::BindingRegistry;
use kaelix_core::address::Address;
use kaelix_core::message::MessageId;
use kaelix_core::Message;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Diverts traversed by one forwarding chain.
type Visited = SmallVec<[BindingId; 4]>;

/// A message placed in a queue by a publish.
#[derive(Debug, Clone)]
pub struct RoutedReference {
    /// Destination queue
    pub queue: Arc<Queue>,
    /// The message as stored; a divert copy when forwarded
    pub message: Arc<Message>,
    /// Whether it was appended or replaced a last-value reference
    pub action: ReferenceAction,
}

/// Ordered outcome of routing one message.
#[derive(Debug, Clone, Default)]
pub struct RoutingResult {
    /// References in delivery order
    pub references: Vec<RoutedReference>,
}

impl RoutingResult {
    /// Destination queue names, in routing order.
    #[must_use]
    pub fn queue_names(&self) -> Vec<&str> {
        self.references.iter().map(|r| r.queue.name()).collect()
    }

    /// Number of references created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Whether the message reached no queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Router counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Publishes that reached at least one queue
    pub routed_messages: u64,
    /// Publishes that reached no queue
    pub unrouted_messages: u64,
    /// Copies forwarded by diverts
    pub diverted_messages: u64,
    /// Copies dropped by the hop limit or cycle guard
    pub dropped_divert_loops: u64,
}

struct WorkItem {
    message: Arc<Message>,
    address: Address,
    hops: u32,
    visited: Visited,
}

/// Deliveries decided for one message but not yet enqueued.
///
/// Produced by [`Router::plan`] or [`Router::plan_replay`] and applied by
/// [`Router::commit`]; nothing is visible to consumers in between.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    message: MessageId,
    address: Address,
    deliveries: Vec<(Arc<Queue>, Arc<Message>)>,
    diverted: u64,
    dropped: u64,
    replay: bool,
}

impl RoutePlan {
    fn new(message: &Message, address: &Address, replay: bool) -> Self {
        Self {
            message: message.id,
            address: address.clone(),
            deliveries: Vec::new(),
            diverted: 0,
            dropped: 0,
            replay,
        }
    }

    /// Destination queues and the message each will hold, in routing order.
    pub fn deliveries(&self) -> impl Iterator<Item = (&Arc<Queue>, &Arc<Message>)> {
        self.deliveries.iter().map(|(queue, message)| (queue, message))
    }

    /// Whether the message reaches no queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

/// Routes messages through the binding registry.
#[derive(Debug)]
pub struct Router {
    registry: Arc<BindingRegistry>,
    max_divert_hops: u32,
    routed_messages: AtomicU64,
    unrouted_messages: AtomicU64,
    diverted_messages: AtomicU64,
    dropped_divert_loops: AtomicU64,
}

impl Router {
    /// Create a router over `registry`.
    #[must_use]
    pub fn new(registry: Arc<BindingRegistry>, max_divert_hops: u32) -> Self {
        Self {
            registry,
            max_divert_hops,
            routed_messages: AtomicU64::new(0),
            unrouted_messages: AtomicU64::new(0),
            diverted_messages: AtomicU64::new(0),
            dropped_divert_loops: AtomicU64::new(0),
        }
    }

    /// Binding registry consulted by this router.
    #[must_use]
    pub fn registry(&self) -> &Arc<BindingRegistry> {
        &self.registry
    }

    /// Route `message` as published to `address` and enqueue it.
    ///
    /// No matching binding yields an empty result.
    pub fn route(&self, message: &Message, address: &Address) -> RoutingResult {
        self.commit(self.plan(message, address))
    }

    /// Queues `message` would reach at `address`, without enqueueing.
    #[must_use]
    pub fn resolve(&self, message: &Message, address: &Address) -> Vec<String> {
        self.plan(message, address)
            .deliveries
            .into_iter()
            .map(|(queue, _)| queue.name().to_string())
            .collect()
    }

    /// Re-enqueue a persisted message into the durable queues bound to its
    /// own address.
    pub fn replay(&self, message: Arc<Message>) -> RoutingResult {
        self.commit(self.plan_replay(message))
    }

    /// Enqueue every delivery of `plan`.
    ///
    /// Counters are only updated for published plans, not replays.
    pub fn commit(&self, plan: RoutePlan) -> RoutingResult {
        let references: Vec<RoutedReference> = plan
            .deliveries
            .into_iter()
            .map(|(queue, message)| {
                let action = queue.add(Arc::clone(&message));
                RoutedReference { queue, message, action }
            })
            .collect();

        if plan.replay {
            return RoutingResult { references };
        }

        self.diverted_messages.fetch_add(plan.diverted, Ordering::Relaxed);
        self.dropped_divert_loops.fetch_add(plan.dropped, Ordering::Relaxed);
        if references.is_empty() {
            self.unrouted_messages.fetch_add(1, Ordering::Relaxed);
            debug!(message = %plan.message, address = %plan.address, "No queue matched");
        } else {
            self.routed_messages.fetch_add(1, Ordering::Relaxed);
        }
        RoutingResult { references }
    }

    /// Decide where a persisted message goes on recovery: the durable queues
    /// bound to its own address. Diverts are not applied, forwarded copies
    /// were persisted under their forwarding address.
    #[must_use]
    pub fn plan_replay(&self, message: Arc<Message>) -> RoutePlan {
        let mut plan = RoutePlan::new(&message, &message.address, true);
        plan.deliveries = self
            .registry
            .bindings_for_address(message.address.as_str())
            .into_iter()
            .filter(|b| b.matches(&message))
            .filter_map(|b| match &b.kind {
                BindingKind::Queue(queue) if queue.is_durable() => Some((Arc::clone(queue), Arc::clone(&message))),
                _ => None,
            })
            .collect();
        plan
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed_messages: self.routed_messages.load(Ordering::Relaxed),
            unrouted_messages: self.unrouted_messages.load(Ordering::Relaxed),
            diverted_messages: self.diverted_messages.load(Ordering::Relaxed),
            dropped_divert_loops: self.dropped_divert_loops.load(Ordering::Relaxed),
        }
    }

    /// Decide where `message` published to `address` goes, following
    /// diverts, without enqueueing anything.
    #[must_use]
    pub fn plan(&self, message: &Message, address: &Address) -> RoutePlan {
        let mut plan = RoutePlan::new(message, address, false);
        let mut work = VecDeque::new();
        work.push_back(WorkItem {
            message: Arc::new(message.clone()),
            address: address.clone(),
            hops: 0,
            visited: Visited::new(),
        });

        while let Some(item) = work.pop_front() {
            let bindings = self.registry.bindings_for_address(item.address.as_str());
            let matching: Vec<&Arc<Binding>> = bindings.iter().filter(|b| b.matches(&item.message)).collect();

            let exclusive = matching.iter().find(|b| b.is_exclusive());
            let diverts: Vec<&Arc<Binding>> = match exclusive {
                Some(claim) => {
                    debug!(message = %item.message.id, divert = %claim.name, "Claimed by exclusive divert");
                    vec![*claim]
                },
                None => matching.iter().filter(|b| !b.is_queue()).copied().collect(),
            };

            for binding in diverts {
                if let BindingKind::Divert(divert) = &binding.kind {
                    if let Some(next) = self.forward(&item, binding.id, divert) {
                        plan.diverted += 1;
                        work.push_back(next);
                    } else {
                        plan.dropped += 1;
                    }
                }
            }

            if exclusive.is_none() {
                for binding in &matching {
                    if let BindingKind::Queue(queue) = &binding.kind {
                        plan.deliveries.push((Arc::clone(queue), Arc::clone(&item.message)));
                    }
                }
            }
        }
        plan
    }

    fn forward(&self, item: &WorkItem, id: BindingId, divert: &Divert) -> Option<WorkItem> {
        if item.visited.contains(&id) {
            warn!(divert = %divert.name(), message = %item.message.id, "Divert cycle detected; copy dropped");
            return None;
        }
        if item.hops >= self.max_divert_hops {
            warn!(
                divert = %divert.name(),
                message = %item.message.id,
                max_divert_hops = self.max_divert_hops,
                "Divert hop limit reached; copy dropped"
            );
            return None;
        }

        let copy = divert.transform(&item.message);
        debug!(
            divert = %divert.name(),
            from = %item.address,
            to = %copy.address,
            original = %item.message.id,
            copy = %copy.id,
            "Diverted message"
        );
        let mut visited = item.visited.clone();
        visited.push(id);
        Some(WorkItem { address: copy.address.clone(), message: Arc::new(copy), hops: item.hops + 1, visited })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ResolvedSettings;
    use bytes::Bytes;
    use kaelix_core::address::WildcardConfiguration;
    use kaelix_core::Filter;

    fn settings() -> ResolvedSettings {
        ResolvedSettings {
            last_value_key: None,
            max_delivery_attempts: 10,
            dead_letter_address: None,
            expiry_address: None,
        }
    }

    struct Fixture {
        registry: Arc<BindingRegistry>,
        router: Router,
    }

    impl Fixture {
        fn new(max_hops: u32) -> Self {
            let registry = Arc::new(BindingRegistry::new(WildcardConfiguration::default()));
            let router = Router::new(Arc::clone(&registry), max_hops);
            Self { registry, router }
        }

        fn queue(&self, name: &str, address: &str, filter: Option<&str>) -> Arc<Queue> {
            let address = Address::new(address).unwrap();
            let queue = Arc::new(Queue::new(name, address.clone(), true, settings()));
            self.registry
                .add_binding(name, address, Filter::parse_optional(filter).unwrap(), BindingKind::Queue(Arc::clone(&queue)))
                .unwrap();
            queue
        }

        fn divert(&self, name: &str, from: &str, to: &str, exclusive: bool, filter: Option<&str>) {
            let from = Address::new(from).unwrap();
            let divert = Divert::new(name, from.clone(), Address::new(to).unwrap(), exclusive);
            self.registry
                .add_binding(name, from, Filter::parse_optional(filter).unwrap(), BindingKind::Divert(Arc::new(divert)))
                .unwrap();
        }

        fn publish(&self, message: &Message) -> RoutingResult {
            self.router.route(message, &message.address)
        }
    }

    fn message(address: &str) -> Message {
        Message::new(address, Bytes::from_static(b"payload")).unwrap()
    }

    #[test]
    fn test_exact_and_wildcard_queues() {
        let f = Fixture::new(10);
        f.queue("q1", "a.b", None);
        f.queue("q2", "a.*", None);
        f.queue("q3", "c", None);

        let result = f.publish(&message("a.b"));
        assert_eq!(result.queue_names(), vec!["q1", "q2"]);
        assert!(result.references.iter().all(|r| r.action == ReferenceAction::Added));
        assert_eq!(f.router.stats().routed_messages, 1);
    }

    #[test]
    fn test_no_bindings_is_empty_result() {
        let f = Fixture::new(10);
        let result = f.publish(&message("nowhere"));
        assert!(result.is_empty());
        assert_eq!(f.router.stats().unrouted_messages, 1);
    }

    #[test]
    fn test_queue_filter() {
        let f = Fixture::new(10);
        f.queue("high", "a", Some("AMQPriority > 5"));
        f.queue("all", "a", None);

        let low = message("a");
        assert_eq!(f.publish(&low).queue_names(), vec!["all"]);

        let mut high = message("a");
        high.priority = 9;
        assert_eq!(f.publish(&high).queue_names(), vec!["high", "all"]);
    }

    #[test]
    fn test_exclusive_divert_claims_message() {
        let f = Fixture::new(10);
        let local = f.queue("local", "a", None);
        let first = f.queue("qb", "b", None);
        let second = f.queue("qc", "c", None);
        f.divert("d1", "a", "b", true, Some("x = 1"));
        f.divert("d2", "a", "c", true, None);

        let m = message("a");
        m.properties.put_int("x", 1);
        let result = f.publish(&m);
        assert_eq!(result.queue_names(), vec!["qb"]);
        assert_eq!(local.message_count(), 0);
        assert_eq!(first.message_count(), 1);
        assert_eq!(second.message_count(), 0);

        // d1's filter rejects, d2 claims
        let other = message("a");
        other.properties.put_int("x", 2);
        assert_eq!(f.publish(&other).queue_names(), vec!["qc"]);
        assert_eq!(local.message_count(), 0);
    }

    #[test]
    fn test_non_exclusive_divert_copies() {
        let f = Fixture::new(10);
        f.queue("local", "a", None);
        f.queue("remote", "b", None);
        f.divert("copy", "a", "b", false, None);

        let m = message("a");
        let result = f.publish(&m);
        assert_eq!(result.queue_names(), vec!["local", "remote"]);

        let local = &result.references[0].message;
        let remote = &result.references[1].message;
        assert_eq!(local.id, m.id);
        assert_ne!(remote.id, m.id);
        assert_eq!(remote.address.as_str(), "b");
        assert_eq!(f.router.stats().diverted_messages, 1);
    }

    #[test]
    fn test_divert_chain() {
        let f = Fixture::new(10);
        f.divert("ab", "a", "b", true, None);
        f.divert("bc", "b", "c", true, None);
        f.queue("end", "c", None);

        let result = f.publish(&message("a"));
        assert_eq!(result.queue_names(), vec!["end"]);
        assert_eq!(f.router.stats().diverted_messages, 2);
    }

    #[test]
    fn test_divert_cycle_is_dropped() {
        let f = Fixture::new(10);
        f.divert("ab", "a", "b", false, None);
        f.divert("ba", "b", "a", false, None);
        let qa = f.queue("qa", "a", None);
        let qb = f.queue("qb", "b", None);

        f.publish(&message("a"));
        // original in qa, copy in qb, copy of copy back in qa, then the cycle is cut
        assert_eq!(qa.message_count(), 2);
        assert_eq!(qb.message_count(), 1);
        assert_eq!(f.router.stats().dropped_divert_loops, 1);
    }

    #[test]
    fn test_hop_limit() {
        let f = Fixture::new(1);
        f.divert("ab", "a", "b", true, None);
        f.divert("bc", "b", "c", true, None);
        f.queue("end", "c", None);

        assert!(f.publish(&message("a")).is_empty());
        assert_eq!(f.router.stats().dropped_divert_loops, 1);
    }

    #[test]
    fn test_resolve_is_dry_run() {
        let f = Fixture::new(10);
        let q = f.queue("q", "a.#", None);
        assert_eq!(f.router.resolve(&message("a.b.c"), &Address::new("a.b.c").unwrap()), vec!["q"]);
        assert_eq!(q.message_count(), 0);
        assert_eq!(f.router.stats(), RouterStats::default());
    }

    #[test]
    fn test_plan_enqueues_nothing_until_commit() {
        let f = Fixture::new(10);
        let local = f.queue("local", "a", None);
        let remote = f.queue("remote", "b", None);
        f.divert("copy", "a", "b", false, None);

        let m = message("a");
        let plan = f.router.plan(&m, &m.address);
        let names: Vec<&str> = plan.deliveries().map(|(q, _)| q.name()).collect();
        assert_eq!(names, vec!["local", "remote"]);
        assert_eq!(local.message_count() + remote.message_count(), 0);
        assert_eq!(f.router.stats(), RouterStats::default());

        let result = f.router.commit(plan);
        assert_eq!(result.len(), 2);
        assert_eq!(local.message_count(), 1);
        assert_eq!(remote.message_count(), 1);
        assert_eq!(f.router.stats().routed_messages, 1);
        assert_eq!(f.router.stats().diverted_messages, 1);
    }

    #[test]
    fn test_replay_skips_diverts_and_non_durable_queues() {
        let f = Fixture::new(10);
        let durable = f.queue("durable", "a", None);
        let address = Address::new("a").unwrap();
        let transient = Arc::new(Queue::new("transient", address.clone(), false, settings()));
        f.registry
            .add_binding("transient", address, None, BindingKind::Queue(Arc::clone(&transient)))
            .unwrap();
        f.divert("away", "a", "b", true, None);

        let result = f.router.replay(Arc::new(message("a")));
        assert_eq!(result.queue_names(), vec!["durable"]);
        assert_eq!(durable.message_count(), 1);
        assert_eq!(transient.message_count(), 0);
        assert_eq!(f.router.stats(), RouterStats::default());
    }
}
