//! # Router (spec component C4)
//!
//! Holds a mutex-guarded vector of subscription records plus a monotonic id
//! counter. Grounded on the teacher's `coordination.rs` barrier/registry
//! pattern (`redhat-performance-rusty-comms`): one mutex owns both the
//! collection and the bookkeeping counters, and callbacks run with the lock
//! held so they must not re-enter.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::pb::MavlinkMessage;

/// A subscriber's interest: `0`/empty fields mean "any".
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub system_id: u32,
    pub component_id: u32,
    pub message_ids: Vec<u32>,
}

impl SubscriptionFilter {
    pub fn matches(&self, message: &MavlinkMessage) -> bool {
        (self.system_id == 0 || self.system_id == message.system_id)
            && (self.component_id == 0 || self.component_id == message.component_id)
            && (self.message_ids.is_empty() || self.message_ids.contains(&message.message_id))
    }
}

/// The callback a subscriber registers: serializes `message` to its stream's
/// wire writer and reports whether the write succeeded. Returning `false`
/// marks the subscription inactive.
type WriteFn = Box<dyn Fn(&MavlinkMessage) -> bool + Send>;

struct Subscription {
    id: u64,
    filter: SubscriptionFilter,
    write_fn: WriteFn,
    active: bool,
    delivered: u64,
}

/// Mutex-guarded fan-out registry. A single lock protects the subscription
/// vector, the id counter, and every active-flag transition.
#[derive(Default)]
pub struct Router {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `filter` with `write_fn` and returns the new subscription's
    /// id.
    pub fn subscribe(&self, filter: SubscriptionFilter, write_fn: WriteFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().push(Subscription {
            id,
            filter,
            write_fn,
            active: true,
            delivered: 0,
        });
        id
    }

    /// Removes the subscription with the given id. Returns `true` iff it
    /// was found.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Delivers `message` to every active, matching subscriber. A write
    /// failure marks that subscription inactive rather than removing it
    /// immediately (eviction during iteration would invalidate positions).
    /// Returns the number of subscribers the message was successfully
    /// delivered to.
    pub fn route_message(&self, message: &MavlinkMessage) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let mut delivered = 0usize;

        for subscription in subscriptions.iter_mut() {
            if !subscription.active || !subscription.filter.matches(message) {
                continue;
            }

            if (subscription.write_fn)(message) {
                subscription.delivered += 1;
                delivered += 1;
            } else {
                debug!(subscription_id = subscription.id, "evicting unresponsive subscriber");
                subscription.active = false;
            }
        }

        delivered
    }

    /// Count of currently active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().iter().filter(|s| s.active).count()
    }

    /// Drops inactive subscriptions from the backing vector. Returns the
    /// number removed.
    pub fn cleanup_inactive(&self) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.active);
        before - subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn message(system_id: u32, component_id: u32, message_id: u32) -> MavlinkMessage {
        MavlinkMessage {
            system_id,
            component_id,
            message_id,
            sequence: 0,
            payload: None,
        }
    }

    #[test]
    fn matches_any_on_zero_filter_fields() {
        let filter = SubscriptionFilter::default();
        assert!(filter.matches(&message(7, 3, 42)));
    }

    #[test]
    fn matches_requires_exact_system_and_component_when_set() {
        let filter = SubscriptionFilter {
            system_id: 1,
            component_id: 1,
            message_ids: vec![],
        };
        assert!(filter.matches(&message(1, 1, 0)));
        assert!(!filter.matches(&message(2, 1, 0)));
        assert!(!filter.matches(&message(1, 2, 0)));
    }

    #[test]
    fn matches_message_ids_allowlist() {
        let filter = SubscriptionFilter {
            system_id: 0,
            component_id: 0,
            message_ids: vec![0, 30],
        };
        assert!(filter.matches(&message(9, 9, 0)));
        assert!(filter.matches(&message(9, 9, 30)));
        assert!(!filter.matches(&message(9, 9, 31)));
    }

    #[test]
    fn route_message_delivers_only_to_matching_active_subscribers() {
        let router = Router::new();
        let received_a = Arc::new(AtomicUsize::new(0));
        let received_b = Arc::new(AtomicUsize::new(0));

        let a = received_a.clone();
        router.subscribe(
            SubscriptionFilter {
                message_ids: vec![0],
                ..Default::default()
            },
            Box::new(move |_m| {
                a.fetch_add(1, Ordering::Relaxed);
                true
            }),
        );

        let b = received_b.clone();
        router.subscribe(
            SubscriptionFilter {
                message_ids: vec![30],
                ..Default::default()
            },
            Box::new(move |_m| {
                b.fetch_add(1, Ordering::Relaxed);
                true
            }),
        );

        let delivered = router.route_message(&message(1, 1, 0));
        assert_eq!(delivered, 1);
        assert_eq!(received_a.load(Ordering::Relaxed), 1);
        assert_eq!(received_b.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn failing_write_fn_evicts_without_immediate_removal() {
        let router = Router::new();
        let id = router.subscribe(SubscriptionFilter::default(), Box::new(|_m| false));

        assert_eq!(router.subscription_count(), 1);
        let delivered = router.route_message(&message(1, 1, 0));
        assert_eq!(delivered, 0);
        assert_eq!(router.subscription_count(), 0);

        let removed = router.cleanup_inactive();
        assert_eq!(removed, 1);
        assert!(!router.unsubscribe(id));
    }

    #[test]
    fn unsubscribe_returns_false_for_unknown_id() {
        let router = Router::new();
        assert!(!router.unsubscribe(999));
    }

    #[test]
    fn subscription_ids_are_monotonically_increasing() {
        let router = Router::new();
        let first = router.subscribe(SubscriptionFilter::default(), Box::new(|_m| true));
        let second = router.subscribe(SubscriptionFilter::default(), Box::new(|_m| true));
        assert!(second > first);
    }
}
