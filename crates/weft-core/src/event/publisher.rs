//! Publish/subscribe fan-out for workflow run events.
//!
//! Subscribers register a callback for one event type or for all events.
//! Delivery is synchronous and in registration order; type-specific
//! subscribers are notified before wildcard subscribers. Each callback is
//! isolated: a panicking subscriber is caught and logged, and delivery
//! continues to the remaining subscribers. The subscriber list is
//! snapshotted before invocation, so callbacks may re-enter `publish` or
//! cancel subscriptions without deadlocking.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;
use weft_types::run::{RunEventType, WorkflowRunEvent};

/// Callback signature for event subscribers.
pub type EventCallback = Arc<dyn Fn(&WorkflowRunEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: EventCallback,
}

#[derive(Default)]
struct Registrations {
    typed: HashMap<RunEventType, Vec<Subscriber>>,
    wildcard: Vec<Subscriber>,
}

struct PublisherInner {
    registrations: RwLock<Registrations>,
    next_id: AtomicU64,
}

/// Multi-consumer publisher for run progress events.
///
/// Cloning the publisher shares the subscriber set, allowing multiple
/// producers. Construct one per engine and inject it explicitly.
#[derive(Clone)]
pub struct EventPublisher {
    inner: Arc<PublisherInner>,
}

impl EventPublisher {
    /// Create a publisher with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                registrations: RwLock::new(Registrations::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to one event type. Returns a handle that cancels the
    /// subscription.
    pub fn subscribe(
        &self,
        event_type: RunEventType,
        callback: impl Fn(&WorkflowRunEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber {
            id,
            callback: Arc::new(callback),
        };
        self.write_registrations()
            .typed
            .entry(event_type)
            .or_default()
            .push(subscriber);
        Subscription {
            target: SubscriptionTarget::Typed(event_type),
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe to every event type.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&WorkflowRunEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_registrations().wildcard.push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        Subscription {
            target: SubscriptionTarget::All,
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to all matching subscribers.
    pub fn publish(&self, event: &WorkflowRunEvent) {
        // Snapshot the callbacks so no lock is held while they run.
        let callbacks: Vec<EventCallback> = {
            let registrations = self.read_registrations();
            let typed = registrations
                .typed
                .get(&event.event_type)
                .into_iter()
                .flat_map(|subs| subs.iter());
            typed
                .chain(registrations.wildcard.iter())
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(
                    event_type = %event.event_type,
                    run_id = %event.run_id,
                    "event subscriber panicked; continuing delivery"
                );
            }
        }
    }

    /// Build and deliver an ephemeral event (not persisted to any store).
    pub fn publish_event(&self, event_type: RunEventType, run_id: Uuid, payload: Option<Value>) {
        let event = WorkflowRunEvent {
            id: Uuid::now_v7(),
            run_id,
            timestamp: Utc::now(),
            event_type,
            payload,
            emitter: None,
        };
        self.publish(&event);
    }

    /// Remove all registrations. Used for test isolation and shutdown.
    pub fn clear(&self) {
        let mut registrations = self.write_registrations();
        registrations.typed.clear();
        registrations.wildcard.clear();
    }

    /// Number of registered subscribers across both groups.
    pub fn subscriber_count(&self) -> usize {
        let registrations = self.read_registrations();
        registrations.typed.values().map(Vec::len).sum::<usize>()
            + registrations.wildcard.len()
    }

    fn read_registrations(&self) -> std::sync::RwLockReadGuard<'_, Registrations> {
        self.inner
            .registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write_registrations(&self) -> std::sync::RwLockWriteGuard<'_, Registrations> {
        self.inner
            .registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription handle
// ---------------------------------------------------------------------------

enum SubscriptionTarget {
    Typed(RunEventType),
    All,
}

/// Handle returned by `subscribe`/`subscribe_all`; cancelling it removes the
/// registration. Dropping the handle without cancelling leaves the
/// subscription active for the publisher's lifetime.
pub struct Subscription {
    target: SubscriptionTarget,
    id: u64,
    inner: Weak<PublisherInner>,
}

impl Subscription {
    /// Unsubscribe. Safe to call while publishes are in flight.
    pub fn cancel(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut registrations = inner.registrations.write().unwrap_or_else(|e| e.into_inner());
        match self.target {
            SubscriptionTarget::Typed(event_type) => {
                if let Some(subs) = registrations.typed.get_mut(&event_type) {
                    subs.retain(|s| s.id != self.id);
                }
            }
            SubscriptionTarget::All => {
                registrations.wildcard.retain(|s| s.id != self.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sample_event(event_type: RunEventType) -> WorkflowRunEvent {
        WorkflowRunEvent {
            id: Uuid::now_v7(),
            run_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type,
            payload: None,
            emitter: Some("engine".to_string()),
        }
    }

    #[test]
    fn test_typed_subscriber_receives_matching_events_only() {
        let publisher = EventPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        publisher.subscribe(RunEventType::NodeEntered, move |event| {
            seen_clone.lock().unwrap().push(event.event_type);
        });

        publisher.publish(&sample_event(RunEventType::NodeEntered));
        publisher.publish(&sample_event(RunEventType::WorkflowCompleted));

        assert_eq!(*seen.lock().unwrap(), vec![RunEventType::NodeEntered]);
    }

    #[test]
    fn test_wildcard_subscriber_receives_everything() {
        let publisher = EventPublisher::new();
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        publisher.subscribe_all(move |_| {
            *count_clone.lock().unwrap() += 1;
        });

        publisher.publish(&sample_event(RunEventType::WorkflowStarted));
        publisher.publish(&sample_event(RunEventType::NodeExited));

        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_typed_before_wildcard_and_registration_order() {
        let publisher = EventPublisher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        publisher.subscribe_all(move |_| order_a.lock().unwrap().push("wildcard-1"));
        let order_b = Arc::clone(&order);
        publisher.subscribe(RunEventType::NodeEntered, move |_| {
            order_b.lock().unwrap().push("typed-1")
        });
        let order_c = Arc::clone(&order);
        publisher.subscribe(RunEventType::NodeEntered, move |_| {
            order_c.lock().unwrap().push("typed-2")
        });
        let order_d = Arc::clone(&order);
        publisher.subscribe_all(move |_| order_d.lock().unwrap().push("wildcard-2"));

        publisher.publish(&sample_event(RunEventType::NodeEntered));

        assert_eq!(
            *order.lock().unwrap(),
            vec!["typed-1", "typed-2", "wildcard-1", "wildcard-2"]
        );
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let publisher = EventPublisher::new();
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        let subscription = publisher.subscribe(RunEventType::NodeEntered, move |_| {
            *count_clone.lock().unwrap() += 1;
        });

        publisher.publish(&sample_event(RunEventType::NodeEntered));
        subscription.cancel();
        publisher.publish(&sample_event(RunEventType::NodeEntered));

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let publisher = EventPublisher::new();
        let reached = Arc::new(Mutex::new(false));

        publisher.subscribe_all(|_| panic!("subscriber exploded"));
        let reached_clone = Arc::clone(&reached);
        publisher.subscribe_all(move |_| {
            *reached_clone.lock().unwrap() = true;
        });

        publisher.publish(&sample_event(RunEventType::WorkflowFailed));

        assert!(
            *reached.lock().unwrap(),
            "delivery must continue past a panicking subscriber"
        );
    }

    #[test]
    fn test_subscriber_may_reenter_publish() {
        let publisher = EventPublisher::new();
        let completions = Arc::new(Mutex::new(0));

        let nested = publisher.clone();
        publisher.subscribe(RunEventType::NodeExited, move |event| {
            // Re-entrant publish of a different event type must not deadlock.
            nested.publish_event(RunEventType::WorkflowCompleted, event.run_id, None);
        });
        let completions_clone = Arc::clone(&completions);
        publisher.subscribe(RunEventType::WorkflowCompleted, move |_| {
            *completions_clone.lock().unwrap() += 1;
        });

        publisher.publish(&sample_event(RunEventType::NodeExited));

        assert_eq!(*completions.lock().unwrap(), 1);
    }

    #[test]
    fn test_clear_removes_all_registrations() {
        let publisher = EventPublisher::new();
        publisher.subscribe(RunEventType::NodeEntered, |_| {});
        publisher.subscribe_all(|_| {});
        assert_eq!(publisher.subscriber_count(), 2);

        publisher.clear();
        assert_eq!(publisher.subscriber_count(), 0);
        // Publishing with no subscribers is a no-op.
        publisher.publish(&sample_event(RunEventType::NodeEntered));
    }

    #[test]
    fn test_clone_shares_subscriber_set() {
        let publisher = EventPublisher::new();
        let clone = publisher.clone();
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        clone.subscribe_all(move |_| {
            *count_clone.lock().unwrap() += 1;
        });

        publisher.publish(&sample_event(RunEventType::WorkflowStarted));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
