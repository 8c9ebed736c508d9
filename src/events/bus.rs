//! The base event bus: subscribe/unsubscribe/publish/close (C1).

use super::event::Event;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Receives events delivered by an [`EventBus`]. Handlers must be non-blocking; use
/// [`super::adapters::AsyncEventAdapter`] to hand expensive work off to a worker task.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F: Fn(&Event) + Send + Sync> EventHandler for F {
    fn handle(&self, event: &Event) {
        self(event)
    }
}

type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

struct Subscription {
    id: u64,
    handler: Arc<dyn EventHandler>,
    filter: Option<Filter>,
}

struct BusInner {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// In-process typed pub/sub bus. Cheap to clone; all clones share the same
/// subscription list.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribes `handler`, returning a subscription id usable with [`Self::unsubscribe`].
    /// No event published before this call returns can reach `handler`.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> u64 {
        self.subscribe_filtered(handler, None)
    }

    pub fn subscribe_filtered(&self, handler: Arc<dyn EventHandler>, filter: Option<Filter>) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        let mut subs = self.inner.subscriptions.lock().unwrap_or_else(|p| p.into_inner());
        subs.push(Subscription { id, handler, filter });
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subs = self.inner.subscriptions.lock().unwrap_or_else(|p| p.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Delivers `event` to every matching subscriber. Publishers are serialized
    /// against each other by the subscription-list lock; a panicking handler is
    /// caught and reported as a `handler_failed` system event, one level deep.
    pub fn publish(&self, event: Event) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        self.dispatch(&event, true);
    }

    fn dispatch(&self, event: &Event, report_failures: bool) {
        let subs: Vec<(Arc<dyn EventHandler>, bool)> = {
            let subs = self.inner.subscriptions.lock().unwrap_or_else(|p| p.into_inner());
            subs.iter()
                .map(|s| {
                    let matched = s.filter.as_ref().map(|f| f(event)).unwrap_or(true);
                    (s.handler.clone(), matched)
                })
                .collect()
        };

        let mut any_panicked = false;
        for (handler, matched) in subs {
            if !matched {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            if outcome.is_err() {
                any_panicked = true;
                tracing::error!(event_id = %event.id, "event handler panicked");
            }
        }

        if any_panicked && report_failures {
            let failure = Event::system("handler_failed", [("source_event_id", event.id.clone())]);
            self.dispatch(&failure, false);
        }
    }

    /// Marks the bus closed: no further `publish` calls are accepted. In-flight
    /// deliveries already dispatched complete normally.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
