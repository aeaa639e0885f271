//! Curator change notifications.
//!
//! Events are queued by whichever thread mutates the curator and delivered
//! only from [`EventBus::flush`], which the host calls from its main thread
//! (see [`Curator::main_thread_tick`](crate::Curator::main_thread_tick)).
//! Handlers therefore never run concurrently with each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use curator_common::AssetGuid;
use parking_lot::Mutex;

/// A change notification. Payloads carry only the delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CuratorEvent {
    /// The asset list changed wholesale; consumers should rebuild.
    AssetListReset,
    /// A new asset was discovered.
    AssetAdded {
        /// The new asset.
        guid: AssetGuid,
    },
    /// An asset disappeared.
    AssetRemoved {
        /// The removed asset.
        guid: AssetGuid,
    },
    /// An asset's metadata or transform state changed.
    AssetUpdated {
        /// The changed asset.
        guid: AssetGuid,
    },
    /// An asset's source document moved to a new path.
    AssetMoved {
        /// The moved asset.
        guid: AssetGuid,
    },
    /// The active output platform changed.
    ActivePlatformChanged {
        /// Name of the new platform.
        platform: String,
    },
    /// Progress of a bulk operation.
    TransformProgress {
        /// Assets processed so far.
        completed: usize,
        /// Assets in the batch.
        total: usize,
    },
}

type Handler = Arc<dyn Fn(&CuratorEvent) + Send + Sync>;

/// Publish/subscribe hub with a pending-event queue.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<Vec<(u64, Handler)>>,
    pending: Mutex<Vec<CuratorEvent>>,
    next_id: AtomicU64,
}

/// Handle of a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    bus: Weak<EventBus>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.handlers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a handler for every future event.
    pub fn subscribe(
        self: &Arc<Self>,
        handler: impl Fn(&CuratorEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    #[cfg(test)]
    fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Queues one event for the next flush.
    pub fn queue(&self, event: CuratorEvent) {
        self.pending.lock().push(event);
    }

    /// Queues several events for the next flush.
    pub fn queue_all(&self, events: impl IntoIterator<Item = CuratorEvent>) {
        self.pending.lock().extend(events);
    }

    /// Delivers all queued events to the current handlers.
    ///
    /// Per-asset list events queued before an `AssetListReset` are dropped
    /// since the reset subsumes them. Handlers run without any bus lock held,
    /// so they may subscribe, unsubscribe or query the curator.
    /// Returns the number of events delivered.
    pub fn flush(&self) -> usize {
        let events = coalesce(std::mem::take(&mut *self.pending.lock()));
        if events.is_empty() {
            return 0;
        }
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for event in &events {
            for handler in &handlers {
                handler(event);
            }
        }
        events.len()
    }
}

fn coalesce(events: Vec<CuratorEvent>) -> Vec<CuratorEvent> {
    let Some(last_reset) = events
        .iter()
        .rposition(|e| *e == CuratorEvent::AssetListReset)
    else {
        return events;
    };
    events
        .into_iter()
        .enumerate()
        .filter(|(i, e)| {
            *i >= last_reset
                || !matches!(
                    e,
                    CuratorEvent::AssetListReset
                        | CuratorEvent::AssetAdded { .. }
                        | CuratorEvent::AssetRemoved { .. }
                        | CuratorEvent::AssetMoved { .. }
                        | CuratorEvent::AssetUpdated { .. }
                )
        })
        .map(|(_, e)| e)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &Arc<EventBus>) -> (Subscription, Arc<Mutex<Vec<CuratorEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe(move |e| sink.lock().push(e.clone()));
        (sub, seen)
    }

    #[test]
    fn events_wait_for_flush() {
        let bus = EventBus::new();
        let (_sub, seen) = recorder(&bus);
        bus.queue(CuratorEvent::AssetAdded { guid: AssetGuid::from_u128(1) });
        assert!(seen.lock().is_empty());
        assert_eq!(bus.flush(), 1);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bus.flush(), 0);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let (sub, seen) = recorder(&bus);
        assert_eq!(bus.handler_count(), 1);
        drop(sub);
        assert_eq!(bus.handler_count(), 0);
        bus.queue(CuratorEvent::AssetListReset);
        bus.flush();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let (sub, _seen) = recorder(&bus);
        drop(bus);
        drop(sub);
    }

    #[test]
    fn reset_subsumes_earlier_list_events() {
        let bus = EventBus::new();
        let (_sub, seen) = recorder(&bus);
        let g = AssetGuid::from_u128(1);
        bus.queue_all([
            CuratorEvent::AssetAdded { guid: g },
            CuratorEvent::AssetListReset,
            CuratorEvent::TransformProgress { completed: 1, total: 2 },
            CuratorEvent::AssetRemoved { guid: g },
            CuratorEvent::AssetListReset,
            CuratorEvent::AssetUpdated { guid: g },
        ]);
        bus.flush();
        assert_eq!(
            *seen.lock(),
            vec![
                CuratorEvent::TransformProgress { completed: 1, total: 2 },
                CuratorEvent::AssetListReset,
                CuratorEvent::AssetUpdated { guid: g },
            ]
        );
    }

    #[test]
    fn handler_may_unsubscribe_during_flush() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_handler = Arc::clone(&slot);
        let sub = bus.subscribe(move |_| {
            slot_in_handler.lock().take();
        });
        *slot.lock() = Some(sub);
        bus.queue(CuratorEvent::AssetListReset);
        bus.flush();
        assert_eq!(bus.handler_count(), 0);
    }
}
