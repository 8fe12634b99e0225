//! Event infrastructure for team-sync.
//!
//! Remote writes are fire-and-forget, so their outcome never reaches the
//! caller that triggered them. `SyncEvent` is the structured channel those
//! outcomes are reported on (alongside a tracing log line), and `EventBus`
//! lets tests and hosts subscribe to it.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Milliseconds since Unix epoch.
pub(crate) fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Events emitted by the engine for monitoring and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A local change was written to a remote record.
    RecordPushed {
        team: String,
        document: String,
        /// "set" or "delete".
        operation: String,
        timestamp: u64,
    },
    /// A remote write for a local change failed.
    PushFailed {
        team: String,
        document: String,
        operation: String,
        error: String,
        timestamp: u64,
    },
    /// A local value could not be encoded and was not pushed.
    PushSkipped {
        key: String,
        reason: String,
        timestamp: u64,
    },
    /// A change from another device was written to the local store.
    RemoteApplied {
        team: String,
        document: String,
        timestamp: u64,
    },
    /// A subscription reported a transport error.
    SubscriptionError {
        team: String,
        document: String,
        error: String,
        timestamp: u64,
    },
    /// Hydration finished.
    Hydrated {
        team: String,
        /// "pull" (remote won) or "push" (local became remote).
        mode: String,
        timestamp: u64,
    },
    /// Hydration failed; the engine stays dormant.
    HydrationFailed {
        team: String,
        error: String,
        timestamp: u64,
    },
    /// Membership list or active team changed.
    MembershipChanged {
        active: Option<String>,
        count: usize,
        timestamp: u64,
    },
    /// A best-effort background write (profile, audit log) failed.
    BackgroundWriteFailed {
        operation: String,
        error: String,
        timestamp: u64,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(SyncEvent) + Send + Sync>;

/// Event bus for publishing sync events to subscribers.
///
/// Thread-safe; wrap in `Arc` to enable subscriptions.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Collect every event into a shared vector. Handy in tests.
    pub fn record(self: &Arc<Self>) -> (Subscription, Arc<std::sync::Mutex<Vec<SyncEvent>>>) {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let sub = self.subscribe(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });
        (sub, log)
    }

    fn unsubscribe(&self, id: usize) {
        // Use try_write to avoid deadlock if Drop runs during panic unwinding
        // while a read lock is held (e.g., during emit).
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SyncEvent) {
        // Clone the callback list to prevent deadlock if a callback calls subscribe.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn applied(document: &str) -> SyncEvent {
        SyncEvent::RemoteApplied {
            team: "HAWK23".into(),
            document: document.into(),
            timestamp: 1000,
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(applied("roster"));

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let (sub, log) = bus.record();

        bus.emit(applied("roster"));
        drop(sub);
        bus.emit(applied("games"));

        let log = log.lock().unwrap();
        assert_eq!(log.as_slice(), &[applied("roster")]);
    }

    #[test]
    fn test_sync_event_serialization() {
        let event = SyncEvent::PushFailed {
            team: "HAWK23".into(),
            document: "roster".into(),
            operation: "set".into(),
            error: "offline".into(),
            timestamp: 1234567890,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"pushFailed\""));
        assert!(json.contains("\"document\":\"roster\""));
        assert!(json.contains("\"timestamp\":1234567890"));
    }
}
