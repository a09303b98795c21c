use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::data::HostEvent;
use crate::host::{EventBus, EventSubscription, SubscriberId};

/// Shared plumbing for plugins that listen to the host event bus.
///
/// Owns at most one subscription and the listener thread consuming it.
/// Subscribing and unsubscribing are a scoped pair: after
/// [`BaseEventPlugin::unsubscribe_from_event_bus`] returns, the handler
/// is never called again.
pub struct BaseEventPlugin {
    name: String,

    version: String,

    event_bus: EventBus,

    /// Subscription on the host event bus
    subscription: Mutex<Option<SubscriberId>>,

    /// Handle to the event listener thread
    listener_thread: Mutex<Option<JoinHandle<()>>>,
}

impl BaseEventPlugin {
    pub fn new(name: &str, event_bus: EventBus) -> Self {
        Self {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            event_bus,
            subscription: Mutex::new(None),
            listener_thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Subscribe to the given event types and start a listener thread.
    ///
    /// Returns false without touching the bus if a subscription already exists.
    pub fn subscribe_to_event_bus<F>(&self, event_types: Vec<EventSubscription>, event_handler: F) -> bool
    where
        F: Fn(HostEvent) + Send + 'static,
    {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            debug!("Plugin '{}' is already subscribed to the event bus", self.name);
            return false;
        }

        debug!("Subscribing plugin '{}' to {:?}", self.name, event_types);
        let (id, receiver) = self.event_bus.subscribe(event_types);
        *subscription = Some(id);

        let plugin_name = self.name.clone();
        let handle = self.event_bus.spawn_worker(id, receiver, move |event| {
            event_handler(event);
        });
        debug!("Event listener thread for plugin '{}' started", plugin_name);

        *self.listener_thread.lock() = Some(handle);
        true
    }

    /// Unsubscribe from the event bus and wait for the listener thread to exit.
    ///
    /// Returns false if there was nothing to unsubscribe.
    pub fn unsubscribe_from_event_bus(&self) -> bool {
        let Some(id) = self.subscription.lock().take() else {
            return false;
        };

        debug!("Unsubscribing plugin '{}' from event bus", self.name);
        self.event_bus.unsubscribe(id);

        if let Some(handle) = self.listener_thread.lock().take() {
            if handle.thread().id() == thread::current().id() {
                // Called from inside a handler; the thread ends once the handler returns
                debug!("Detaching event listener thread of plugin '{}'", self.name);
            } else if handle.join().is_err() {
                warn!("Event listener thread of plugin '{}' panicked", self.name);
            }
        }

        true
    }
}

impl Drop for BaseEventPlugin {
    fn drop(&mut self) {
        self.unsubscribe_from_event_bus();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MediaItem, PlaybackStartEvent, UserId};
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    fn start_event() -> HostEvent {
        HostEvent::PlaybackStart(PlaybackStartEvent {
            item: MediaItem::audio("1", "Song", "Artist"),
            users: vec![UserId::new("u1")],
        })
    }

    #[test]
    fn test_subscribe_once() {
        let bus = EventBus::new();
        let base = BaseEventPlugin::new("test", bus.clone());

        assert!(base.subscribe_to_event_bus(vec![EventSubscription::All], |_| {}));
        assert!(!base.subscribe_to_event_bus(vec![EventSubscription::All], |_| {}));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(base.is_subscribed());
    }

    #[test]
    fn test_no_events_after_unsubscribe() {
        let bus = EventBus::new();
        let base = BaseEventPlugin::new("test", bus.clone());
        let (seen_tx, seen_rx) = unbounded();

        base.subscribe_to_event_bus(vec![EventSubscription::PlaybackStart], move |event| {
            let _ = seen_tx.send(event);
        });

        bus.publish(start_event());
        assert!(seen_rx.recv_timeout(Duration::from_secs(2)).is_ok());

        assert!(base.unsubscribe_from_event_bus());
        assert!(!base.unsubscribe_from_event_bus());
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(start_event());
        // The handler was dropped with the listener thread
        assert!(seen_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let bus = EventBus::new();
        {
            let base = BaseEventPlugin::new("test", bus.clone());
            base.subscribe_to_event_bus(vec![EventSubscription::All], |_| {});
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
