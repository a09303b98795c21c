use crate::data::HostEvent;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use std::thread;

/// Defines what kinds of host events a subscriber wants to receive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventSubscription {
    /// Subscribe to all host events
    All,

    /// Session manager: playback started
    PlaybackStart,

    /// Session manager: playback stopped
    PlaybackStopped,

    /// User data manager: user data saved
    UserDataSaved,
}

impl From<&HostEvent> for EventSubscription {
    fn from(event: &HostEvent) -> Self {
        match event {
            HostEvent::PlaybackStart(_) => EventSubscription::PlaybackStart,
            HostEvent::PlaybackStopped(_) => EventSubscription::PlaybackStopped,
            HostEvent::UserDataSaved(_) => EventSubscription::UserDataSaved,
        }
    }
}

/// Type alias for a subscriber ID
pub type SubscriberId = u64;

/// Host side event feed, fanning each published event out to its subscribers.
///
/// The bus is owned by the host and handed to plugins; clones share the same
/// subscriber table.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<SubscriberId, (Sender<HostEvent>, Vec<EventSubscription>)>>>,
    next_id: Arc<Mutex<SubscriberId>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(0)),
        }
    }

    /// Subscribe to receive all events
    pub fn subscribe_all(&self) -> (SubscriberId, Receiver<HostEvent>) {
        self.subscribe(vec![EventSubscription::All])
    }

    /// Subscribe to receive specific event types
    pub fn subscribe(&self, event_types: Vec<EventSubscription>) -> (SubscriberId, Receiver<HostEvent>) {
        let (sender, receiver) = unbounded();

        let mut id_guard = self.next_id.lock();
        let id = *id_guard;
        *id_guard += 1;

        let mut subscribers = self.subscribers.lock();
        subscribers.insert(id, (sender, event_types));

        (id, receiver)
    }

    /// Unsubscribe from the event bus.
    ///
    /// Dropping the sender closes the subscriber's channel, which ends any
    /// worker spawned with [`EventBus::spawn_worker`].
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        subscribers.remove(&id).is_some()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish an event to all relevant subscribers
    pub fn publish(&self, event: HostEvent) {
        let subscribers = self.subscribers.lock();
        let event_type = EventSubscription::from(&event);

        for (_, (sender, subscriptions)) in subscribers.iter() {
            if subscriptions.contains(&EventSubscription::All) || subscriptions.contains(&event_type) {
                // Use try_send to avoid blocking if a subscriber is not consuming events
                let _ = sender.try_send(event.clone());
            }
        }
    }

    /// Spawn a worker thread that consumes events from a receiver and processes them
    pub fn spawn_worker<F>(&self, id: SubscriberId, receiver: Receiver<HostEvent>, worker: F) -> thread::JoinHandle<()>
    where
        F: FnMut(HostEvent) + Send + 'static,
    {
        let event_bus = self.clone();

        thread::spawn(move || {
            let mut worker = worker;

            // Process events until the channel is closed
            while let Ok(event) = receiver.recv() {
                worker(event);
            }

            // Clean up subscription when the thread exits
            event_bus.unsubscribe(id);
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MediaItem, PlaybackStartEvent, PlaybackStopEvent, UserId};
    use std::time::Duration;

    fn start_event() -> HostEvent {
        HostEvent::PlaybackStart(PlaybackStartEvent {
            item: MediaItem::audio("1", "Song", "Artist"),
            users: vec![UserId::new("u1")],
        })
    }

    #[test]
    fn test_subscribe_all() {
        let bus = EventBus::new();
        let (_, receiver) = bus.subscribe_all();

        bus.publish(start_event());

        let received = receiver.recv().unwrap();
        assert!(matches!(received, HostEvent::PlaybackStart(_)));
    }

    #[test]
    fn test_subscribe_specific() {
        let bus = EventBus::new();
        let (_, start_receiver) = bus.subscribe(vec![EventSubscription::PlaybackStart]);
        let (_, saved_receiver) = bus.subscribe(vec![EventSubscription::UserDataSaved]);

        bus.publish(start_event());

        assert!(matches!(start_receiver.recv().unwrap(), HostEvent::PlaybackStart(_)));
        assert!(saved_receiver.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (id, receiver) = bus.subscribe_all();

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(start_event());

        // Sender was dropped with the subscription
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_worker_exits_after_unsubscribe() {
        let bus = EventBus::new();
        let (id, receiver) = bus.subscribe(vec![EventSubscription::PlaybackStopped]);
        let (seen_tx, seen_rx) = unbounded();

        let handle = bus.spawn_worker(id, receiver, move |event| {
            let _ = seen_tx.send(event);
        });

        bus.publish(HostEvent::PlaybackStopped(PlaybackStopEvent {
            item: MediaItem::audio("1", "Song", "Artist"),
            users: vec![],
            played_to_completion: true,
        }));
        assert!(seen_rx.recv_timeout(Duration::from_secs(2)).is_ok());

        bus.unsubscribe(id);
        handle.join().unwrap();
    }
}
