//! Change notification for message sets

use crate::message::MessageKey;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Event delivered to subscribers after a validation pass changed messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEvent {
    /// The messages reported under `key` changed
    MessagesChanged(MessageKey),
    /// The aggregate view changed; sent once per pass after the per-key events
    AllMessagesChanged,
}

/// Handle returned by [`ChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback
pub type Listener = Arc<dyn Fn(&ValidationEvent) + Send + Sync>;

/// Keys whose content changed during one pass, in discovery order without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    keys: Vec<MessageKey>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: MessageKey) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn extend<I: IntoIterator<Item = MessageKey>>(&mut self, keys: I) {
        for key in keys {
            self.push(key);
        }
    }

    pub fn keys(&self) -> &[MessageKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Dispatches change events to subscribers
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ValidationEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        debug!("Added validation listener {:?}", id);
        id
    }

    /// Remove a subscriber, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Emit one event per changed key, then one aggregate event; nothing for an empty set
    pub fn notify(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }

        // Listeners run outside the lock so they may subscribe or unsubscribe
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!(
            "Notifying {} listener(s) about {} changed key(s)",
            listeners.len(),
            changes.keys().len()
        );

        for key in changes.keys() {
            let event = ValidationEvent::MessagesChanged(key.clone());
            for listener in &listeners {
                deliver(listener, &event);
            }
        }
        for listener in &listeners {
            deliver(listener, &ValidationEvent::AllMessagesChanged);
        }
    }
}

/// A panicking listener is logged and skipped; the others still receive the event
fn deliver(listener: &Listener, event: &ValidationEvent) {
    if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
        warn!("Validation listener panicked while handling {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_notifier() -> (ChangeNotifier, Arc<Mutex<Vec<ValidationEvent>>>, SubscriptionId) {
        let notifier = ChangeNotifier::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let id = notifier.subscribe(move |event| sink.lock().push(event.clone()));
        (notifier, events, id)
    }

    #[test]
    fn test_notify_once_per_key_then_aggregate() {
        let (notifier, events, _) = recording_notifier();
        let mut changes = ChangeSet::new();
        changes.push(MessageKey::property("B"));
        changes.extend([MessageKey::property("A"), MessageKey::property("B")]);

        notifier.notify(&changes);

        assert_eq!(
            *events.lock(),
            vec![
                ValidationEvent::MessagesChanged(MessageKey::property("B")),
                ValidationEvent::MessagesChanged(MessageKey::property("A")),
                ValidationEvent::AllMessagesChanged,
            ]
        );
    }

    #[test]
    fn test_empty_change_set_is_silent() {
        let (notifier, events, _) = recording_notifier();
        notifier.notify(&ChangeSet::new());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let notifier = ChangeNotifier::new();
        notifier.subscribe(|_| panic!("listener bug"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        notifier.subscribe(move |event| sink.lock().push(event.clone()));

        let mut changes = ChangeSet::new();
        changes.push(MessageKey::property("Bid"));
        notifier.notify(&changes);

        assert_eq!(
            *events.lock(),
            vec![
                ValidationEvent::MessagesChanged(MessageKey::property("Bid")),
                ValidationEvent::AllMessagesChanged,
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let (notifier, events, id) = recording_notifier();
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.listener_count(), 0);

        let mut changes = ChangeSet::new();
        changes.push(MessageKey::Entity);
        notifier.notify(&changes);
        assert!(events.lock().is_empty());
    }
}
