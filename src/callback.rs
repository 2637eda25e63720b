use crate::topic_matching;
use crate::types::Message;
use std::sync::Arc;

/// Type alias for message-arrived callbacks
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Entry storing a callback with the filter it was registered for
#[derive(Clone)]
struct CallbackEntry {
    topic_filter: String,
    callback: MessageCallback,
}

/// Routes arrived messages to subscription callbacks
///
/// Each arrived message is handed to exactly one callback: the first
/// registered filter that matches its topic. Overlapping filters therefore
/// never deliver the same message twice.
#[derive(Clone, Default)]
pub struct CallbackManager {
    entries: Vec<CallbackEntry>,
}

impl CallbackManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for a topic filter, replacing any previous
    /// callback for the same filter while keeping its position
    pub fn register(&mut self, topic_filter: impl Into<String>, callback: MessageCallback) {
        let topic_filter = topic_filter.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.topic_filter == topic_filter)
        {
            entry.callback = callback;
        } else {
            self.entries.push(CallbackEntry {
                topic_filter,
                callback,
            });
        }
    }

    /// Removes the callback for a filter; returns whether one existed
    pub fn unregister(&mut self, topic_filter: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.topic_filter != topic_filter);
        self.entries.len() < before
    }

    /// Dispatches a message; returns false when no filter matched
    pub fn dispatch(&self, message: &Message) -> bool {
        let Some(entry) = self
            .entries
            .iter()
            .find(|entry| topic_matching::matches(&message.topic, &entry.topic_filter))
        else {
            return false;
        };
        (entry.callback)(message);
        true
    }

    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackManager")
            .field(
                "filters",
                &self
                    .entries
                    .iter()
                    .map(|entry| entry.topic_filter.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QoS;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn message(topic: &str) -> Message {
        Message {
            topic: topic.to_string(),
            payload: b"{}".to_vec(),
            qos: QoS::AtLeastOnce,
            retain: false,
            dup: false,
            packet_id: Some(1),
        }
    }

    fn counting(counter: &Arc<AtomicU32>, step: u32) -> MessageCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_msg: &Message| {
            counter.fetch_add(step, Ordering::Relaxed);
        })
    }

    #[test]
    fn test_exact_and_wildcard_dispatch() {
        let mut manager = CallbackManager::new();
        let counter = Arc::new(AtomicU32::new(0));
        manager.register("Nuvoton/Mbed/+", counting(&counter, 1));

        assert!(manager.dispatch(&message("Nuvoton/Mbed/D001")));
        assert!(!manager.dispatch(&message("Nuvoton/Other/D001")));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_overlapping_filters_deliver_once() {
        let mut manager = CallbackManager::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        manager.register("a/+", counting(&first, 1));
        manager.register("a/b", counting(&second, 1));

        manager.dispatch(&message("a/b"));
        assert_eq!(first.load(Ordering::Relaxed), 1);
        assert_eq!(second.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_reregister_replaces() {
        let mut manager = CallbackManager::new();
        let counter = Arc::new(AtomicU32::new(0));
        manager.register("a/b", counting(&counter, 1));
        manager.register("a/b", counting(&counter, 10));
        assert_eq!(manager.callback_count(), 1);

        manager.dispatch(&message("a/b"));
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_unregister() {
        let mut manager = CallbackManager::new();
        let counter = Arc::new(AtomicU32::new(0));
        manager.register("a/b", counting(&counter, 1));

        assert!(manager.unregister("a/b"));
        assert!(!manager.unregister("a/b"));
        assert!(!manager.dispatch(&message("a/b")));
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        manager.register("x/#", counting(&counter, 1));
        manager.clear();
        assert_eq!(manager.callback_count(), 0);
    }
}
