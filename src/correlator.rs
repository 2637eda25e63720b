//! Echo detection for group exchanges

use crate::callback::MessageCallback;
use crate::types::Message;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

/// Counts messages that arrived on any subscribed filter of the active group
///
/// The counter is a liveness signal only: it says that some message came
/// back, not which publish it answers. Clones share the same count, so the
/// orchestrator keeps one handle while the subscription callback owns
/// another. Each orchestrator owns its own counter.
#[derive(Debug, Clone, Default)]
pub struct ArrivalCounter {
    count: Arc<AtomicU32>,
}

impl ArrivalCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_arrivals(&self) -> bool {
        self.count() > 0
    }

    /// Builds the message-arrived callback registered for every filter
    ///
    /// The callback logs the delivery attributes and payload, then counts
    /// the arrival once.
    #[must_use]
    pub fn callback(&self) -> MessageCallback {
        let counter = self.clone();
        Arc::new(move |message: &Message| {
            info!(
                topic = %message.topic,
                qos = ?message.qos,
                retained = message.retain,
                dup = message.dup,
                packet_id = ?message.packet_id,
                "Message arrived"
            );
            info!(payload = %message.payload_str(), "Payload");
            counter.increment();
        })
    }
}
