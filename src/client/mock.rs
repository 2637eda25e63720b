//! Scriptable protocol client
//!
//! Records every call and fails on demand, so orchestration can be tested
//! without speaking MQTT. Published messages can be echoed back: they are
//! queued and handed to the matching subscription callback on the next
//! `yield_for`, the way a broker delivers them.

use crate::callback::{CallbackManager, MessageCallback};
use crate::client::ProtocolClient;
use crate::error::{ProbeError, Result};
use crate::transport::SecureTransport;
use crate::types::{ConnectOptions, Message, PublishOptions};
use crate::QoS;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Record of a call made to the mock client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect {
        client_id: String,
        clean_session: bool,
        protocol_level: u8,
    },
    Subscribe {
        filter: String,
        qos: QoS,
    },
    Unsubscribe {
        filter: String,
    },
    Publish {
        topic: String,
        payload: Vec<u8>,
        options: PublishOptions,
    },
    Yield(Duration),
    Disconnect,
}

#[derive(Debug, Default)]
struct MockClientState {
    connected: bool,
    calls: Vec<MockCall>,
    callbacks: CallbackManager,
    pending: VecDeque<Message>,
    echo_copies: u32,
    connect_error: Option<ProbeError>,
    refused_subscriptions: HashSet<String>,
    failing_unsubscriptions: HashSet<String>,
    fail_publish: bool,
    fail_yield: bool,
    fail_disconnect: bool,
}

/// Mock protocol client for testing
///
/// Clones share state: keep one handle for inspection and give the other to
/// the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockProtocolClient {
    state: Arc<Mutex<MockClientState>>,
}

impl MockProtocolClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose publishes come back once to matching subscriptions
    #[must_use]
    pub fn echoing() -> Self {
        let client = Self::new();
        client.set_echo_copies(1);
        client
    }

    fn state(&self) -> MutexGuard<'_, MockClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How many copies of each publish are delivered back; 0 disables echo
    pub fn set_echo_copies(&self, copies: u32) {
        self.state().echo_copies = copies;
    }

    pub fn fail_connect(&self, error: ProbeError) {
        self.state().connect_error = Some(error);
    }

    pub fn refuse_subscription(&self, filter: impl Into<String>) {
        self.state().refused_subscriptions.insert(filter.into());
    }

    pub fn fail_unsubscription(&self, filter: impl Into<String>) {
        self.state().failing_unsubscriptions.insert(filter.into());
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state().fail_publish = fail;
    }

    pub fn fail_yield(&self, fail: bool) {
        self.state().fail_yield = fail;
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    /// Queues a message for delivery on the next yield
    pub fn inject(&self, message: Message) {
        self.state().pending.push_back(message);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state().callbacks.callback_count()
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        self.state().connected
    }

    fn ensure_connected(state: &MockClientState) -> Result<()> {
        if state.connected {
            Ok(())
        } else {
            Err(ProbeError::NotConnected)
        }
    }

    /// Runs callbacks outside the lock so they may inspect the mock
    fn deliver_pending(&self) {
        let (callbacks, pending) = {
            let mut state = self.state();
            let pending: Vec<Message> = state.pending.drain(..).collect();
            (state.callbacks.clone(), pending)
        };
        for message in &pending {
            callbacks.dispatch(message);
        }
    }
}

impl<T: SecureTransport> ProtocolClient<T> for MockProtocolClient {
    async fn connect(&mut self, _transport: &mut T, options: &ConnectOptions) -> Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Connect {
            client_id: options.client_id.clone(),
            clean_session: options.clean_session(),
            protocol_level: options.protocol_level(),
        });
        if state.connected {
            return Err(ProbeError::AlreadyConnected);
        }
        if let Some(error) = state.connect_error.clone() {
            return Err(error);
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(
        &mut self,
        _transport: &mut T,
        filter: &str,
        qos: QoS,
        callback: MessageCallback,
    ) -> Result<QoS> {
        let mut state = self.state();
        state.calls.push(MockCall::Subscribe {
            filter: filter.to_string(),
            qos,
        });
        Self::ensure_connected(&state)?;
        if qos == QoS::ExactlyOnce {
            return Err(ProbeError::QoSNotSupported);
        }
        if state.refused_subscriptions.contains(filter) {
            return Err(ProbeError::SubscriptionFailed(filter.to_string()));
        }
        state.callbacks.register(filter, callback);
        Ok(qos)
    }

    async fn unsubscribe(&mut self, _transport: &mut T, filter: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Unsubscribe {
            filter: filter.to_string(),
        });
        Self::ensure_connected(&state)?;
        state.callbacks.unregister(filter);
        if state.failing_unsubscriptions.contains(filter) {
            return Err(ProbeError::UnsubscriptionFailed(filter.to_string()));
        }
        Ok(())
    }

    async fn publish(
        &mut self,
        _transport: &mut T,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            options,
        });
        Self::ensure_connected(&state)?;
        if options.qos == QoS::ExactlyOnce {
            return Err(ProbeError::QoSNotSupported);
        }
        if state.fail_publish {
            return Err(ProbeError::PublishFailed(topic.to_string()));
        }
        for _ in 0..state.echo_copies {
            state.pending.push_back(Message {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos: options.qos,
                retain: false,
                dup: false,
                packet_id: None,
            });
        }
        Ok(())
    }

    async fn yield_for(&mut self, _transport: &mut T, duration: Duration) -> Result<()> {
        {
            let mut state = self.state();
            state.calls.push(MockCall::Yield(duration));
            Self::ensure_connected(&state)?;
            if state.fail_yield {
                return Err(ProbeError::Connectivity("Mock yield failure".to_string()));
            }
        }
        self.deliver_pending();
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn disconnect(&mut self, _transport: &mut T) -> Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Disconnect);
        Self::ensure_connected(&state)?;
        state.connected = false;
        state.callbacks.clear();
        state.pending.clear();
        if state.fail_disconnect {
            return Err(ProbeError::Connectivity("Mock disconnect failure".to_string()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected()
    }
}
