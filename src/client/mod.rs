//! MQTT 3.1.1 protocol client
//!
//! The client drives a session over a [`SecureTransport`] that it borrows
//! for every call: the caller owns the connection and stays responsible for
//! closing it. Arrived messages are only processed inside client calls,
//! mostly [`ProtocolClient::yield_for`], which is the single cooperative
//! point where inbound I/O is serviced and callbacks run.

pub mod mock;
mod session;

pub use self::mock::{MockCall, MockProtocolClient};
pub use self::session::MqttSession;

use crate::callback::MessageCallback;
use crate::error::Result;
use crate::transport::SecureTransport;
use crate::types::{ConnectOptions, PublishOptions};
use crate::QoS;
use std::future::Future;
use std::time::Duration;

/// The operations a topic session needs from a protocol client
///
/// Exactly-once delivery is never requested: brokers of this kind do not
/// acknowledge it, so implementations reject [`QoS::ExactlyOnce`] with
/// `ProbeError::QoSNotSupported`.
pub trait ProtocolClient<T: SecureTransport>: Send {
    /// Performs the CONNECT/CONNACK handshake
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ConnectionRefused` if the broker rejects the
    /// handshake, or a transport error
    fn connect(
        &mut self,
        transport: &mut T,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribes to a filter and registers its arrival callback, returning
    /// the granted `QoS`
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::SubscriptionFailed` if the broker refuses the
    /// filter or does not acknowledge in time
    fn subscribe(
        &mut self,
        transport: &mut T,
        filter: &str,
        qos: QoS,
        callback: MessageCallback,
    ) -> impl Future<Output = Result<QoS>> + Send;

    /// Unsubscribes from a filter and drops its callback
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::UnsubscriptionFailed` if the broker does not
    /// acknowledge in time
    fn unsubscribe(
        &mut self,
        transport: &mut T,
        filter: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Publishes a message, waiting for PUBACK at `QoS` 1
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::PublishFailed` if the broker does not
    /// acknowledge in time, or an encoding error for an invalid topic
    fn publish(
        &mut self,
        transport: &mut T,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Services inbound traffic for `duration`, invoking callbacks for
    /// arrived messages
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails while waiting
    fn yield_for(
        &mut self,
        transport: &mut T,
        duration: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Sends DISCONNECT and forgets all subscriptions
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::NotConnected` if no session is active, or a
    /// transport error
    fn disconnect(&mut self, transport: &mut T) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;
}
