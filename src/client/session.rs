use crate::callback::{CallbackManager, MessageCallback};
use crate::client::ProtocolClient;
use crate::constants::limits::{MAX_CLIENT_ID_LENGTH, MAX_MQTT_PACKET_SIZE};
use crate::constants::time::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_KEEP_ALIVE, NON_BLOCKING_POLL};
use crate::error::{ProbeError, Result};
use crate::packet::connect::ConnectPacket;
use crate::packet::puback::PubAckPacket;
use crate::packet::publish::PublishPacket;
use crate::packet::subscribe::SubscribePacket;
use crate::packet::unsubscribe::UnsubscribePacket;
use crate::packet::{Packet, PacketType};
use crate::topic_matching::{validate_filter, validate_topic};
use crate::transport::SecureTransport;
use crate::types::{ConnectOptions, Message, PublishOptions};
use crate::QoS;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 512;

/// Minimal MQTT 3.1.1 client session
///
/// Single-threaded and cooperative: nothing happens between calls. Each
/// request waits for its acknowledgement under the command timeout, and
/// messages that arrive meanwhile are dispatched to their callbacks before
/// the call returns.
#[derive(Debug)]
pub struct MqttSession {
    read_buf: BytesMut,
    callbacks: CallbackManager,
    next_packet_id: u16,
    connected: bool,
    keep_alive: Duration,
    command_timeout: Duration,
    max_packet_size: usize,
    /// Bytes still to drop from an oversized frame
    discarding: usize,
    last_sent: Instant,
    ping_outstanding: bool,
}

impl MqttSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            callbacks: CallbackManager::new(),
            next_packet_id: 0,
            connected: false,
            keep_alive: DEFAULT_KEEP_ALIVE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_packet_size: MAX_MQTT_PACKET_SIZE,
            discarding: 0,
            last_sent: Instant::now(),
            ping_outstanding: false,
        }
    }

    /// Sets the largest packet sent or accepted
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.callbacks.callback_count()
    }

    /// Packet identifiers run 1..=65535 and wrap
    fn next_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        self.next_packet_id
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ProbeError::NotConnected)
        }
    }

    async fn write_packet<T: SecureTransport>(
        &mut self,
        transport: &mut T,
        packet: &Packet,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf)?;
        if buf.len() > self.max_packet_size {
            return Err(ProbeError::BufferOverflow {
                needed: buf.len(),
                capacity: self.max_packet_size,
            });
        }
        trace!(packet_type = ?packet.packet_type(), len = buf.len(), "sending packet");

        let mut offset = 0;
        while offset < buf.len() {
            match transport.send(&buf[offset..]).await {
                Ok(0) => {
                    self.connected = false;
                    return Err(ProbeError::Connectivity(
                        "Connection closed while sending".to_string(),
                    ));
                }
                Ok(n) => offset += n,
                Err(e) if e.is_would_block() => tokio::time::sleep(NON_BLOCKING_POLL).await,
                Err(e) => return Err(e),
            }
        }
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Reads until one packet is complete or `deadline` passes
    async fn read_packet<T: SecureTransport>(
        &mut self,
        transport: &mut T,
        deadline: Instant,
    ) -> Result<Option<Packet>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.decode_buffered() {
                Ok(Some(packet)) => {
                    trace!(packet_type = ?packet.packet_type(), "received packet");
                    return Ok(Some(packet));
                }
                Ok(None) => {}
                Err(e) => {
                    self.connected = false;
                    self.read_buf.clear();
                    return Err(e);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            match timeout(deadline - now, transport.recv(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    self.connected = false;
                    return Err(ProbeError::Connectivity(
                        "Connection closed by broker".to_string(),
                    ));
                }
                Ok(Ok(n)) => self.read_buf.extend_from_slice(&chunk[..n]),
                Ok(Err(ProbeError::Timeout)) => {}
                Ok(Err(e)) if e.is_would_block() => {
                    let pause = NON_BLOCKING_POLL.min(deadline.saturating_duration_since(now));
                    tokio::time::sleep(pause).await;
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Decodes the next buffered packet, dropping frames over the size limit
    fn decode_buffered(&mut self) -> Result<Option<Packet>> {
        loop {
            if self.discarding > 0 {
                let dropped = self.discarding.min(self.read_buf.len());
                self.read_buf.advance(dropped);
                self.discarding -= dropped;
                if self.discarding > 0 {
                    return Ok(None);
                }
            }
            match Packet::frame_len(&self.read_buf)? {
                Some(total) if total > self.max_packet_size => {
                    warn!(
                        len = total,
                        max = self.max_packet_size,
                        "dropping packet larger than the receive limit"
                    );
                    self.discarding = total;
                }
                _ => return Packet::try_decode(&mut self.read_buf, self.max_packet_size),
            }
        }
    }

    /// Handles traffic the broker initiates; hands replies back to the caller
    async fn process<T: SecureTransport>(
        &mut self,
        transport: &mut T,
        packet: Packet,
    ) -> Result<Option<Packet>> {
        match packet {
            Packet::Publish(publish) => {
                self.deliver(transport, publish).await?;
                Ok(None)
            }
            Packet::PingResp => {
                self.ping_outstanding = false;
                Ok(None)
            }
            Packet::ConnAck(_) | Packet::SubAck(_) | Packet::UnsubAck(_) | Packet::PubAck(_) => {
                Ok(Some(packet))
            }
            other => Err(ProbeError::ProtocolError(format!(
                "Unexpected {:?} from broker",
                other.packet_type()
            ))),
        }
    }

    async fn deliver<T: SecureTransport>(
        &mut self,
        transport: &mut T,
        publish: PublishPacket,
    ) -> Result<()> {
        match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) => {}
            (QoS::AtLeastOnce, Some(packet_id)) => {
                self.write_packet(transport, &Packet::PubAck(PubAckPacket::new(packet_id)))
                    .await?;
            }
            (qos, _) => {
                return Err(ProbeError::ProtocolError(format!(
                    "Broker delivered {qos:?} message that was never requested"
                )));
            }
        }
        let message = Message::from(publish);
        if !self.callbacks.dispatch(&message) {
            debug!(topic = %message.topic, "no subscription matched arrived message");
        }
        Ok(())
    }

    /// Waits for the reply of `expected` type carrying `packet_id`
    async fn wait_for<T: SecureTransport>(
        &mut self,
        transport: &mut T,
        expected: PacketType,
        packet_id: Option<u16>,
    ) -> Result<Packet> {
        let deadline = Instant::now() + self.command_timeout;
        loop {
            let Some(packet) = self.read_packet(transport, deadline).await? else {
                return Err(ProbeError::Timeout);
            };
            let Some(reply) = self.process(transport, packet).await? else {
                continue;
            };
            if reply.packet_type() == expected && reply_id(&reply) == packet_id {
                return Ok(reply);
            }
            debug!(
                packet_type = ?reply.packet_type(),
                packet_id = ?reply_id(&reply),
                "ignoring unrelated acknowledgement"
            );
        }
    }

    async fn keep_alive_due<T: SecureTransport>(&mut self, transport: &mut T) -> Result<()> {
        if self.keep_alive.is_zero()
            || self.ping_outstanding
            || self.last_sent.elapsed() < self.keep_alive
        {
            return Ok(());
        }
        debug!("sending PINGREQ");
        self.write_packet(transport, &Packet::PingReq).await?;
        self.ping_outstanding = true;
        Ok(())
    }
}

impl Default for MqttSession {
    fn default() -> Self {
        Self::new()
    }
}

fn reply_id(packet: &Packet) -> Option<u16> {
    match packet {
        Packet::SubAck(ack) => Some(ack.packet_id),
        Packet::UnsubAck(ack) => Some(ack.packet_id),
        Packet::PubAck(ack) => Some(ack.packet_id),
        _ => None,
    }
}

/// Maps an acknowledgement timeout to the operation that timed out
fn timed_out_as(err: ProbeError, operation: impl FnOnce() -> ProbeError) -> ProbeError {
    match err {
        ProbeError::Timeout => operation(),
        other => other,
    }
}

impl<T: SecureTransport> ProtocolClient<T> for MqttSession {
    async fn connect(&mut self, transport: &mut T, options: &ConnectOptions) -> Result<()> {
        if self.connected {
            return Err(ProbeError::AlreadyConnected);
        }
        if options.client_id.len() > MAX_CLIENT_ID_LENGTH {
            return Err(ProbeError::ProtocolError(format!(
                "Client id longer than {MAX_CLIENT_ID_LENGTH} bytes"
            )));
        }

        self.read_buf.clear();
        self.discarding = 0;
        self.ping_outstanding = false;
        self.keep_alive = options.keep_alive;
        self.command_timeout = options.command_timeout;

        let mut connect = ConnectPacket::new(options.client_id.clone(), options.keep_alive_secs());
        if let Some(username) = &options.username {
            connect = connect.with_credentials(username.clone(), options.password.clone());
        }
        debug!(
            client_id = %options.client_id,
            protocol_level = options.protocol_level(),
            clean_session = options.clean_session(),
            "sending CONNECT"
        );
        self.write_packet(transport, &Packet::Connect(Box::new(connect)))
            .await?;

        match self.wait_for(transport, PacketType::ConnAck, None).await? {
            Packet::ConnAck(connack) if connack.return_code.is_accepted() => {
                self.connected = true;
                Ok(())
            }
            Packet::ConnAck(connack) => Err(ProbeError::ConnectionRefused(connack.return_code)),
            other => Err(ProbeError::ProtocolError(format!(
                "Expected CONNACK, got {:?}",
                other.packet_type()
            ))),
        }
    }

    async fn subscribe(
        &mut self,
        transport: &mut T,
        filter: &str,
        qos: QoS,
        callback: MessageCallback,
    ) -> Result<QoS> {
        self.ensure_connected()?;
        validate_filter(filter)?;
        if qos == QoS::ExactlyOnce {
            return Err(ProbeError::QoSNotSupported);
        }

        let packet_id = self.next_id();
        self.callbacks.register(filter, callback);
        let packet = SubscribePacket::new(packet_id).add_filter(filter, qos);

        let result = async {
            self.write_packet(transport, &Packet::Subscribe(packet)).await?;
            self.wait_for(transport, PacketType::SubAck, Some(packet_id))
                .await
                .map_err(|e| timed_out_as(e, || ProbeError::SubscriptionFailed(filter.to_string())))
        }
        .await;

        let granted = match result {
            Ok(Packet::SubAck(suback)) => suback.granted().first().copied().flatten(),
            Ok(_) => None,
            Err(e) => {
                self.callbacks.unregister(filter);
                return Err(e);
            }
        };
        if let Some(granted) = granted {
            Ok(granted)
        } else {
            self.callbacks.unregister(filter);
            Err(ProbeError::SubscriptionFailed(filter.to_string()))
        }
    }

    async fn unsubscribe(&mut self, transport: &mut T, filter: &str) -> Result<()> {
        self.ensure_connected()?;
        validate_filter(filter)?;

        let packet_id = self.next_id();
        self.callbacks.unregister(filter);
        let packet = UnsubscribePacket::new(packet_id).add_filter(filter);
        self.write_packet(transport, &Packet::Unsubscribe(packet))
            .await?;
        self.wait_for(transport, PacketType::UnsubAck, Some(packet_id))
            .await
            .map_err(|e| timed_out_as(e, || ProbeError::UnsubscriptionFailed(filter.to_string())))?;
        Ok(())
    }

    async fn publish(
        &mut self,
        transport: &mut T,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> Result<()> {
        self.ensure_connected()?;
        validate_topic(topic)?;

        let mut packet = PublishPacket::new(topic, payload.to_vec(), options.qos)
            .with_retain(options.retain)
            .with_dup(options.dup);
        let packet_id = match options.qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => {
                let id = self.next_id();
                packet = packet.with_packet_id(id);
                Some(id)
            }
            QoS::ExactlyOnce => return Err(ProbeError::QoSNotSupported),
        };

        self.write_packet(transport, &Packet::Publish(packet)).await?;
        if packet_id.is_some() {
            self.wait_for(transport, PacketType::PubAck, packet_id)
                .await
                .map_err(|e| timed_out_as(e, || ProbeError::PublishFailed(topic.to_string())))?;
        }
        Ok(())
    }

    async fn yield_for(&mut self, transport: &mut T, duration: Duration) -> Result<()> {
        self.ensure_connected()?;
        let deadline = Instant::now() + duration;
        loop {
            self.keep_alive_due(transport).await?;
            let Some(packet) = self.read_packet(transport, deadline).await? else {
                return Ok(());
            };
            if let Some(reply) = self.process(transport, packet).await? {
                debug!(packet_type = ?reply.packet_type(), "late acknowledgement ignored");
            }
        }
    }

    async fn disconnect(&mut self, transport: &mut T) -> Result<()> {
        self.ensure_connected()?;
        self.connected = false;
        self.callbacks.clear();
        self.read_buf.clear();
        let result = self.write_packet(transport, &Packet::Disconnect).await;
        if let Err(e) = &result {
            warn!(error = %e, "DISCONNECT could not be sent");
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
