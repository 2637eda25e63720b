//! Scriptable transport and network doubles
//!
//! `MockTransport` is cheaply cloneable: clones share state, so a test keeps
//! one handle for inspection while the session under test owns the other.
//! It can act as a minimal MQTT 3.1.1 broker or as an HTTP server so that
//! the real session and runner code paths run without a network.

use crate::constants::{limits::MAX_MQTT_PACKET_SIZE, SUBACK_FAILURE};
use crate::error::{ProbeError, Result};
use crate::packet::connack::{ConnAckPacket, ConnectReturnCode};
use crate::packet::puback::PubAckPacket;
use crate::packet::publish::PublishPacket;
use crate::packet::suback::SubAckPacket;
use crate::packet::unsuback::UnsubAckPacket;
use crate::packet::Packet;
use crate::topic_matching;
use crate::transport::{NetworkInterface, SecureTransport};
use crate::QoS;
use bytes::BytesMut;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Mock transport behavior configuration
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub fail_root_ca: bool,
    pub fail_client_cert: bool,
    pub fail_open: bool,
    pub fail_connect: bool,
    pub fail_send: bool,
    pub fail_recv: bool,
    /// Non-blocking sends that report `WouldBlock` before making progress
    pub would_block_sends: u32,
    /// Non-blocking receives that report `WouldBlock` before data is handed out
    pub would_block_recvs: u32,
    /// Maximum bytes accepted per send
    pub send_chunk_size: usize,
    /// Maximum bytes returned per receive
    pub recv_chunk_size: usize,
    /// How long a blocking receive waits for data
    pub io_timeout: Duration,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            fail_root_ca: false,
            fail_client_cert: false,
            fail_open: false,
            fail_connect: false,
            fail_send: false,
            fail_recv: false,
            would_block_sends: 0,
            would_block_recvs: 0,
            send_chunk_size: usize::MAX,
            recv_chunk_size: usize::MAX,
            io_timeout: Duration::from_secs(2),
        }
    }
}

/// Record of a call made on the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    SetHostname(String),
    SetRootCaCert,
    SetClientCertKey,
    SetBlocking(bool),
    Open,
    Connect(SocketAddr),
    Send(usize),
    Close,
    Release,
}

/// Minimal broker living behind the mock transport
#[derive(Debug, Default)]
struct MockBroker {
    inbound: BytesMut,
    connack_code: Option<ConnectReturnCode>,
    silent: bool,
    echo: bool,
    refused_filters: HashSet<String>,
    unacked_unsubscribes: HashSet<String>,
    reply_routes: HashMap<String, String>,
    subscriptions: Vec<(String, QoS)>,
    received: Vec<Packet>,
    next_packet_id: u16,
}

impl MockBroker {
    fn next_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        self.next_packet_id
    }

    fn deliver(&mut self, topic: &str, payload: &[u8], out: &mut Vec<u8>) {
        let Some(granted) = self
            .subscriptions
            .iter()
            .filter(|(filter, _)| topic_matching::matches(topic, filter))
            .map(|(_, qos)| *qos)
            .max_by_key(|qos| u8::from(*qos))
        else {
            return;
        };
        let mut packet = PublishPacket::new(topic, payload.to_vec(), granted);
        if granted != QoS::AtMostOnce {
            packet = packet.with_packet_id(self.next_id());
        }
        let _ = Packet::Publish(packet).encode(out);
    }

    /// Consumes client bytes and returns the broker's reply bytes
    fn feed(&mut self, bytes: &[u8]) -> (Vec<u8>, bool) {
        self.inbound.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut closed = false;
        while let Ok(Some(packet)) = Packet::try_decode(&mut self.inbound, MAX_MQTT_PACKET_SIZE) {
            self.received.push(packet.clone());
            if self.silent {
                continue;
            }
            match packet {
                Packet::Connect(_) => {
                    let code = self.connack_code.unwrap_or(ConnectReturnCode::Accepted);
                    let _ = Packet::ConnAck(ConnAckPacket::new(code)).encode(&mut out);
                }
                Packet::Subscribe(subscribe) => {
                    let mut codes = Vec::with_capacity(subscribe.filters.len());
                    for (filter, requested) in subscribe.filters {
                        if self.refused_filters.contains(&filter) {
                            codes.push(SUBACK_FAILURE);
                            continue;
                        }
                        // Brokers of this kind never grant exactly-once.
                        let granted = if requested == QoS::ExactlyOnce {
                            QoS::AtLeastOnce
                        } else {
                            requested
                        };
                        codes.push(u8::from(granted));
                        self.subscriptions.retain(|(f, _)| *f != filter);
                        self.subscriptions.push((filter, granted));
                    }
                    let _ = Packet::SubAck(SubAckPacket::new(subscribe.packet_id, codes))
                        .encode(&mut out);
                }
                Packet::Unsubscribe(unsubscribe) => {
                    let mut ack = true;
                    for filter in &unsubscribe.filters {
                        self.subscriptions.retain(|(f, _)| f != filter);
                        if self.unacked_unsubscribes.contains(filter) {
                            ack = false;
                        }
                    }
                    if ack {
                        let _ = Packet::UnsubAck(UnsubAckPacket::new(unsubscribe.packet_id))
                            .encode(&mut out);
                    }
                }
                Packet::Publish(publish) => {
                    if let Some(id) = publish.packet_id {
                        let _ = Packet::PubAck(PubAckPacket::new(id)).encode(&mut out);
                    }
                    if let Some(reply) = self.reply_routes.get(&publish.topic_name).cloned() {
                        self.deliver(&reply, &publish.payload, &mut out);
                    } else if self.echo {
                        self.deliver(&publish.topic_name, &publish.payload, &mut out);
                    }
                }
                Packet::PingReq => {
                    let _ = Packet::PingResp.encode(&mut out);
                }
                Packet::Disconnect => closed = true,
                _ => {}
            }
        }
        (out, closed)
    }
}

/// Minimal HTTP server living behind the mock transport
#[derive(Debug, Default)]
struct MockHttpServer {
    inbound: Vec<u8>,
    responses: VecDeque<Vec<u8>>,
    requests: Vec<String>,
}

impl MockHttpServer {
    fn complete_request_len(&self) -> Option<usize> {
        let head_end = self.inbound.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
        let head = String::from_utf8_lossy(&self.inbound[..head_end]);
        let body_len = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let total = head_end + body_len;
        (self.inbound.len() >= total).then_some(total)
    }

    fn feed(&mut self, bytes: &[u8]) -> (Vec<u8>, bool) {
        self.inbound.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut closed = false;
        while let Some(len) = self.complete_request_len() {
            let request: Vec<u8> = self.inbound.drain(..len).collect();
            self.requests
                .push(String::from_utf8_lossy(&request).into_owned());
            match self.responses.pop_front() {
                Some(response) => out.extend_from_slice(&response),
                None => closed = true,
            }
        }
        (out, closed)
    }
}

#[derive(Debug, Default)]
struct MockState {
    behavior: MockBehavior,
    calls: Vec<TransportCall>,
    hostname: Option<String>,
    blocking: bool,
    opened: bool,
    connected: bool,
    peer_closed: bool,
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
    recv_calls: usize,
    close_count: usize,
    release_count: usize,
    broker: Option<MockBroker>,
    http: Option<MockHttpServer>,
}

impl MockState {
    fn absorb(&mut self, bytes: &[u8]) {
        let reply = if let Some(broker) = self.broker.as_mut() {
            Some(broker.feed(bytes))
        } else {
            self.http.as_mut().map(|http| http.feed(bytes))
        };
        if let Some((out, closed)) = reply {
            self.incoming.extend(out);
            if closed {
                self.peer_closed = true;
            }
        }
    }
}

/// Mock transport for testing
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                blocking: true,
                ..MockState::default()
            })),
        }
    }

    /// Answers MQTT traffic like an accepting broker that echoes publishes
    /// back to matching subscriptions
    #[must_use]
    pub fn with_broker() -> Self {
        let transport = Self::new();
        transport.state().broker = Some(MockBroker {
            echo: true,
            ..MockBroker::default()
        });
        transport
    }

    /// Answers each complete HTTP request with the next queued response;
    /// closes the stream when the queue runs dry
    #[must_use]
    pub fn with_http_responses<I, R>(responses: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Vec<u8>>,
    {
        let transport = Self::new();
        transport.state().http = Some(MockHttpServer {
            responses: responses.into_iter().map(Into::into).collect(),
            ..MockHttpServer::default()
        });
        transport
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broker<T>(&self, f: impl FnOnce(&mut MockBroker) -> T) -> T {
        let mut state = self.state();
        f(state.broker.get_or_insert_with(MockBroker::default))
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.state().behavior = behavior;
    }

    pub fn update_behavior(&self, f: impl FnOnce(&mut MockBehavior)) {
        f(&mut self.state().behavior);
    }

    /// Makes the broker refuse the CONNECT with the given code
    pub fn refuse_connect(&self, code: ConnectReturnCode) {
        self.broker(|b| b.connack_code = Some(code));
    }

    /// Makes the broker record packets without ever answering
    pub fn set_broker_silent(&self, silent: bool) {
        self.broker(|b| b.silent = silent);
    }

    pub fn set_echo(&self, echo: bool) {
        self.broker(|b| b.echo = echo);
    }

    /// Answers SUBSCRIBE requests for `filter` with the failure return code
    pub fn refuse_subscription(&self, filter: impl Into<String>) {
        self.broker(|b| {
            b.refused_filters.insert(filter.into());
        });
    }

    /// Never acknowledges UNSUBSCRIBE requests for `filter`
    pub fn withhold_unsuback(&self, filter: impl Into<String>) {
        self.broker(|b| {
            b.unacked_unsubscribes.insert(filter.into());
        });
    }

    /// Publishes to `topic` are answered on `reply_topic` instead of echoed
    pub fn add_reply_route(&self, topic: impl Into<String>, reply_topic: impl Into<String>) {
        self.broker(|b| {
            b.reply_routes.insert(topic.into(), reply_topic.into());
        });
    }

    /// Packets the broker has decoded from the client
    #[must_use]
    pub fn received_packets(&self) -> Vec<Packet> {
        self.state()
            .broker
            .as_ref()
            .map(|b| b.received.clone())
            .unwrap_or_default()
    }

    /// HTTP requests the server has seen
    #[must_use]
    pub fn http_requests(&self) -> Vec<String> {
        self.state()
            .http
            .as_ref()
            .map(|h| h.requests.clone())
            .unwrap_or_default()
    }

    /// Queues raw bytes for the client to receive
    pub fn add_incoming_data(&self, data: &[u8]) {
        self.state().incoming.extend(data);
    }

    /// Makes the stream report end-of-stream once queued data is drained
    pub fn close_from_peer(&self) {
        self.state().peer_closed = true;
    }

    #[must_use]
    pub fn written_data(&self) -> Vec<u8> {
        self.state().outgoing.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn recv_calls(&self) -> usize {
        self.state().recv_calls
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    #[must_use]
    pub fn release_count(&self) -> usize {
        self.state().release_count
    }

    #[must_use]
    pub fn hostname(&self) -> Option<String> {
        self.state().hostname.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn try_recv(&self, buf: &mut [u8]) -> Option<Result<usize>> {
        let mut state = self.state();
        state.recv_calls += 1;
        if state.behavior.fail_recv {
            return Some(Err(ProbeError::Connectivity("Mock recv failure".to_string())));
        }
        if !state.connected {
            return Some(Err(ProbeError::NotConnected));
        }
        if !state.blocking && state.behavior.would_block_recvs > 0 {
            state.behavior.would_block_recvs -= 1;
            return Some(Err(ProbeError::WouldBlock));
        }
        if !state.incoming.is_empty() {
            let n = state
                .incoming
                .len()
                .min(buf.len())
                .min(state.behavior.recv_chunk_size);
            for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
                *slot = byte;
            }
            return Some(Ok(n));
        }
        if state.peer_closed {
            return Some(Ok(0));
        }
        if !state.blocking {
            return Some(Err(ProbeError::WouldBlock));
        }
        None
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureTransport for MockTransport {
    fn set_hostname(&mut self, hostname: &str) {
        let mut state = self.state();
        state.hostname = Some(hostname.to_string());
        state.calls.push(TransportCall::SetHostname(hostname.to_string()));
    }

    fn set_root_ca_cert(&mut self, _pem: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::SetRootCaCert);
        if state.behavior.fail_root_ca {
            return Err(ProbeError::TransportSetup("Mock root CA rejected".to_string()));
        }
        Ok(())
    }

    fn set_client_cert_key(&mut self, _cert_pem: &[u8], _key_pem: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::SetClientCertKey);
        if state.behavior.fail_client_cert {
            return Err(ProbeError::TransportSetup(
                "Mock client certificate rejected".to_string(),
            ));
        }
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) {
        let mut state = self.state();
        state.blocking = blocking;
        state.calls.push(TransportCall::SetBlocking(blocking));
    }

    fn is_blocking(&self) -> bool {
        self.state().blocking
    }

    fn open<N: NetworkInterface>(&mut self, network: &N) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::Open);
        if state.behavior.fail_open || !network.is_up() {
            return Err(ProbeError::Connectivity("Mock open failure".to_string()));
        }
        state.opened = true;
        Ok(())
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::Connect(addr));
        if state.behavior.fail_connect {
            return Err(ProbeError::Connectivity("Mock connect failure".to_string()));
        }
        if !state.opened {
            return Err(ProbeError::Connectivity("Socket not open".to_string()));
        }
        if state.connected {
            return Err(ProbeError::AlreadyConnected);
        }
        state.connected = true;
        Ok(())
    }

    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state();
        if state.behavior.fail_send {
            return Err(ProbeError::Connectivity("Mock send failure".to_string()));
        }
        if !state.connected {
            return Err(ProbeError::NotConnected);
        }
        if !state.blocking && state.behavior.would_block_sends > 0 {
            state.behavior.would_block_sends -= 1;
            return Err(ProbeError::WouldBlock);
        }
        let n = buf.len().min(state.behavior.send_chunk_size);
        state.outgoing.extend_from_slice(&buf[..n]);
        state.calls.push(TransportCall::Send(n));
        state.absorb(&buf[..n]);
        Ok(n)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let deadline = Instant::now() + self.state().behavior.io_timeout;
        loop {
            if let Some(result) = self.try_recv(buf) {
                return result;
            }
            if Instant::now() >= deadline {
                return Err(ProbeError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::Close);
        state.close_count += 1;
        state.connected = false;
        state.opened = false;
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state();
        state.calls.push(TransportCall::Release);
        state.release_count += 1;
        state.connected = false;
        state.opened = false;
    }

    fn is_open(&self) -> bool {
        self.state().opened
    }
}

/// Scriptable network interface
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<MockNetworkState>>,
}

#[derive(Debug, Default)]
struct MockNetworkState {
    up: bool,
    fail_connect: bool,
    fail_disconnect: bool,
    fail_resolve: bool,
    hosts: HashMap<String, IpAddr>,
    resolved: Vec<String>,
    disconnects: usize,
}

impl MockNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A network that is already up
    #[must_use]
    pub fn connected() -> Self {
        let network = Self::new();
        network.set_up(true);
        network
    }

    fn state(&self) -> MutexGuard<'_, MockNetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_up(&self, up: bool) {
        self.state().up = up;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    pub fn fail_resolve(&self, fail: bool) {
        self.state().fail_resolve = fail;
    }

    /// Maps a host name to an address; unmapped names resolve to loopback
    pub fn add_host(&self, host: impl Into<String>, ip: IpAddr) {
        self.state().hosts.insert(host.into(), ip);
    }

    #[must_use]
    pub fn resolved_hosts(&self) -> Vec<String> {
        self.state().resolved.clone()
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }
}

impl NetworkInterface for MockNetwork {
    async fn connect(&self) -> Result<()> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(ProbeError::Connectivity("Mock network unavailable".to_string()));
        }
        state.up = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state();
        state.disconnects += 1;
        state.up = false;
        if state.fail_disconnect {
            return Err(ProbeError::Connectivity("Mock disconnect failure".to_string()));
        }
        Ok(())
    }

    async fn ip_address(&self) -> Result<IpAddr> {
        if self.state().up {
            Ok(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
        } else {
            Err(ProbeError::Connectivity("Interface down".to_string()))
        }
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let mut state = self.state();
        state.resolved.push(host.to_string());
        if state.fail_resolve {
            return Err(ProbeError::Dns(host.to_string()));
        }
        let ip = state
            .hosts
            .get(host)
            .copied()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(SocketAddr::new(ip, port))
    }

    fn is_up(&self) -> bool {
        self.state().up
    }
}
