//! The real MQTT session driven by the orchestrator against the mock broker

mod common;

use common::{default_mqtt_session, init_tracing, TEST_CLIENT_ID};
use iot_probe::client::MqttSession;
use iot_probe::packet::connack::ConnectReturnCode;
use iot_probe::transport::{MockNetwork, MockTransport};
use iot_probe::{EchoOutcome, MqttOrchestrator, Packet, ProbeError, QoS, SessionState};

const SHADOW: &str = "$aws/things/Nuvoton-Mbed-D001/shadow";

/// Answers shadow requests on their `accepted` topic the way the broker does
fn shadow_broker() -> MockTransport {
    let transport = MockTransport::with_broker();
    for action in ["update", "get", "delete"] {
        transport.add_reply_route(
            format!("{SHADOW}/{action}"),
            format!("{SHADOW}/{action}/accepted"),
        );
    }
    transport
}

#[tokio::test(start_paused = true)]
async fn test_full_session_against_broker() {
    init_tracing();
    let network = MockNetwork::connected();
    let transport = shadow_broker();

    let report = MqttOrchestrator::new(
        default_mqtt_session(),
        transport.clone(),
        MqttSession::new(),
        &network,
    )
    .run()
    .await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(
        report.states,
        vec![
            SessionState::Init,
            SessionState::TlsConfigured,
            SessionState::SocketOpened,
            SessionState::DnsResolved,
            SessionState::TransportConnected,
            SessionState::ProtocolConnected,
            SessionState::GroupExchange(0),
            SessionState::GroupExchange(1),
            SessionState::GroupExchange(2),
            SessionState::GroupExchange(3),
            SessionState::ProtocolDisconnected,
            SessionState::Closed,
        ]
    );
    assert_eq!(report.groups.len(), 4);
    for group in &report.groups {
        assert_eq!(group.echo, Some(EchoOutcome::Received(1)), "{}", group.name);
        assert!(group.failed_subscriptions.is_empty());
        assert!(group.failed_unsubscriptions.is_empty());
    }

    let packets = transport.received_packets();
    let Packet::Connect(connect) = &packets[0] else {
        panic!("Expected CONNECT first, got {:?}", packets[0]);
    };
    assert_eq!(connect.client_id, TEST_CLIENT_ID);
    assert_eq!(connect.protocol_level, 4);
    assert!(connect.clean_session);
    assert!(matches!(packets.last(), Some(Packet::Disconnect)));

    let subscribed: Vec<&(String, QoS)> = packets
        .iter()
        .filter_map(|p| match p {
            Packet::Subscribe(s) => Some(&s.filters),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(subscribed.len(), 7);
    assert!(subscribed.iter().all(|(_, qos)| *qos == QoS::AtLeastOnce));

    let unsubscribed = packets
        .iter()
        .filter(|p| matches!(p, Packet::Unsubscribe(_)))
        .count();
    assert_eq!(unsubscribed, 7);

    assert_eq!(transport.close_count(), 1);
    assert_eq!(transport.release_count(), 1);
    assert!(!transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_publishes_carry_payloads_at_least_once() {
    let network = MockNetwork::connected();
    let transport = shadow_broker();

    let report = MqttOrchestrator::new(
        default_mqtt_session(),
        transport.clone(),
        MqttSession::new(),
        &network,
    )
    .run()
    .await;
    assert!(report.is_success());

    let publishes: Vec<_> = transport
        .received_packets()
        .into_iter()
        .filter_map(|p| match p {
            Packet::Publish(publish) => Some(publish),
            _ => None,
        })
        .collect();
    assert_eq!(publishes.len(), 4);
    assert_eq!(publishes[0].topic_name, "Nuvoton/Mbed/D001");
    assert_eq!(
        publishes[0].payload,
        br#"{ "message": "Hello from Nuvoton Mbed device" }"#
    );
    assert_eq!(publishes[1].topic_name, format!("{SHADOW}/update"));
    assert!(publishes[2].payload.is_empty());
    for publish in &publishes {
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert!(!publish.retain);
        assert!(!publish.dup);
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_echo_is_not_a_failure() {
    let network = MockNetwork::connected();
    // plain echo broker: shadow topics are never answered on accepted/rejected
    let transport = MockTransport::with_broker();

    let report = MqttOrchestrator::new(
        default_mqtt_session(),
        transport.clone(),
        MqttSession::new(),
        &network,
    )
    .run()
    .await;

    assert!(report.is_success());
    assert_eq!(report.groups[0].echo, Some(EchoOutcome::Received(1)));
    for group in &report.groups[1..] {
        assert_eq!(group.echo, Some(EchoOutcome::TimedOut), "{}", group.name);
        assert!(group.slices > 1);
    }
    assert_eq!(report.final_state(), Some(SessionState::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_refused_filter_does_not_stop_group() {
    let network = MockNetwork::connected();
    let transport = shadow_broker();
    let refused = format!("{SHADOW}/update/rejected");
    transport.refuse_subscription(refused.clone());

    let report = MqttOrchestrator::new(
        default_mqtt_session(),
        transport.clone(),
        MqttSession::new(),
        &network,
    )
    .run()
    .await;

    assert!(report.is_success());
    let update = &report.groups[1];
    assert_eq!(update.failed_subscriptions, vec![refused]);
    assert_eq!(update.subscribed, vec![format!("{SHADOW}/update/accepted")]);
    assert_eq!(update.echo, Some(EchoOutcome::Received(1)));
    assert_eq!(report.groups.len(), 4);
}

#[tokio::test]
async fn test_refused_connect_closes_without_disconnect() {
    init_tracing();
    let network = MockNetwork::connected();
    let transport = MockTransport::with_broker();
    transport.refuse_connect(ConnectReturnCode::NotAuthorized);

    let report = MqttOrchestrator::new(
        default_mqtt_session(),
        transport.clone(),
        MqttSession::new(),
        &network,
    )
    .run()
    .await;

    assert!(matches!(
        report.error,
        Some(ProbeError::ConnectionRefused(ConnectReturnCode::NotAuthorized))
    ));
    assert!(report.reached(SessionState::TransportConnected));
    assert!(!report.reached(SessionState::ProtocolConnected));
    assert!(!report.reached(SessionState::ProtocolDisconnected));
    assert_eq!(report.final_state(), Some(SessionState::Closed));
    assert!(report.groups.is_empty());
    assert!(!transport
        .received_packets()
        .iter()
        .any(|p| matches!(p, Packet::Disconnect)));
    assert_eq!(transport.close_count(), 1);
}
