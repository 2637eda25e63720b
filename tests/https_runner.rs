//! HTTPS runner over the mock HTTP server

mod common;

use common::{
    default_https_session, https_session_with, init_tracing, ok_response, post, response,
};
use iot_probe::config::HttpMethod;
use iot_probe::transport::{MockNetwork, MockTransport, TransportCall};
use iot_probe::{HttpsRunner, ProbeError, SessionState};

#[tokio::test]
async fn test_default_operations_in_order() {
    init_tracing();
    let network = MockNetwork::connected();
    let config = default_https_session();
    let count = config.operations.len();
    let transport = MockTransport::with_http_responses(
        (0..count).map(|i| ok_response(&format!(r#"{{"message":"OK","traceId":"t{i}"}}"#))),
    );

    let report = HttpsRunner::new(config, transport.clone(), &network).run().await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.exchanges.len(), 7);
    assert!(report.exchanges.iter().all(|e| e.status_ok));
    assert_eq!(report.exchanges[6].body, r#"{"message":"OK","traceId":"t6"}"#);

    let requests = transport.http_requests();
    assert_eq!(requests.len(), 7);
    assert!(requests[0].starts_with("POST /topics/Nuvoton/Mbed/D001?qos=1 HTTP/1.1\r\n"));
    assert!(requests[1].starts_with(
        "POST /topics/$aws/things/Nuvoton-Mbed-D001/shadow/update?qos=1 HTTP/1.1\r\n"
    ));
    assert!(requests[5].starts_with("GET /things/Nuvoton-Mbed-D001/shadow HTTP/1.1\r\n"));
    assert!(requests[6].starts_with("DELETE /things/Nuvoton-Mbed-D001/shadow HTTP/1.1\r\n"));
    for request in &requests {
        assert!(request.contains("\r\nHost: a1fljoeglhtf61-ats.iot.us-east-2.amazonaws.com\r\n"));
    }
    assert_eq!(report.exchanges[5].method, HttpMethod::Get);

    assert_eq!(
        report.states,
        vec![
            SessionState::Init,
            SessionState::TlsConfigured,
            SessionState::SocketOpened,
            SessionState::DnsResolved,
            SessionState::TransportConnected,
            SessionState::Closed,
        ]
    );
    assert_eq!(transport.close_count(), 1);
    assert_eq!(transport.release_count(), 1);
}

#[tokio::test]
async fn test_chunked_and_would_block_delivery() {
    init_tracing();
    let network = MockNetwork::connected();
    let body = r#"{"state":{"reported":{"attribute1":3,"attribute2":"1"}}}"#;
    let transport = MockTransport::with_http_responses([ok_response(body)]);
    transport.update_behavior(|b| {
        b.recv_chunk_size = 7;
        b.send_chunk_size = 16;
        b.would_block_recvs = 3;
        b.would_block_sends = 2;
    });

    let report = HttpsRunner::new(
        https_session_with(vec![post(
            "update",
            "/things/Nuvoton-Mbed-D001/shadow",
            body,
        )]),
        transport.clone(),
        &network,
    )
    .run()
    .await;

    assert!(report.is_success(), "{:?}", report.error);
    let exchange = &report.exchanges[0];
    assert_eq!(exchange.body, body);
    assert_eq!(exchange.content_length, Some(body.len()));
    assert_eq!(exchange.received, ok_response(body).len());
    assert!(transport.http_requests()[0].ends_with(body));
}

#[tokio::test]
async fn test_failed_status_is_reported_not_fatal() {
    let network = MockNetwork::connected();
    let transport = MockTransport::with_http_responses([
        response("403 Forbidden", r#"{"message":"Forbidden"}"#),
        ok_response("{}"),
    ]);

    let report = HttpsRunner::new(
        https_session_with(vec![
            post("denied", "/topics/a?qos=1", ""),
            post("allowed", "/topics/b?qos=1", ""),
        ]),
        transport,
        &network,
    )
    .run()
    .await;

    assert!(report.is_success());
    assert!(!report.exchanges[0].status_ok);
    assert!(report.exchanges[1].status_ok);
}

#[tokio::test]
async fn test_send_failure_aborts_remaining_operations() {
    let network = MockNetwork::connected();
    let transport = MockTransport::with_http_responses([ok_response("{}"), ok_response("{}")]);
    transport.update_behavior(|b| b.fail_send = true);

    let report = HttpsRunner::new(
        https_session_with(vec![
            post("first", "/topics/a?qos=1", ""),
            post("second", "/topics/b?qos=1", ""),
        ]),
        transport.clone(),
        &network,
    )
    .run()
    .await;

    assert!(matches!(report.error, Some(ProbeError::Http(_))));
    assert!(report.exchanges.is_empty());
    assert!(transport.http_requests().is_empty());
    assert_eq!(report.states.last(), Some(&SessionState::Closed));
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_unresolvable_endpoint_never_connects() {
    let network = MockNetwork::connected();
    network.fail_resolve(true);
    let transport = MockTransport::with_http_responses([ok_response("{}")]);

    let report = HttpsRunner::new(default_https_session(), transport.clone(), &network)
        .run()
        .await;

    assert!(matches!(report.error, Some(ProbeError::Dns(_))));
    assert!(report.states.contains(&SessionState::SocketOpened));
    assert!(!report.states.contains(&SessionState::DnsResolved));
    assert!(!transport
        .calls()
        .iter()
        .any(|c| matches!(c, TransportCall::Connect(_))));
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_bytes_past_content_length_are_not_body() {
    let network = MockNetwork::connected();
    let mut reply = b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\n{}".to_vec();
    let expected_len = reply.len();
    reply.extend_from_slice(b"TRAILING");
    let transport = MockTransport::with_http_responses([reply]);

    let report = HttpsRunner::new(
        https_session_with(vec![post("get", "/things/Nuvoton-Mbed-D001/shadow", "")]),
        transport,
        &network,
    )
    .run()
    .await;

    assert!(report.is_success(), "{:?}", report.error);
    let exchange = &report.exchanges[0];
    assert_eq!(exchange.content_length, Some(2));
    assert_eq!(exchange.body, "{}");
    assert_eq!(exchange.received, expected_len);
}
