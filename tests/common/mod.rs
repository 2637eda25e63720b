//! Common test utilities and scenarios

use iot_probe::config::{
    HttpMethod, HttpsOperation, HttpsSessionConfig, MqttSessionConfig, ProbeConfig, TlsMaterial,
};
use std::time::Duration;

/// Routes session logs to the test harness output; `RUST_LOG` narrows it
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("iot_probe=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Client identifier in the format the probe generates
pub const TEST_CLIENT_ID: &str = "0000A1B2-0000C3D4-0000E5F6";

pub fn test_tls() -> TlsMaterial {
    TlsMaterial::new(
        Some(b"ROOT".to_vec()),
        b"CERT".to_vec(),
        b"KEY".to_vec(),
    )
}

/// The built-in MQTT session with its four topic groups
pub fn default_mqtt_session() -> MqttSessionConfig {
    MqttSessionConfig::new(&ProbeConfig::default(), test_tls(), TEST_CLIENT_ID)
}

/// The built-in HTTPS session with a short exchange timeout
#[allow(dead_code)]
pub fn default_https_session() -> HttpsSessionConfig {
    let mut config = HttpsSessionConfig::new(&ProbeConfig::default(), test_tls());
    config.exchange_timeout = Duration::from_secs(5);
    config
}

/// A session with just the given operations
#[allow(dead_code)]
pub fn https_session_with(operations: Vec<HttpsOperation>) -> HttpsSessionConfig {
    let mut config = default_https_session();
    config.operations = operations;
    config
}

#[allow(dead_code)]
pub fn post(name: &str, path: &str, body: &str) -> HttpsOperation {
    HttpsOperation::new(name, HttpMethod::Post, path, body)
}

/// A `200 OK` response the way the broker's REST surface answers
#[allow(dead_code)]
pub fn ok_response(body: &str) -> Vec<u8> {
    response("200 OK", body)
}

#[allow(dead_code)]
pub fn response(status: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nx-amzn-requestid: 4a1b\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}
