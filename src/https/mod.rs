//! HTTPS request/response runner
//!
//! The alternate session mode: the same device identity drives the broker's
//! REST surface over one mutual-TLS connection. After the shared bring-up
//! the socket is switched to non-blocking mode and every configured
//! operation performs one request/response round-trip through the scratch
//! buffer. The first failed round-trip aborts the remaining operations.

pub mod request;
pub mod response;

pub use self::request::encode_request;
pub use self::response::ResponseScanner;

use crate::config::{HttpMethod, HttpsOperation, HttpsSessionConfig};
use crate::constants::time::NON_BLOCKING_POLL;
use crate::error::{ProbeError, Result};
use crate::orchestrator::establish::establish;
use crate::orchestrator::SessionState;
use crate::scratch::{ScratchBuffer, ScratchLease};
use crate::transport::{NetworkInterface, SecureTransport};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Outcome of one request/response round-trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    /// Request bytes written
    pub sent: usize,
    /// Response bytes read
    pub received: usize,
    /// Whether the status line carried `200 OK`; observed, never enforced
    pub status_ok: bool,
    pub content_length: Option<usize>,
    pub body: String,
}

/// What a finished HTTPS run went through
#[derive(Debug, Clone)]
pub struct HttpsRunReport {
    pub states: Vec<SessionState>,
    pub exchanges: Vec<ExchangeReport>,
    pub error: Option<ProbeError>,
}

impl HttpsRunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the configured HTTPS operations over an owned transport
pub struct HttpsRunner<'n, T, N>
where
    T: SecureTransport,
    N: NetworkInterface,
{
    config: HttpsSessionConfig,
    transport: T,
    network: &'n N,
    states: Vec<SessionState>,
}

impl<'n, T, N> HttpsRunner<'n, T, N>
where
    T: SecureTransport,
    N: NetworkInterface,
{
    pub fn new(config: HttpsSessionConfig, transport: T, network: &'n N) -> Self {
        Self {
            config,
            transport,
            network,
            states: Vec::new(),
        }
    }

    /// Runs every operation once, always closing the transport afterwards
    pub async fn run(mut self) -> HttpsRunReport {
        info!(
            endpoint = %self.config.endpoint,
            operations = self.config.operations.len(),
            "Starting HTTPS session"
        );
        let mut exchanges = Vec::new();
        let result = self.drive(&mut exchanges).await;
        if let Err(e) = &result {
            error!(error = %e, category = ?e.category(), "HTTPS session aborted");
        }
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Closing socket failed");
        }
        self.states.push(SessionState::Closed);
        HttpsRunReport {
            states: std::mem::take(&mut self.states),
            exchanges,
            error: result.err(),
        }
    }

    async fn drive(&mut self, exchanges: &mut Vec<ExchangeReport>) -> Result<()> {
        self.states.push(SessionState::Init);
        let mut scratch = ScratchBuffer::new(self.config.scratch_capacity)?;

        let states = &mut self.states;
        establish(
            &mut self.transport,
            self.network,
            &self.config.endpoint,
            &self.config.tls,
            &mut |state| states.push(state),
        )
        .await?;
        // Switching before connect is not supported by every socket.
        self.transport.set_blocking(false);

        for operation in &self.config.operations {
            info!(operation = %operation.name, method = %operation.method, "Running HTTPS request");
            let report = timeout(
                self.config.exchange_timeout,
                run_exchange(
                    &mut self.transport,
                    &mut scratch,
                    &self.config.endpoint.domain,
                    operation,
                ),
            )
            .await
            .unwrap_or(Err(ProbeError::Timeout))
            .inspect_err(|e| error!(operation = %operation.name, error = %e, "HTTPS request failed"))?;
            info!(operation = %operation.name, "HTTPS request OK");
            exchanges.push(report);
        }
        Ok(())
    }
}

impl<T, N> Drop for HttpsRunner<'_, T, N>
where
    T: SecureTransport,
    N: NetworkInterface,
{
    fn drop(&mut self) {
        self.transport.release();
    }
}

/// One request/response round-trip through the scratch buffer
async fn run_exchange<T: SecureTransport>(
    transport: &mut T,
    scratch: &mut ScratchBuffer,
    host: &str,
    operation: &HttpsOperation,
) -> Result<ExchangeReport> {
    let mut lease = scratch.lease();
    encode_request(
        &mut lease,
        operation.method,
        &operation.path,
        host,
        &operation.body,
    )?;
    info!(request = %String::from_utf8_lossy(lease.as_bytes()), "HTTPS: Request message");
    let sent = send_all(transport, lease.as_bytes()).await?;

    lease.clear();
    let scanner = receive(transport, &mut lease).await?;
    let received = scanner
        .expected_end()
        .map_or(lease.len(), |end| end.min(lease.len()));
    let response = &lease.as_bytes()[..received];
    let body = scanner
        .body_start()
        .and_then(|start| response.get(start..))
        .unwrap_or_default();

    let status = if scanner.status_ok() { "[OK]" } else { "[FAIL]" };
    info!(received, "HTTPS: Received chars from server");
    info!(status, "HTTPS: Received 200 OK status ...");
    info!(response = %String::from_utf8_lossy(response), "HTTPS: Received message");

    Ok(ExchangeReport {
        name: operation.name.clone(),
        method: operation.method,
        path: operation.path.clone(),
        sent,
        received,
        status_ok: scanner.status_ok(),
        content_length: scanner.content_length(),
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

/// Writes all of `data`, retrying while the socket would block
async fn send_all<T: SecureTransport>(transport: &mut T, data: &[u8]) -> Result<usize> {
    let mut offset = 0;
    while offset < data.len() {
        match transport.send(&data[offset..]).await {
            Ok(0) => {
                return Err(ProbeError::Http(
                    "Connection closed while sending request".to_string(),
                ));
            }
            Ok(n) => offset += n,
            Err(e) if e.is_would_block() => tokio::time::sleep(NON_BLOCKING_POLL).await,
            Err(e) => return Err(ProbeError::Http(format!("send failed: {e}"))),
        }
    }
    Ok(offset)
}

/// Reads until the scanned response is complete or the peer closes
async fn receive<T: SecureTransport>(
    transport: &mut T,
    lease: &mut ScratchLease<'_>,
) -> Result<ResponseScanner> {
    let mut scanner = ResponseScanner::new();
    while !scanner.is_complete(lease.len()) {
        let wanted = scanner
            .expected_end()
            .map_or(usize::MAX, |end| end - lease.len());
        let spare = lease.spare_mut();
        if spare.is_empty() {
            return Err(ProbeError::BufferOverflow {
                needed: scanner.expected_end().unwrap_or(lease.len() + 1),
                capacity: lease.usable(),
            });
        }
        let limit = spare.len().min(wanted);
        match transport.recv(&mut spare[..limit]).await {
            Ok(0) => {
                debug!(received = lease.len(), "peer closed the response stream");
                break;
            }
            Ok(n) => {
                lease.advance(n)?;
                scanner.scan(lease.as_bytes());
            }
            Err(e) if e.is_would_block() => tokio::time::sleep(NON_BLOCKING_POLL).await,
            Err(e) => return Err(ProbeError::Http(format!("recv failed: {e}"))),
        }
    }
    Ok(scanner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbeConfig, TlsMaterial};
    use crate::transport::{MockNetwork, MockTransport, TransportCall};
    use std::time::Duration;

    const OK_RESPONSE: &str =
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 16\r\n\r\n{\"message\":\"OK\"}";

    fn config(operations: usize) -> HttpsSessionConfig {
        let mut config = HttpsSessionConfig::new(
            &ProbeConfig::default(),
            TlsMaterial::new(None, b"cert".to_vec(), b"key".to_vec()),
        );
        config.operations.truncate(operations);
        config
    }

    #[tokio::test]
    async fn test_blocking_switched_off_after_connect() {
        let network = MockNetwork::connected();
        let transport = MockTransport::with_http_responses([OK_RESPONSE]);

        let report = HttpsRunner::new(config(1), transport.clone(), &network)
            .run()
            .await;

        assert!(report.is_success());
        let calls = transport.calls();
        let connect_at = calls
            .iter()
            .position(|c| matches!(c, TransportCall::Connect(_)))
            .unwrap();
        let non_blocking_at = calls
            .iter()
            .position(|c| *c == TransportCall::SetBlocking(false))
            .unwrap();
        assert!(connect_at < non_blocking_at);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_exchange_reports_response() {
        let network = MockNetwork::connected();
        let transport = MockTransport::with_http_responses([OK_RESPONSE]);
        transport.update_behavior(|b| {
            b.recv_chunk_size = 7;
            b.would_block_recvs = 3;
            b.would_block_sends = 2;
        });

        let report = HttpsRunner::new(config(1), transport.clone(), &network)
            .run()
            .await;

        assert!(report.is_success());
        let exchange = &report.exchanges[0];
        assert!(exchange.status_ok);
        assert_eq!(exchange.content_length, Some(16));
        assert_eq!(exchange.received, OK_RESPONSE.len());
        assert_eq!(exchange.body, r#"{"message":"OK"}"#);
        assert!(transport.http_requests()[0].starts_with("POST /topics/Nuvoton/Mbed/D001?qos=1 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_non_ok_status_is_not_a_failure() {
        let network = MockNetwork::connected();
        let transport = MockTransport::with_http_responses([
            "HTTP/1.1 404 Not Found\r\ncontent-length: 2\r\n\r\n{}",
        ]);

        let report = HttpsRunner::new(config(1), transport, &network).run().await;

        assert!(report.is_success());
        assert!(!report.exchanges[0].status_ok);
    }

    #[tokio::test]
    async fn test_peer_close_ends_exchange() {
        let network = MockNetwork::connected();
        let transport = MockTransport::with_http_responses([OK_RESPONSE]);

        let report = HttpsRunner::new(config(3), transport.clone(), &network)
            .run()
            .await;

        // the second request meets a closed stream and reads nothing
        assert_eq!(report.exchanges.len(), 3);
        assert_eq!(report.exchanges[1].received, 0);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_send_failure_aborts_remaining_operations() {
        let network = MockNetwork::connected();
        let transport = MockTransport::with_http_responses([OK_RESPONSE, OK_RESPONSE]);
        transport.update_behavior(|b| b.fail_send = true);

        let report = HttpsRunner::new(config(3), transport.clone(), &network)
            .run()
            .await;

        assert!(matches!(report.error, Some(ProbeError::Http(_))));
        assert!(report.exchanges.is_empty());
        assert_eq!(report.states.last(), Some(&SessionState::Closed));
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_response_overflows() {
        let network = MockNetwork::connected();
        let body = "x".repeat(700);
        let response = format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{body}", body.len());
        let transport = MockTransport::with_http_responses([response]);

        let report = HttpsRunner::new(config(1), transport, &network).run().await;

        assert!(matches!(
            report.error,
            Some(ProbeError::BufferOverflow { capacity: 599, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        let network = MockNetwork::connected();
        let transport = MockTransport::with_http_responses([OK_RESPONSE]);
        let mut config = config(1);
        config.exchange_timeout = Duration::from_secs(1);
        transport.update_behavior(|b| b.would_block_recvs = u32::MAX);

        let report = HttpsRunner::new(config, transport, &network).run().await;

        assert!(matches!(report.error, Some(ProbeError::Timeout)));
        assert!(report.exchanges.is_empty());
    }
}
