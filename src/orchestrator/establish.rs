//! Transport bring-up shared by both session modes

use crate::config::{Endpoint, TlsMaterial};
use crate::error::Result;
use crate::orchestrator::SessionState;
use crate::transport::{NetworkInterface, SecureTransport};
use std::net::SocketAddr;
use tracing::{error, info};

/// Configures TLS, opens the socket, resolves the endpoint and connects
///
/// `on_state` is told about every state reached, in order. The first failing
/// step ends the sequence; the caller owns closing the transport.
///
/// # Errors
///
/// Returns the error of the first failing step
pub async fn establish<T, N>(
    transport: &mut T,
    network: &N,
    endpoint: &Endpoint,
    tls: &TlsMaterial,
    on_state: &mut (dyn FnMut(SessionState) + Send),
) -> Result<SocketAddr>
where
    T: SecureTransport,
    N: NetworkInterface,
{
    configure_tls(transport, endpoint, tls)?;
    on_state(SessionState::TlsConfigured);

    info!("Opening network socket on network stack");
    transport
        .open(network)
        .inspect_err(|e| error!(error = %e, "Opening network socket failed"))?;
    info!("Opens network socket on network stack OK");
    on_state(SessionState::SocketOpened);

    info!(domain = %endpoint.domain, "DNS resolution...");
    let addr = network
        .resolve(&endpoint.domain, endpoint.port)
        .await
        .inspect_err(|e| error!(domain = %endpoint.domain, error = %e, "DNS resolution failed"))?;
    info!(domain = %endpoint.domain, %addr, "DNS resolution OK");
    on_state(SessionState::DnsResolved);

    info!(%endpoint, "Connecting");
    transport
        .connect(addr)
        .await
        .inspect_err(|e| error!(%endpoint, error = %e, "Connection failed"))?;
    info!(%endpoint, "Connects OK");
    on_state(SessionState::TransportConnected);

    Ok(addr)
}

fn configure_tls<T: SecureTransport>(
    transport: &mut T,
    endpoint: &Endpoint,
    tls: &TlsMaterial,
) -> Result<()> {
    transport.set_hostname(&endpoint.domain);
    if let Some(root_ca) = &tls.root_ca {
        transport
            .set_root_ca_cert(root_ca)
            .inspect_err(|e| error!(error = %e, "Installing root CA certificate failed"))?;
    }
    transport
        .set_client_cert_key(&tls.client_cert, &tls.client_key)
        .inspect_err(|e| error!(error = %e, "Installing client certificate/key failed"))?;
    Ok(())
}
