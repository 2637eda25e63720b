use crate::error::{ProbeError, Result};
use crate::transport::NetworkInterface;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

/// Well-known resolvers used only to ask the OS which local address routes
/// outward, IPv4 first; no datagram is ever sent to them.
const ROUTE_TARGETS: [(&str, &str); 2] = [
    ("0.0.0.0:0", "8.8.8.8:53"),
    ("[::]:0", "[2001:4860:4860::8888]:53"),
];

/// The host operating system's network stack
#[derive(Debug, Default)]
pub struct HostNetwork {
    up: AtomicBool,
}

impl HostNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetworkInterface for HostNetwork {
    async fn connect(&self) -> Result<()> {
        // The host stack is already up; make sure a route out exists.
        self.ip_address().await?;
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn ip_address(&self) -> Result<IpAddr> {
        first_routed_address(&ROUTE_TARGETS).await
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| {
                debug!(host, error = %e, "lookup failed");
                ProbeError::Dns(host.to_string())
            })?
            .collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ProbeError::Dns(host.to_string()))
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// Local address of the first `(bind, target)` pair the OS can route
async fn first_routed_address(targets: &[(&str, &str)]) -> Result<IpAddr> {
    let mut last_error = None;
    for (bind, target) in targets {
        match routed_address(bind, target).await {
            Ok(ip) => return Ok(ip),
            Err(e) => {
                debug!(route = %target, error = %e, "no route");
                last_error = Some(e);
            }
        }
    }
    Err(ProbeError::Connectivity(match last_error {
        Some(e) => format!("No route to the network: {e}"),
        None => "No route to the network".to_string(),
    }))
}

async fn routed_address(bind: &str, target: &str) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(target).await?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let network = HostNetwork::new();
        let addr = network.resolve("127.0.0.1", 8883).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8883".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_localhost_keeps_port() {
        let network = HostNetwork::new();
        let addr = network.resolve("localhost", 8443).await.unwrap();
        assert_eq!(addr.port(), 8443);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_route_falls_back_to_next_family() {
        let targets = [("127.0.0.1:0", "[::1]:9"), ("127.0.0.1:0", "127.0.0.1:9")];
        let ip = first_routed_address(&targets).await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_no_route_is_connectivity_error() {
        let err = first_routed_address(&[("127.0.0.1:0", "[::1]:9")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_disconnect_marks_down() {
        let network = HostNetwork::new();
        assert!(!network.is_up());
        network.disconnect().await.unwrap();
        assert!(!network.is_up());
    }
}
