use anyhow::{Context, Result};
use iot_probe::config::ProbeConfig;
use iot_probe::https::HttpsRunner;
use iot_probe::transport::{HostNetwork, TlsSocket};
use tracing::{error, info};

/// Runs every configured HTTPS operation; `Ok(false)` means the run failed
pub async fn execute(config: &ProbeConfig, network: &HostNetwork) -> Result<bool> {
    let session = config
        .https_session()
        .context("Failed to prepare HTTPS session")?;

    let report = HttpsRunner::new(session, TlsSocket::new(), network)
        .run()
        .await;

    for exchange in &report.exchanges {
        info!(
            operation = %exchange.name,
            status_ok = exchange.status_ok,
            sent = exchange.sent,
            received = exchange.received,
            body = %exchange.body,
            "Exchange finished"
        );
    }
    match &report.error {
        None => info!("HTTPS DONE"),
        Some(e) => error!(
            error = %e,
            completed = report.exchanges.len(),
            "HTTPS session failed"
        ),
    }
    Ok(report.is_success())
}
