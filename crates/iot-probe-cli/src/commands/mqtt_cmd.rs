use anyhow::{Context, Result};
use iot_probe::client::MqttSession;
use iot_probe::config::ProbeConfig;
use iot_probe::device::{LogDisplay, SimulatedSensor};
use iot_probe::orchestrator::{EchoOutcome, SessionReport};
use iot_probe::transport::{HostNetwork, TlsSocket};
use iot_probe::MqttOrchestrator;
use tracing::{error, info, warn};

/// Optional device collaborators
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttOptions {
    pub sensor: bool,
    pub display: bool,
}

/// Runs the MQTT session; `Ok(false)` means the session itself failed
pub async fn execute(
    config: &ProbeConfig,
    network: &HostNetwork,
    options: MqttOptions,
) -> Result<bool> {
    let session = config
        .mqtt_session()
        .context("Failed to prepare MQTT session")?;
    info!(
        endpoint = %session.endpoint,
        client_id = %session.connect.client_id,
        groups = session.groups.len(),
        "MQTT session prepared"
    );

    let mut orchestrator = MqttOrchestrator::new(
        session,
        TlsSocket::new(),
        MqttSession::new(),
        network,
    );
    if options.sensor {
        orchestrator = orchestrator.with_sensor(Box::new(SimulatedSensor::new()));
    }
    if options.display {
        orchestrator = orchestrator.with_display(Box::new(LogDisplay::new()));
    }

    let report = orchestrator.run().await;
    summarize(&report);
    Ok(report.is_success())
}

fn summarize(report: &SessionReport) {
    for group in &report.groups {
        match (&group.error, group.echo) {
            (Some(e), _) => error!(group = %group.name, error = %e, "Group failed"),
            (None, Some(EchoOutcome::Received(count))) => {
                info!(group = %group.name, count, slices = group.slices, "Echo received");
            }
            (None, _) => warn!(group = %group.name, "No echo within the wait window"),
        }
    }
    match &report.error {
        None => info!("MQTT DONE"),
        Some(e) => error!(
            error = %e,
            last_state = ?report.final_state(),
            "MQTT session failed"
        ),
    }
}
