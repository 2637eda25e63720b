//! MQTT session orchestration
//!
//! [`MqttOrchestrator`] drives one complete device-to-broker session:
//!
//! ```text
//! INIT → TLS_CONFIGURED → SOCKET_OPENED → DNS_RESOLVED → TRANSPORT_CONNECTED
//!      → PROTOCOL_CONNECTED → GROUP_EXCHANGE[1..n] → PROTOCOL_DISCONNECTED → CLOSED
//! ```
//!
//! The first failing step skips everything up to teardown. Teardown always
//! runs: the protocol session is disconnected if it was established and the
//! transport is closed. Dropping the orchestrator releases the transport once
//! more, which is harmless after a close.

pub mod establish;
mod exchange;

pub use self::exchange::{EchoOutcome, GroupReport};

use self::exchange::GroupExchange;
use crate::client::ProtocolClient;
use crate::config::MqttSessionConfig;
use crate::correlator::ArrivalCounter;
use crate::device::{DisplayZone, EnvironmentalSensor, Indicator, SensorReading, StatusDisplay};
use crate::error::{ProbeError, Result};
use crate::payload::PayloadValues;
use crate::scratch::ScratchBuffer;
use crate::transport::{NetworkInterface, SecureTransport};
use std::fmt;
use tracing::{debug, error, info, warn};

/// States of a session run, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    TlsConfigured,
    SocketOpened,
    DnsResolved,
    TransportConnected,
    ProtocolConnected,
    /// Zero-based index of the topic group being exchanged
    GroupExchange(usize),
    ProtocolDisconnected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Init => f.write_str("INIT"),
            SessionState::TlsConfigured => f.write_str("TLS_CONFIGURED"),
            SessionState::SocketOpened => f.write_str("SOCKET_OPENED"),
            SessionState::DnsResolved => f.write_str("DNS_RESOLVED"),
            SessionState::TransportConnected => f.write_str("TRANSPORT_CONNECTED"),
            SessionState::ProtocolConnected => f.write_str("PROTOCOL_CONNECTED"),
            SessionState::GroupExchange(index) => write!(f, "GROUP_EXCHANGE[{}]", index + 1),
            SessionState::ProtocolDisconnected => f.write_str("PROTOCOL_DISCONNECTED"),
            SessionState::Closed => f.write_str("CLOSED"),
        }
    }
}

/// What a finished session run went through
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub states: Vec<SessionState>,
    pub groups: Vec<GroupReport>,
    /// The failure that aborted the run, if any
    pub error: Option<ProbeError>,
}

impl SessionReport {
    /// True when every step up to teardown succeeded
    ///
    /// Echo timeouts do not count as failures.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn reached(&self, state: SessionState) -> bool {
        self.states.contains(&state)
    }

    #[must_use]
    pub fn final_state(&self) -> Option<SessionState> {
        self.states.last().copied()
    }
}

/// Runs one MQTT session over an owned transport
///
/// # Examples
///
/// ```
/// use iot_probe::config::{MqttSessionConfig, ProbeConfig, TlsMaterial};
/// use iot_probe::transport::{MockNetwork, MockTransport};
/// use iot_probe::{MockProtocolClient, MqttOrchestrator, SessionState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let network = MockNetwork::connected();
/// let mut config = MqttSessionConfig::new(
///     &ProbeConfig::default(),
///     TlsMaterial::new(None, b"cert".to_vec(), b"key".to_vec()),
///     "0000A1B2-0000C3D4-0000E5F6",
/// );
/// // only the user topic group, whose filter matches its own topic
/// config.groups.truncate(1);
/// let report = MqttOrchestrator::new(
///     config,
///     MockTransport::new(),
///     MockProtocolClient::echoing(),
///     &network,
/// )
/// .run()
/// .await;
///
/// assert!(report.is_success());
/// assert_eq!(report.final_state(), Some(SessionState::Closed));
/// # }
/// ```
pub struct MqttOrchestrator<'n, T, C, N>
where
    T: SecureTransport,
    C: ProtocolClient<T>,
    N: NetworkInterface,
{
    config: MqttSessionConfig,
    transport: T,
    client: C,
    network: &'n N,
    counter: ArrivalCounter,
    sensor: Option<Box<dyn EnvironmentalSensor>>,
    display: Option<Box<dyn StatusDisplay>>,
    states: Vec<SessionState>,
}

impl<'n, T, C, N> MqttOrchestrator<'n, T, C, N>
where
    T: SecureTransport,
    C: ProtocolClient<T>,
    N: NetworkInterface,
{
    pub fn new(config: MqttSessionConfig, transport: T, client: C, network: &'n N) -> Self {
        Self {
            config,
            transport,
            client,
            network,
            counter: ArrivalCounter::new(),
            sensor: None,
            display: None,
            states: Vec::new(),
        }
    }

    /// Takes a reading before each group so payloads can embed it
    #[must_use]
    pub fn with_sensor(mut self, sensor: Box<dyn EnvironmentalSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Mirrors progress on a status panel
    #[must_use]
    pub fn with_display(mut self, display: Box<dyn StatusDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    /// The arrival counter shared with every subscription callback
    #[must_use]
    pub fn counter(&self) -> &ArrivalCounter {
        &self.counter
    }

    /// Runs the session once, always ending with teardown
    pub async fn run(mut self) -> SessionReport {
        info!(endpoint = %self.config.endpoint, groups = self.config.groups.len(), "Starting MQTT session");
        let mut groups = Vec::new();
        let result = self.drive(&mut groups).await;
        if let Err(e) = &result {
            error!(error = %e, category = ?e.category(), "MQTT session aborted");
            if let Some(display) = self.display.as_mut() {
                display.set_symbol(Indicator::Error, true);
                display.set_blink(true);
            }
        }
        self.teardown().await;
        SessionReport {
            states: std::mem::take(&mut self.states),
            groups,
            error: result.err(),
        }
    }

    async fn drive(&mut self, groups: &mut Vec<GroupReport>) -> Result<()> {
        if let Some(display) = self.display.as_mut() {
            display.init();
            display.print_text(DisplayZone::Version, env!("CARGO_PKG_VERSION"));
        }
        record(&mut self.states, &mut self.display, SessionState::Init);

        let mut scratch = ScratchBuffer::new(self.config.scratch_capacity)?;
        self.start_sensor();

        let states = &mut self.states;
        let display = &mut self.display;
        establish::establish(
            &mut self.transport,
            self.network,
            &self.config.endpoint,
            &self.config.tls,
            &mut |state| record(states, display, state),
        )
        .await?;

        info!(client_id = %self.config.connect.client_id, "Resolved MQTT client ID");
        info!("MQTT connecting");
        self.client
            .connect(&mut self.transport, &self.config.connect)
            .await
            .inspect_err(|e| error!(error = %e, "MQTT connects failed"))?;
        info!("MQTT connects OK");
        record(&mut self.states, &mut self.display, SessionState::ProtocolConnected);

        for (index, group) in self.config.groups.iter().enumerate() {
            record(&mut self.states, &mut self.display, SessionState::GroupExchange(index));
            let reading = self.sensor.as_deref_mut().and_then(SensorReading::take);
            if let (Some(reading), Some(display)) = (reading, self.display.as_mut()) {
                display.print_text(DisplayZone::Temperature, &format!("{:.1}", reading.temperature));
                display.print_text(DisplayZone::Humidity, &format!("{:.1}", reading.humidity));
            }
            let values = PayloadValues {
                thing_name: &self.config.thing_name,
                reading,
            };
            let mut exchange = GroupExchange {
                transport: &mut self.transport,
                client: &mut self.client,
                counter: &self.counter,
                scratch: &mut scratch,
                wait: self.config.wait,
            };
            let report = exchange.run(group, &values).await;
            let failure = report.error.clone();
            groups.push(report);
            if let Some(e) = failure {
                return Err(e);
            }
        }
        Ok(())
    }

    fn start_sensor(&mut self) {
        let Some(sensor) = self.sensor.as_mut() else {
            return;
        };
        if !sensor.begin() {
            warn!("Environmental sensor not found, payloads carry no readings");
            self.sensor = None;
        }
    }

    async fn teardown(&mut self) {
        if self.client.is_connected() {
            info!("MQTT disconnecting");
            match self.client.disconnect(&mut self.transport).await {
                Ok(()) => info!("MQTT disconnects OK"),
                Err(e) => warn!(error = %e, "MQTT disconnects failed"),
            }
            record(&mut self.states, &mut self.display, SessionState::ProtocolDisconnected);
        }
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Closing socket failed");
        }
        record(&mut self.states, &mut self.display, SessionState::Closed);
    }
}

impl<T, C, N> Drop for MqttOrchestrator<'_, T, C, N>
where
    T: SecureTransport,
    C: ProtocolClient<T>,
    N: NetworkInterface,
{
    fn drop(&mut self) {
        self.transport.release();
    }
}

fn record(
    states: &mut Vec<SessionState>,
    display: &mut Option<Box<dyn StatusDisplay>>,
    state: SessionState,
) {
    debug!(%state, "session state");
    states.push(state);
    let Some(display) = display.as_mut() else {
        return;
    };
    display.print_text(DisplayZone::Main, &state.to_string());
    match state {
        SessionState::TransportConnected => display.set_symbol(Indicator::Network, true),
        SessionState::ProtocolConnected => display.set_symbol(Indicator::Broker, true),
        SessionState::GroupExchange(_) => display.set_symbol(Indicator::Exchange, true),
        SessionState::ProtocolDisconnected => {
            display.set_symbol(Indicator::Exchange, false);
            display.set_symbol(Indicator::Broker, false);
        }
        SessionState::Closed => display.set_symbol(Indicator::Network, false),
        _ => {}
    }
}
