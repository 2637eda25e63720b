pub mod https_cmd;
pub mod mqtt_cmd;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use dialoguer::Input;
use iot_probe::config::{CertificateBundle, CertificateSource, ProbeConfig};
use iot_probe::transport::{HostNetwork, NetworkInterface};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// MQTT session with one exchange per topic group
    Mqtt,
    /// HTTPS request/response operations
    Https,
    /// MQTT first, then HTTPS
    Both,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Configuration file (.toml as TOML, anything else as JSON)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Which session to run
    #[arg(long, short, value_enum, default_value = "mqtt")]
    pub mode: Mode,

    /// Broker endpoint domain (e.g., xxxxxxxx-ats.iot.us-east-2.amazonaws.com)
    #[arg(long, short = 'H')]
    pub endpoint: Option<String>,

    /// Thing name registered with the broker
    #[arg(long, short)]
    pub thing_name: Option<String>,

    /// Client ID (derived from the machine id when absent)
    #[arg(long)]
    pub client_id: Option<String>,

    /// TLS client certificate file (PEM format)
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// TLS client private key file (PEM format)
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// TLS CA certificate file (PEM format); bundled roots when absent
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Embed simulated sensor readings in MQTT payloads
    #[arg(long)]
    pub sensor: bool,

    /// Mirror session progress on the log-backed status display
    #[arg(long)]
    pub display: bool,

    /// Skip prompts and use defaults/fail if required args missing
    #[arg(long)]
    pub non_interactive: bool,
}

/// Builds the configuration: file, then environment, then flags
pub fn load_config(args: &ProbeArgs) -> Result<ProbeConfig> {
    let mut config = match &args.config {
        Some(path) => ProbeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProbeConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(endpoint) = &args.endpoint {
        config = config.with_endpoint_domain(endpoint.clone());
    }
    if let Some(thing_name) = &args.thing_name {
        config = config.with_thing_name(thing_name.clone());
    }
    if args.client_id.is_some() {
        config.client_id.clone_from(&args.client_id);
    }

    let file = |path: &PathBuf| CertificateSource::File(path.clone());
    let configured = std::mem::take(&mut config.certificates);
    let certificates = CertificateBundle {
        root_ca: args.ca_cert.as_ref().map(file).or(configured.root_ca),
        client_cert: args.cert.as_ref().map(file).or(configured.client_cert),
        client_key: args.key.as_ref().map(file).or(configured.client_key),
    };
    Ok(config.with_certificates(certificates))
}

/// Asks for the endpoint and thing name when nothing supplied them
fn prompt_missing(args: &ProbeArgs, mut config: ProbeConfig) -> Result<ProbeConfig> {
    if args.non_interactive || args.config.is_some() {
        return Ok(config);
    }
    if args.endpoint.is_none() && std::env::var(iot_probe::config::ENV_ENDPOINT).is_err() {
        let endpoint = Input::<String>::new()
            .with_prompt("Broker endpoint")
            .default(config.mqtt.endpoint.domain.clone())
            .interact_text()
            .context("Failed to get endpoint input")?;
        config = config.with_endpoint_domain(endpoint);
    }
    if args.thing_name.is_none() && std::env::var(iot_probe::config::ENV_THING_NAME).is_err() {
        let thing_name = Input::<String>::new()
            .with_prompt("Thing name")
            .default(config.thing_name.clone())
            .interact_text()
            .context("Failed to get thing name input")?;
        config = config.with_thing_name(thing_name);
    }
    Ok(config)
}

pub async fn execute(args: ProbeArgs) -> Result<()> {
    let config = prompt_missing(&args, load_config(&args)?)?;
    config.validate().context("Invalid configuration")?;

    let network = HostNetwork::new();
    info!("Connecting to the network...");
    network
        .connect()
        .await
        .context("Connecting to the network failed")?;
    match network.ip_address().await {
        Ok(ip) => info!(%ip, "Connected to the network successfully"),
        Err(e) => warn!(error = %e, "No IP address"),
    }

    let result = run_modes(&args, &config, &network).await;

    if let Err(e) = network.disconnect().await {
        error!(error = %e, "Disconnecting from the network failed");
    }
    result
}

async fn run_modes(args: &ProbeArgs, config: &ProbeConfig, network: &HostNetwork) -> Result<()> {
    let mut failed = Vec::new();
    if matches!(args.mode, Mode::Mqtt | Mode::Both) {
        let options = mqtt_cmd::MqttOptions {
            sensor: args.sensor,
            display: args.display,
        };
        if !mqtt_cmd::execute(config, network, options).await? {
            failed.push("MQTT");
        }
    }
    if matches!(args.mode, Mode::Https | Mode::Both) && !https_cmd::execute(config, network).await? {
        failed.push("HTTPS");
    }
    if !failed.is_empty() {
        anyhow::bail!("{} session failed", failed.join(" and "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        probe: ProbeArgs,
    }

    fn parse(args: &[&str]) -> ProbeArgs {
        TestCli::parse_from(std::iter::once("iot-probe").chain(args.iter().copied())).probe
    }

    #[test]
    fn test_default_mode_is_mqtt() {
        let args = parse(&[]);
        assert_eq!(args.mode, Mode::Mqtt);
        assert!(!args.non_interactive);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "thing_name = \"from-file\"\n[certificates.client_key]\npem = \"KEY\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = parse(&[
            "--config",
            &path,
            "--thing-name",
            "from-flag",
            "--endpoint",
            "broker.example.com",
            "--cert",
            "/tmp/device.pem",
            "--mode",
            "both",
        ]);
        let config = load_config(&args).unwrap();

        assert_eq!(args.mode, Mode::Both);
        assert_eq!(config.thing_name, "from-flag");
        assert_eq!(config.mqtt.endpoint.domain, "broker.example.com");
        assert_eq!(config.https.endpoint.domain, "broker.example.com");
        assert_eq!(
            config.certificates.client_cert,
            Some(CertificateSource::File(PathBuf::from("/tmp/device.pem")))
        );
        assert_eq!(
            config.certificates.client_key,
            Some(CertificateSource::Pem("KEY".to_string()))
        );
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let args = parse(&["--config", "/nonexistent/probe.toml"]);
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
