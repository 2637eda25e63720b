//! Probe configuration
//!
//! A [`ProbeConfig`] is read from a TOML or JSON file (chosen by extension),
//! adjusted by environment overrides and validated, then turned into one
//! session configuration per mode. Its defaults describe the standard
//! AWS IoT thing-shadow exchange for one device; only certificates have to
//! be supplied.
//!
//! Topic names, filters and HTTPS paths may contain `{thing_name}`, which is
//! replaced with the configured thing name when a session is built.

use crate::client_id::{resolve_client_id, MachineUid};
use crate::constants::endpoint::{
    DEFAULT_DOMAIN, DEFAULT_HTTPS_PORT, DEFAULT_MQTT_PORT, DEFAULT_THING_NAME,
};
use crate::constants::time::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_ECHO_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_SLICE};
use crate::constants::DEFAULT_SCRATCH_CAPACITY;
use crate::error::{ProbeError, Result};
use crate::payload::PayloadTemplate;
use crate::topic_matching::{validate_filter, validate_topic};
use crate::types::ConnectOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_ENDPOINT: &str = "IOT_PROBE_ENDPOINT";
pub const ENV_THING_NAME: &str = "IOT_PROBE_THING_NAME";
pub const ENV_CLIENT_ID: &str = "IOT_PROBE_CLIENT_ID";

const THING_NAME_PLACEHOLDER: &str = "{thing_name}";

/// Broker host and port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub domain: String,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(domain: impl Into<String>, port: u16) -> Self {
        Self {
            domain: domain.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.port)
    }
}

/// Where a PEM document comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSource {
    /// Inline PEM text
    Pem(String),
    /// Path to a PEM file
    File(PathBuf),
}

impl CertificateSource {
    /// Reads the PEM bytes
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if the file cannot be read
    pub fn load(&self) -> Result<Vec<u8>> {
        match self {
            CertificateSource::Pem(text) => Ok(text.as_bytes().to_vec()),
            CertificateSource::File(path) => std::fs::read(path).map_err(|e| {
                ProbeError::Config(format!("Cannot read {}: {e}", path.display()))
            }),
        }
    }
}

/// Certificates presented and trusted by the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateBundle {
    /// Trust anchor for the broker; the bundled Mozilla roots when absent
    pub root_ca: Option<CertificateSource>,
    pub client_cert: Option<CertificateSource>,
    pub client_key: Option<CertificateSource>,
}

impl CertificateBundle {
    /// Loads every configured document
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if the client certificate or key is
    /// missing or any document cannot be read
    pub fn load(&self) -> Result<TlsMaterial> {
        let required = |source: &Option<CertificateSource>, what: &str| {
            source
                .as_ref()
                .ok_or_else(|| ProbeError::Config(format!("No {what} configured")))?
                .load()
        };
        Ok(TlsMaterial {
            root_ca: self.root_ca.as_ref().map(CertificateSource::load).transpose()?,
            client_cert: required(&self.client_cert, "client certificate")?,
            client_key: required(&self.client_key, "client private key")?,
        })
    }
}

/// Loaded PEM documents for one session
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub root_ca: Option<Vec<u8>>,
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
}

impl TlsMaterial {
    #[must_use]
    pub fn new(root_ca: Option<Vec<u8>>, client_cert: Vec<u8>, client_key: Vec<u8>) -> Self {
        Self {
            root_ca,
            client_cert,
            client_key,
        }
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("root_ca", &self.root_ca.as_ref().map(Vec::len))
            .field("client_cert", &self.client_cert.len())
            .field("client_key", &"<redacted>")
            .finish()
    }
}

/// One publish topic with the filters that should see its echo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicGroup {
    pub name: String,
    pub topic: String,
    pub filters: Vec<String>,
    #[serde(default)]
    pub payload: PayloadTemplate,
}

impl TopicGroup {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        filters: impl IntoIterator<Item = impl Into<String>>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            filters: filters.into_iter().map(Into::into).collect(),
            payload: PayloadTemplate::new(payload),
        }
    }

    /// Checks the group invariants: valid topic, at least one valid filter
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` describing the first violation
    pub fn validate(&self) -> Result<()> {
        if self.filters.is_empty() {
            return Err(ProbeError::Config(format!(
                "Topic group {} has no subscribe filters",
                self.name
            )));
        }
        validate_topic(&self.topic)
            .map_err(|e| ProbeError::Config(format!("Topic group {}: {e}", self.name)))?;
        for filter in &self.filters {
            validate_filter(filter)
                .map_err(|e| ProbeError::Config(format!("Topic group {}: {e}", self.name)))?;
        }
        Ok(())
    }

    fn expanded(&self, thing_name: &str) -> Self {
        Self {
            name: self.name.clone(),
            topic: expand_thing(&self.topic, thing_name),
            filters: self
                .filters
                .iter()
                .map(|f| expand_thing(f, thing_name))
                .collect(),
            payload: self.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        })
    }
}

/// One request of the HTTPS run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpsOperation {
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub body: String,
}

impl HttpsOperation {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        method: HttpMethod,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Bounds of the wait for an echoed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub echo_timeout_ms: u64,
    pub slice_ms: u64,
}

impl WaitConfig {
    #[must_use]
    pub fn new(echo_timeout: Duration, slice: Duration) -> Self {
        Self {
            echo_timeout_ms: u64::try_from(echo_timeout.as_millis()).unwrap_or(u64::MAX),
            slice_ms: u64::try_from(slice.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    #[must_use]
    pub fn slice(&self) -> Duration {
        Duration::from_millis(self.slice_ms)
    }

    /// Most drive slices one wait may take: `ceil(timeout / slice)`, at least 1
    #[must_use]
    pub fn max_slices(&self) -> u64 {
        if self.slice_ms == 0 {
            return 1;
        }
        self.echo_timeout_ms.div_ceil(self.slice_ms).max(1)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_TIMEOUT, DEFAULT_SLICE)
    }
}

/// MQTT protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub endpoint: Endpoint,
    pub keep_alive_secs: u64,
    pub command_timeout_ms: u64,
    pub groups: Vec<TopicGroup>,
    pub wait: WaitConfig,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new(DEFAULT_DOMAIN, DEFAULT_MQTT_PORT),
            keep_alive_secs: DEFAULT_KEEP_ALIVE.as_secs(),
            command_timeout_ms: u64::try_from(DEFAULT_COMMAND_TIMEOUT.as_millis())
                .unwrap_or(u64::MAX),
            groups: default_topic_groups(),
            wait: WaitConfig::default(),
        }
    }
}

/// HTTPS settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpsSettings {
    pub endpoint: Endpoint,
    /// Upper bound on one request/response round trip
    pub exchange_timeout_ms: u64,
    pub operations: Vec<HttpsOperation>,
}

impl Default for HttpsSettings {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new(DEFAULT_DOMAIN, DEFAULT_HTTPS_PORT),
            exchange_timeout_ms: 30_000,
            operations: default_https_operations(),
        }
    }
}

/// Complete probe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub thing_name: String,
    /// Fixed client identifier; derived from the machine id when absent
    pub client_id: Option<String>,
    pub certificates: CertificateBundle,
    /// Size of the buffer shared by payload, request and response handling
    pub scratch_capacity: usize,
    pub mqtt: MqttSettings,
    pub https: HttpsSettings,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            thing_name: DEFAULT_THING_NAME.to_string(),
            client_id: None,
            certificates: CertificateBundle::default(),
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            mqtt: MqttSettings::default(),
            https: HttpsSettings::default(),
        }
    }
}

impl ProbeConfig {
    /// Loads a configuration file: `.toml` as TOML, anything else as JSON
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("Failed to read {}: {e}", path.display())))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&content)
                .map_err(|e| ProbeError::Config(format!("Invalid TOML config: {e}")))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| ProbeError::Config(format!("Invalid JSON config: {e}")))?
        };
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Applies `IOT_PROBE_ENDPOINT`, `IOT_PROBE_THING_NAME` and
    /// `IOT_PROBE_CLIENT_ID` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(domain) = lookup(ENV_ENDPOINT).filter(|v| !v.is_empty()) {
            debug!(domain = %domain, "endpoint overridden");
            self.mqtt.endpoint.domain.clone_from(&domain);
            self.https.endpoint.domain = domain;
        }
        if let Some(thing) = lookup(ENV_THING_NAME).filter(|v| !v.is_empty()) {
            debug!(thing = %thing, "thing name overridden");
            self.thing_name = thing;
        }
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = Some(id);
        }
    }

    #[must_use]
    pub fn with_certificates(mut self, certificates: CertificateBundle) -> Self {
        self.certificates = certificates;
        self
    }

    #[must_use]
    pub fn with_thing_name(mut self, thing_name: impl Into<String>) -> Self {
        self.thing_name = thing_name.into();
        self
    }

    #[must_use]
    pub fn with_endpoint_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.mqtt.endpoint.domain.clone_from(&domain);
        self.https.endpoint.domain = domain;
        self
    }

    /// Checks everything that does not need the certificate files
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.thing_name.is_empty() {
            return Err(ProbeError::Config("Thing name is empty".to_string()));
        }
        for endpoint in [&self.mqtt.endpoint, &self.https.endpoint] {
            if endpoint.domain.is_empty() || endpoint.port == 0 {
                return Err(ProbeError::Config(format!("Invalid endpoint {endpoint}")));
            }
        }
        if self.scratch_capacity < 2 {
            return Err(ProbeError::Config(format!(
                "Scratch capacity {} is too small",
                self.scratch_capacity
            )));
        }
        if self.mqtt.wait.slice_ms == 0 {
            return Err(ProbeError::Config("Wait slice must be non-zero".to_string()));
        }
        for group in &self.mqtt.groups {
            group.expanded(&self.thing_name).validate()?;
        }
        for operation in &self.https.operations {
            if !operation.path.starts_with('/') {
                return Err(ProbeError::Config(format!(
                    "HTTPS operation {} path must start with '/'",
                    operation.name
                )));
            }
        }
        Ok(())
    }

    /// Builds the MQTT session: validates, loads certificates and picks the
    /// client identifier
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if validation or certificate loading fails
    pub fn mqtt_session(&self) -> Result<MqttSessionConfig> {
        self.validate()?;
        let tls = self.certificates.load()?;
        let client_id = resolve_client_id(self.client_id.as_deref(), &[&MachineUid::new()])?;
        Ok(MqttSessionConfig::new(self, tls, client_id))
    }

    /// Builds the HTTPS session
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if validation or certificate loading fails
    pub fn https_session(&self) -> Result<HttpsSessionConfig> {
        self.validate()?;
        Ok(HttpsSessionConfig::new(self, self.certificates.load()?))
    }
}

/// Everything one MQTT orchestrator run needs
#[derive(Debug, Clone)]
pub struct MqttSessionConfig {
    pub endpoint: Endpoint,
    pub tls: TlsMaterial,
    pub connect: ConnectOptions,
    pub thing_name: String,
    pub groups: Vec<TopicGroup>,
    pub wait: WaitConfig,
    pub scratch_capacity: usize,
}

impl MqttSessionConfig {
    /// Builds the session from already loaded parts, expanding the thing
    /// name into topics and filters
    #[must_use]
    pub fn new(config: &ProbeConfig, tls: TlsMaterial, client_id: impl Into<String>) -> Self {
        let connect = ConnectOptions::new(client_id)
            .with_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs))
            .with_command_timeout(Duration::from_millis(config.mqtt.command_timeout_ms));
        Self {
            endpoint: config.mqtt.endpoint.clone(),
            tls,
            connect,
            thing_name: config.thing_name.clone(),
            groups: config
                .mqtt
                .groups
                .iter()
                .map(|g| g.expanded(&config.thing_name))
                .collect(),
            wait: config.mqtt.wait,
            scratch_capacity: config.scratch_capacity,
        }
    }
}

/// Everything one HTTPS run needs
#[derive(Debug, Clone)]
pub struct HttpsSessionConfig {
    pub endpoint: Endpoint,
    pub tls: TlsMaterial,
    pub operations: Vec<HttpsOperation>,
    pub exchange_timeout: Duration,
    pub scratch_capacity: usize,
}

impl HttpsSessionConfig {
    /// Builds the session from already loaded TLS material, expanding the
    /// thing name into request paths
    #[must_use]
    pub fn new(config: &ProbeConfig, tls: TlsMaterial) -> Self {
        Self {
            endpoint: config.https.endpoint.clone(),
            tls,
            operations: config
                .https
                .operations
                .iter()
                .map(|op| HttpsOperation {
                    path: expand_thing(&op.path, &config.thing_name),
                    ..op.clone()
                })
                .collect(),
            exchange_timeout: Duration::from_millis(config.https.exchange_timeout_ms),
            scratch_capacity: config.scratch_capacity,
        }
    }
}

fn expand_thing(text: &str, thing_name: &str) -> String {
    text.replace(THING_NAME_PLACEHOLDER, thing_name)
}

const HELLO_MESSAGE: &str = r#"{ "message": "Hello from Nuvoton Mbed device" }"#;
const REPORTED_STATE: &str =
    r#"{ "state": { "reported": { "attribute1": 3, "attribute2": "1" } } }"#;
const DESIRED_AND_REPORTED_STATE: &str = r#"{ "state": { "desired": { "attribute1": 1, "attribute2": "2" }, "reported": { "attribute1": 2, "attribute2": "1" } } }"#;

/// The user topic plus the update/get/delete thing-shadow topics
#[must_use]
pub fn default_topic_groups() -> Vec<TopicGroup> {
    let shadow = |name: &str, action: &str, payload: &str| {
        let topic = format!("$aws/things/{THING_NAME_PLACEHOLDER}/shadow/{action}");
        TopicGroup::new(
            name,
            topic.clone(),
            [format!("{topic}/accepted"), format!("{topic}/rejected")],
            payload,
        )
    };
    vec![
        TopicGroup::new(
            "user topic",
            "Nuvoton/Mbed/D001",
            ["Nuvoton/Mbed/+"],
            HELLO_MESSAGE,
        ),
        shadow("UpdateThingShadow", "update", REPORTED_STATE),
        shadow("GetThingShadow", "get", ""),
        shadow("DeleteThingShadow", "delete", ""),
    ]
}

/// Topic publishes and RESTful shadow calls through the HTTPS endpoint
#[must_use]
pub fn default_https_operations() -> Vec<HttpsOperation> {
    let shadow_topic =
        |action: &str| format!("/topics/$aws/things/{THING_NAME_PLACEHOLDER}/shadow/{action}?qos=1");
    let shadow_path = format!("/things/{THING_NAME_PLACEHOLDER}/shadow");
    vec![
        HttpsOperation::new(
            "Publish to user topic",
            HttpMethod::Post,
            "/topics/Nuvoton/Mbed/D001?qos=1",
            HELLO_MESSAGE,
        ),
        HttpsOperation::new(
            "Update thing shadow by publishing to UpdateThingShadow topic",
            HttpMethod::Post,
            shadow_topic("update"),
            REPORTED_STATE,
        ),
        HttpsOperation::new(
            "Get thing shadow by publishing to GetThingShadow topic",
            HttpMethod::Post,
            shadow_topic("get"),
            "",
        ),
        HttpsOperation::new(
            "Delete thing shadow by publishing to DeleteThingShadow topic",
            HttpMethod::Post,
            shadow_topic("delete"),
            "",
        ),
        HttpsOperation::new(
            "Update thing shadow RESTfully",
            HttpMethod::Post,
            shadow_path.clone(),
            DESIRED_AND_REPORTED_STATE,
        ),
        HttpsOperation::new(
            "Get thing shadow RESTfully",
            HttpMethod::Get,
            shadow_path.clone(),
            "",
        ),
        HttpsOperation::new(
            "Delete thing shadow RESTfully",
            HttpMethod::Delete,
            shadow_path,
            "",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn pem_bundle() -> CertificateBundle {
        CertificateBundle {
            root_ca: None,
            client_cert: Some(CertificateSource::Pem("CERT".to_string())),
            client_key: Some(CertificateSource::Pem("KEY".to_string())),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ProbeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mqtt.endpoint.port, 8883);
        assert_eq!(config.https.endpoint.port, 8443);
        assert_eq!(config.mqtt.groups.len(), 4);
        assert_eq!(config.https.operations.len(), 7);
        assert_eq!(config.scratch_capacity, 600);
    }

    #[test]
    fn test_session_expands_thing_name() {
        let config = ProbeConfig::default()
            .with_certificates(pem_bundle())
            .with_thing_name("dev-42");
        let session = config.mqtt_session().unwrap();
        let update = &session.groups[1];
        assert_eq!(update.topic, "$aws/things/dev-42/shadow/update");
        assert_eq!(
            update.filters,
            vec![
                "$aws/things/dev-42/shadow/update/accepted",
                "$aws/things/dev-42/shadow/update/rejected"
            ]
        );
        assert!(session.connect.clean_session());

        let https = config.https_session().unwrap();
        assert_eq!(https.operations[6].path, "/things/dev-42/shadow");
        assert_eq!(https.operations[6].method, HttpMethod::Delete);
    }

    #[test]
    fn test_missing_client_certificate() {
        let err = ProbeConfig::default().mqtt_session().unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
    }

    #[test]
    fn test_group_without_filters_rejected() {
        let mut config = ProbeConfig::default();
        config.mqtt.groups = vec![TopicGroup::new("empty", "a/b", Vec::<String>::new(), "")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcard_publish_topic_rejected() {
        let mut config = ProbeConfig::default();
        config.mqtt.groups = vec![TopicGroup::new("bad", "a/+", ["a/#"], "")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wait_slices() {
        assert_eq!(WaitConfig::default().max_slices(), 50);
        let wait = WaitConfig::new(Duration::from_millis(250), Duration::from_millis(100));
        assert_eq!(wait.max_slices(), 3);
        let wait = WaitConfig::new(Duration::ZERO, Duration::from_millis(100));
        assert_eq!(wait.max_slices(), 1);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ENDPOINT, "example-ats.iot.eu-west-1.amazonaws.com"),
            (ENV_THING_NAME, "thing-7"),
            (ENV_CLIENT_ID, "fixed-client"),
        ]
        .into_iter()
        .collect();
        let mut config = ProbeConfig::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.mqtt.endpoint.domain, "example-ats.iot.eu-west-1.amazonaws.com");
        assert_eq!(config.https.endpoint.domain, "example-ats.iot.eu-west-1.amazonaws.com");
        assert_eq!(config.thing_name, "thing-7");
        assert_eq!(config.client_id.as_deref(), Some("fixed-client"));
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
thing_name = "toml-thing"
client_id = "client-1"

[certificates]
client_cert = {{ pem = "CERT" }}
client_key = {{ file = "/nonexistent/key.pem" }}

[mqtt.wait]
echo_timeout_ms = 1000
slice_ms = 50
"#
        )
        .unwrap();
        let config = ProbeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.thing_name, "toml-thing");
        assert_eq!(config.mqtt.wait.max_slices(), 20);
        assert_eq!(config.mqtt.groups.len(), 4);
        assert_eq!(
            config.certificates.client_key,
            Some(CertificateSource::File(PathBuf::from("/nonexistent/key.pem")))
        );
        assert!(matches!(
            config.mqtt_session(),
            Err(ProbeError::Config(_))
        ));
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let mut config = ProbeConfig::default().with_certificates(pem_bundle());
        config.mqtt.groups.truncate(1);
        write!(file, "{}", serde_json::to_string(&config).unwrap()).unwrap();
        let loaded = ProbeConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_reports_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "thing_name = [").unwrap();
        assert!(matches!(
            ProbeConfig::from_file(file.path()),
            Err(ProbeError::Config(_))
        ));
    }

    #[test]
    fn test_tls_material_debug_redacts_key() {
        let material = pem_bundle().load().unwrap();
        let rendered = format!("{material:?}");
        assert!(!rendered.contains("KEY\""));
        assert!(rendered.contains("redacted"));
    }
}
