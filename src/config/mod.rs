pub mod runtime;
pub use runtime::RuntimeConfig;

use crate::acp::RootPolicy;
use crate::binder::mqtt::BrokerAddress;
use crate::federation::UpstreamCse;
use crate::primitive::CseType;
use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Complete CSE configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CseConfig {
    #[serde(default)]
    pub cse: CseSection,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Identity and role of this CSE
#[derive(Debug, Clone, Deserialize)]
pub struct CseSection {
    /// CSEBase resource name
    #[serde(default = "default_cse_name")]
    pub name: String,
    /// CSE-ID
    #[serde(default = "default_cse_id")]
    pub id: String,
    /// SP-ID
    #[serde(default = "default_sp_id")]
    pub sp: String,
    /// `IN`, `MN` or `ASN`; derived from `inpoa` when absent
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Point of access of the IN-CSE, `scheme://host:port/<csi>/<name>`
    #[serde(default)]
    pub inpoa: Option<String>,
    /// Points of access announced for this CSE; derived from the enabled
    /// bindings when empty
    #[serde(default)]
    pub poa: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_cse_name() -> String {
    "mobius".to_string()
}

fn default_cse_id() -> String {
    "mb".to_string()
}

fn default_sp_id() -> String {
    "mobius.net".to_string()
}

impl Default for CseSection {
    fn default() -> Self {
        Self {
            name: default_cse_name(),
            id: default_cse_id(),
            sp: default_sp_id(),
            kind: None,
            inpoa: None,
            poa: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl CseSection {
    /// Role of this CSE. Only an IN-CSE may run without an IN point of
    /// access; with one, the role defaults to MN.
    pub fn cse_type(&self) -> Result<CseType> {
        let declared = match &self.kind {
            Some(kind) => Some(
                CseType::parse(kind).with_context(|| format!("unknown CSE type '{}'", kind))?,
            ),
            None => None,
        };
        match (declared, self.inpoa.as_deref().filter(|p| !p.trim().is_empty())) {
            (Some(CseType::In), _) | (None, None) => Ok(CseType::In),
            (Some(kind), None) => bail!("missing IN-CSE point of access for a {} node", kind),
            (Some(kind), Some(_)) => Ok(kind),
            (None, Some(_)) => Ok(CseType::Mn),
        }
    }

    /// The IN-CSE to register with, for MN and ASN nodes.
    pub fn upstream(&self) -> Result<Option<UpstreamCse>> {
        if self.cse_type()? == CseType::In {
            return Ok(None);
        }
        let Some(inpoa) = self.inpoa.as_deref() else {
            return Ok(None);
        };
        let upstream = UpstreamCse::parse(inpoa)?;
        if upstream.rn == self.name {
            bail!(
                "CSE name '{}' is identical to the name of the IN-CSE",
                self.name
            );
        }
        Ok(Some(upstream))
    }
}

/// HTTP binding
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    7579
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl HttpConfig {
    pub fn point_of_access(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// MQTT binding
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Full broker URL; takes precedence over host, port and credentials
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_topic_class")]
    pub topic_class: String,
    /// Join a shared subscription group named after the CSE-ID
    #[serde(default)]
    pub share: bool,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_class() -> String {
    "oneM2M".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: String::new(),
            password: String::new(),
            url: None,
            topic_class: default_topic_class(),
            share: false,
        }
    }
}

impl MqttConfig {
    /// Broker this CSE listens on.
    pub fn broker(&self) -> Result<BrokerAddress> {
        let url = match &self.url {
            Some(url) => url.clone(),
            None if self.username.is_empty() => format!("mqtt://{}:{}", self.host, self.port),
            None => format!(
                "mqtt://{}:{}@{}:{}",
                self.username, self.password, self.host, self.port
            ),
        };
        BrokerAddress::parse(&url).with_context(|| format!("invalid MQTT broker address {}", url))
    }

    /// Point of access announced to other CSEs, without credentials.
    pub fn point_of_access(&self) -> Result<String> {
        let broker = self.broker()?;
        Ok(format!("mqtt://{}:{}", broker.host, broker.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Resource store
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "cse.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: default_store_path(),
        }
    }
}

/// Access control
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub root_policy: RootPolicy,
    /// Originators that bypass access control besides the CSE itself
    #[serde(default)]
    pub admin_originators: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        format!("cse={}", self.level)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<CseConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: CseConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
