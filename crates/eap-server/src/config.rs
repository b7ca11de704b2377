use eap_proto::EapType;
use eap_proto::eap::tls::TlsCertificateConfig;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Credential entry used by password-based leaf methods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// RADIUS client (NAS) entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// IP address or CIDR network
    pub address: String,
    pub secret: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Client {
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }
        Err(ConfigError::Invalid(format!(
            "Invalid client address: {}",
            self.address
        )))
    }

    pub fn matches(&self, source_ip: IpAddr) -> Result<bool, ConfigError> {
        Ok(self.parse_network()?.contains(source_ip))
    }

    pub fn get_secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

/// Per-method overrides of the shared tunnel settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodOverrides {
    #[serde(default)]
    pub fragment_size: Option<usize>,
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
}

/// The slice of [`EapSettings`] one method runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSettings {
    pub enabled: bool,
    pub fragment_size: usize,
    pub max_tls_message_size: usize,
    pub handshake_timeout: Duration,
}

/// EAP negotiation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EapSettings {
    /// Ordered outer offer list
    #[serde(default = "default_methods")]
    pub methods: Vec<EapType>,

    /// Ordered offer list inside a PEAP tunnel
    #[serde(default = "default_peap_inner_methods")]
    pub peap_inner_methods: Vec<EapType>,

    /// Methods that report themselves as not offerable
    #[serde(default)]
    pub disabled_methods: Vec<EapType>,

    /// Maximum EAP-TLS/PEAP Type-Data bytes per round
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,

    /// How long a request waits on the handshake task
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Idle age after which a conversation is evicted
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Largest reassembled TLS message and largest buffered TLS output
    #[serde(default = "default_max_tls_message_size")]
    pub max_tls_message_size: usize,

    /// Server certificate; TLS-based methods are not offered without it
    #[serde(default)]
    pub tls: Option<TlsCertificateConfig>,

    /// Settings that differ for one method, e.g. a smaller PEAP fragment
    #[serde(default)]
    pub overrides: BTreeMap<EapType, MethodOverrides>,
}

fn default_methods() -> Vec<EapType> {
    vec![EapType::Identity, EapType::Peap]
}

fn default_peap_inner_methods() -> Vec<EapType> {
    vec![EapType::Identity, EapType::Md5Challenge]
}

fn default_fragment_size() -> usize {
    1020
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}

fn default_session_ttl_secs() -> u64 {
    300
}

fn default_max_tls_message_size() -> usize {
    65536
}

impl Default for EapSettings {
    fn default() -> Self {
        EapSettings {
            methods: default_methods(),
            peap_inner_methods: default_peap_inner_methods(),
            disabled_methods: Vec::new(),
            fragment_size: default_fragment_size(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            session_ttl_secs: default_session_ttl_secs(),
            max_tls_message_size: default_max_tls_message_size(),
            tls: None,
            overrides: BTreeMap::new(),
        }
    }
}

impl EapSettings {
    /// Smallest fragment that still carries flags, length and some data
    pub const MIN_FRAGMENT_SIZE: usize = 64;
    /// Keeps a Challenge with State and Message-Authenticator under 4096 bytes
    pub const MAX_FRAGMENT_SIZE: usize = 3000;

    pub fn is_disabled(&self, method: EapType) -> bool {
        self.disabled_methods.contains(&method)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Shared settings with the overrides of `method` applied
    pub fn for_method(&self, method: EapType) -> MethodSettings {
        let overrides = self.overrides.get(&method);
        MethodSettings {
            enabled: !self.is_disabled(method),
            fragment_size: overrides
                .and_then(|o| o.fragment_size)
                .unwrap_or(self.fragment_size),
            max_tls_message_size: self.max_tls_message_size,
            handshake_timeout: Duration::from_millis(
                overrides
                    .and_then(|o| o.handshake_timeout_ms)
                    .unwrap_or(self.handshake_timeout_ms),
            ),
        }
    }

    fn validate_tunnel(&self, fragment_size: usize, timeout_ms: u64) -> Result<(), ConfigError> {
        if !(Self::MIN_FRAGMENT_SIZE..=Self::MAX_FRAGMENT_SIZE).contains(&fragment_size) {
            return Err(ConfigError::Invalid(format!(
                "fragment_size must be between {} and {}",
                Self::MIN_FRAGMENT_SIZE,
                Self::MAX_FRAGMENT_SIZE
            )));
        }
        if self.max_tls_message_size < fragment_size {
            return Err(ConfigError::Invalid(
                "max_tls_message_size must not be smaller than fragment_size".to_string(),
            ));
        }
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_ms cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_tunnel(self.fragment_size, self.handshake_timeout_ms)?;
        for (method, overrides) in &self.overrides {
            self.validate_tunnel(
                overrides.fragment_size.unwrap_or(self.fragment_size),
                overrides
                    .handshake_timeout_ms
                    .unwrap_or(self.handshake_timeout_ms),
            )
            .map_err(|e| ConfigError::Invalid(format!("{:?}: {}", method, e)))?;
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("session_ttl_secs cannot be 0".to_string()));
        }
        if let Some(tunnel) = self
            .peap_inner_methods
            .iter()
            .find(|m| matches!(m, EapType::Peap | EapType::Tls))
        {
            return Err(ConfigError::Invalid(format!(
                "{:?} cannot run inside a PEAP tunnel",
                tunnel
            )));
        }
        if let Some(tls) = &self.tls
            && tls.require_client_cert
            && tls.ca_cert_path.is_none()
        {
            return Err(ConfigError::Invalid(
                "require_client_cert needs ca_cert_path".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Shared secret for clients without their own
    #[serde(default = "default_secret")]
    pub secret: String,

    #[serde(default)]
    pub clients: Vec<Client>,

    #[serde(default)]
    pub users: Vec<User>,

    /// "trace", "debug", "info", "warn" or "error"; RUST_LOG wins when set
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub eap: EapSettings,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    1812
}

fn default_secret() -> String {
    "testing123".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            secret: default_secret(),
            clients: vec![],
            users: vec![],
            log_level: None,
            eap: EapSettings::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr: IpAddr = self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid IP address: {}", self.listen_address))
        })?;
        Ok(SocketAddr::new(addr, self.listen_port))
    }

    /// First enabled client whose network contains `source_ip`
    pub fn find_client(&self, source_ip: IpAddr) -> Option<&Client> {
        self.clients
            .iter()
            .filter(|client| client.enabled)
            .find(|client| matches!(client.matches(source_ip), Ok(true)))
    }

    /// Client-specific secret, or the default one when no client matches
    pub fn get_secret_for_client(&self, source_ip: IpAddr) -> &[u8] {
        self.find_client(source_ip)
            .map(|client| client.get_secret())
            .unwrap_or_else(|| self.secret.as_bytes())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let _: IpAddr = self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address))
        })?;

        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("Port cannot be 0".to_string()));
        }
        if self.secret.is_empty() {
            return Err(ConfigError::Invalid("Secret cannot be empty".to_string()));
        }

        for client in &self.clients {
            if client.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Client {} has empty secret",
                    client.address
                )));
            }
            client.parse_network()?;
        }

        for user in &self.users {
            if user.username.is_empty() {
                return Err(ConfigError::Invalid("User has empty username".to_string()));
            }
        }

        self.eap.validate()
    }

    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 1812,
            secret: "testing123".to_string(),
            clients: vec![Client {
                address: "192.168.1.0/24".to_string(),
                secret: "client_secret_1".to_string(),
                name: Some("Access Points".to_string()),
                enabled: true,
            }],
            users: vec![User {
                username: "alice".to_string(),
                password: "password".to_string(),
            }],
            log_level: Some("info".to_string()),
            eap: EapSettings {
                tls: Some(TlsCertificateConfig::simple(
                    "/etc/eap-radius/server.pem",
                    "/etc/eap-radius/server-key.pem",
                )),
                ..EapSettings::default()
            },
        }
    }
}
