use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::topic::Topic;

// ═══════════════════════════════════════════════════════════════
//  Transport Config
// ═══════════════════════════════════════════════════════════════

/// Receiver transport, resolved once at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Bound TCP endpoint, length-prefixed frames, one fixed topic.
    Direct(DirectConfig),
    /// Redis pub/sub, one log per channel.
    Bus(BusConfig),
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            TransportConfig::Direct(c) => c.validate(),
            TransportConfig::Bus(c) => c.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Direct(_) => "direct",
            TransportConfig::Bus(_) => "bus",
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Direct socket
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectConfig {
    /// `host:port` to bind. `*` as host means all interfaces.
    pub addr: String,
    /// Topic every received frame is logged under.
    #[serde(default = "default_direct_topic")]
    pub topic: String,
    /// Capacity of the connections → receive loop channel.
    #[serde(default = "default_direct_buffer")]
    pub buffer: usize,
    #[serde(default)]
    pub framing: FramingConfig,
}

fn default_direct_topic() -> String {
    "zog".into()
}
fn default_direct_buffer() -> usize {
    4096
}

impl DirectConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            topic: default_direct_topic(),
            buffer: default_direct_buffer(),
            framing: FramingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.contains("://") {
            return Err(ConfigError::Address {
                addr: self.addr.clone(),
                detail: "expected host:port without a scheme".into(),
            });
        }
        split_host_port(&self.addr)?;
        Topic::new(self.topic.clone())?;
        self.framing.validate()?;
        if self.buffer == 0 {
            return Err(ConfigError::Address {
                addr: self.addr.clone(),
                detail: "buffer must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Address handed to the listener, with `*` resolved to `0.0.0.0`.
    pub fn bind_addr(&self) -> String {
        match self.addr.strip_prefix("*:") {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.addr.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[serde(alias = "be")]
    Big,
    #[serde(alias = "le")]
    Little,
}

/// Length-prefix framing of the direct socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Size of the length header in bytes: 1, 2 or 4.
    pub length_bytes: usize,
    pub byte_order: ByteOrder,
    /// Maximum payload size in bytes (0 = unlimited).
    pub max_payload: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            length_bytes: 4,
            byte_order: ByteOrder::Big,
            max_payload: 0,
        }
    }
}

impl FramingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.length_bytes, 1 | 2 | 4) {
            return Err(ConfigError::Framing(format!(
                "length_bytes must be 1, 2, or 4, got {}",
                self.length_bytes
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pub/sub bus
// ═══════════════════════════════════════════════════════════════

/// How the receiver pulls items off a bus subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionStrategy {
    /// Non-blocking get in the receiver's own loop, idle delay between empty polls.
    #[default]
    Polling,
    /// Await the client's blocking iterator.
    #[serde(alias = "listen")]
    BlockingIterate,
    /// A spawned worker polls and invokes the routing callback.
    #[serde(alias = "thread")]
    BackgroundThread,
}

impl ConsumptionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionStrategy::Polling => "polling",
            ConsumptionStrategy::BlockingIterate => "blocking_iterate",
            ConsumptionStrategy::BackgroundThread => "background_thread",
        }
    }
}

impl fmt::Display for ConsumptionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumptionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" | "poll" => Ok(ConsumptionStrategy::Polling),
            "blocking_iterate" | "listen" => Ok(ConsumptionStrategy::BlockingIterate),
            "background_thread" | "thread" => Ok(ConsumptionStrategy::BackgroundThread),
            other => Err(ConfigError::Strategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_host")]
    pub host: String,
    #[serde(default = "default_bus_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<i64>,
    /// PSUBSCRIBE patterns, in subscription order (e.g. `app.*`).
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub strategy: ConsumptionStrategy,
    /// Sleep between empty polls, microseconds.
    #[serde(default = "default_idle_delay_us")]
    pub idle_delay_us: u64,
    /// Liveness probe interval, seconds.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// How long a liveness probe may take before it counts as failed, seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_bus_host() -> String {
    "127.0.0.1".into()
}
fn default_bus_port() -> u16 {
    6379
}
fn default_idle_delay_us() -> u64 {
    500
}
fn default_probe_interval_secs() -> u64 {
    60
}
fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_bus_host(),
            port: default_bus_port(),
            password: None,
            db: None,
            channels: Vec::new(),
            strategy: ConsumptionStrategy::default(),
            idle_delay_us: default_idle_delay_us(),
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl BusConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, pattern: impl Into<String>) -> Self {
        self.channels.push(pattern.into());
        self
    }

    pub fn with_strategy(mut self, strategy: ConsumptionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_micros(self.idle_delay_us)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// `host:port`, for logs and errors. Never contains the password.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Address {
                addr: self.target(),
                detail: "empty host".into(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Address {
                addr: self.target(),
                detail: "port must be non-zero".into(),
            });
        }
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        for pattern in &self.channels {
            validate_pattern(pattern)?;
        }
        Ok(())
    }
}

fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    let detail = if pattern.is_empty() {
        "empty pattern"
    } else if pattern.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "whitespace or control characters"
    } else {
        return Ok(());
    };
    Err(ConfigError::Pattern {
        pattern: pattern.to_string(),
        detail,
    })
}

// ═══════════════════════════════════════════════════════════════
//  Address
// ═══════════════════════════════════════════════════════════════

/// Command-line address: `[scheme://][password@]host:port[/db]`.
///
/// `tcp://*:5011` for a direct socket, `secret@127.0.0.1:6379/0` for a bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub scheme: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: Option<i64>,
}

impl Address {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = |detail: &str| ConfigError::Address {
            addr: input.to_string(),
            detail: detail.to_string(),
        };

        let (scheme, rest) = match input.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (Some(scheme.to_string()), rest),
            Some(_) => return Err(invalid("empty scheme")),
            None => (None, input),
        };

        let (password, rest) = match rest.rsplit_once('@') {
            Some((password, rest)) if !password.is_empty() => (Some(password.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, rest),
        };

        let (host_port, db) = match rest.split_once('/') {
            Some((host_port, "")) => (host_port, None),
            Some((host_port, db)) => {
                let db = db.parse::<i64>().map_err(|_| invalid("db must be a number"))?;
                (host_port, Some(db))
            }
            None => (rest, None),
        };

        let (host, port) = split_host_port(host_port).map_err(|_| invalid("expected host:port"))?;

        Ok(Self {
            scheme,
            password,
            host,
            port,
            db,
        })
    }

    /// `host:port` without scheme, password or db.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy the connection fields of this address into a bus config.
    pub fn apply_to_bus(&self, config: &mut BusConfig) {
        config.host = self.host.clone();
        config.port = self.port;
        if self.password.is_some() {
            config.password = self.password.clone();
        }
        if self.db.is_some() {
            config.db = self.db;
        }
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |detail: &str| ConfigError::Address {
        addr: addr.to_string(),
        detail: detail.to_string(),
    };
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bus_address_with_password_and_db() {
        let addr = Address::parse("secret@127.0.0.1:6379/2").unwrap();
        assert_eq!(addr.scheme, None);
        assert_eq!(addr.password.as_deref(), Some("secret"));
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 6379);
        assert_eq!(addr.db, Some(2));
    }

    #[test]
    fn parses_direct_address_with_scheme() {
        let addr = Address::parse("tcp://*:5011").unwrap();
        assert_eq!(addr.scheme.as_deref(), Some("tcp"));
        assert_eq!(addr.host_port(), "*:5011");
        assert_eq!(addr.password, None);
    }

    #[test]
    fn rejects_address_without_port() {
        assert!(Address::parse("127.0.0.1").is_err());
        assert!(Address::parse("127.0.0.1:http").is_err());
        assert!(Address::parse("127.0.0.1:6379/zero").is_err());
    }

    #[test]
    fn star_host_binds_all_interfaces() {
        let cfg = DirectConfig::new("*:5011");
        assert_eq!(cfg.bind_addr(), "0.0.0.0:5011");
        assert_eq!(DirectConfig::new("127.0.0.1:0").bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn bus_config_requires_channels() {
        let cfg = BusConfig::new("127.0.0.1", 6379);
        assert!(matches!(cfg.validate(), Err(ConfigError::NoChannels)));
        assert!(cfg.with_channel("app.*").validate().is_ok());
    }

    #[test]
    fn bus_config_rejects_blank_pattern() {
        let cfg = BusConfig::new("127.0.0.1", 6379).with_channel("app .*");
        assert!(matches!(cfg.validate(), Err(ConfigError::Pattern { .. })));
    }

    #[test]
    fn default_bus_configs_do_not_share_channels() {
        let a = BusConfig::default().with_channel("a.*");
        let b = BusConfig::default();
        assert_eq!(a.channels, vec!["a.*".to_string()]);
        assert!(b.channels.is_empty());
    }

    #[test]
    fn framing_rejects_odd_header_sizes() {
        let framing = FramingConfig {
            length_bytes: 3,
            ..FramingConfig::default()
        };
        assert!(framing.validate().is_err());
    }

    #[test]
    fn strategy_accepts_short_names() {
        assert_eq!("thread".parse::<ConsumptionStrategy>().unwrap(), ConsumptionStrategy::BackgroundThread);
        assert_eq!("listen".parse::<ConsumptionStrategy>().unwrap(), ConsumptionStrategy::BlockingIterate);
        assert!("spin".parse::<ConsumptionStrategy>().is_err());
    }

    #[test]
    fn transport_config_from_toml() {
        let cfg: TransportConfig = toml::from_str(
            r#"
type = "bus"
host = "10.0.0.5"
channels = ["app.*", "req.*"]
strategy = "thread"
"#,
        )
        .unwrap();
        let TransportConfig::Bus(bus) = cfg else {
            panic!("expected bus config");
        };
        assert_eq!(bus.host, "10.0.0.5");
        assert_eq!(bus.port, 6379);
        assert_eq!(bus.strategy, ConsumptionStrategy::BackgroundThread);
        assert_eq!(bus.idle_delay(), Duration::from_micros(500));
        assert_eq!(bus.probe_interval(), Duration::from_secs(60));
        assert_eq!(bus.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn direct_config_defaults_from_toml() {
        let cfg: TransportConfig = toml::from_str(
            r#"
type = "direct"
addr = "0.0.0.0:5011"
"#,
        )
        .unwrap();
        let TransportConfig::Direct(direct) = cfg else {
            panic!("expected direct config");
        };
        assert_eq!(direct.topic, "zog");
        assert_eq!(direct.framing, FramingConfig::default());
        assert!(direct.validate().is_ok());
    }

    #[test]
    fn direct_addr_with_scheme_is_a_config_error() {
        let cfg: TransportConfig = toml::from_str(
            r#"
type = "direct"
addr = "tcp://*:5011"
"#,
        )
        .unwrap();
        match cfg.validate() {
            Err(ConfigError::Address { addr, detail }) => {
                assert_eq!(addr, "tcp://*:5011");
                assert!(detail.contains("scheme"), "{detail}");
            }
            other => panic!("expected address error, got {other:?}"),
        }
        assert!(DirectConfig::new("*:5011").validate().is_ok());
    }
}
