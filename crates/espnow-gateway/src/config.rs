//! Configuration types for the ESP-NOW gateway
//!
//! The topic table is not configurable: routing is fixed at build
//! time (see [`crate::router`]). Configuration only covers the link, the
//! options handed to the broker collaborator, diagnostics and the service
//! loop.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Maximum length of the envelope content field, terminator included
pub const MAX_CONTENT_LEN: usize = 240;

/// Default UDP address for forwarded ESP-NOW frames
pub const DEFAULT_UDP_BIND: &str = "0.0.0.0:4210";

/// Default MQTT client identifier
pub const DEFAULT_CLIENT_ID: &str = "ESPNOW-MQTT-GATEWAY";

/// Default broker packet buffer size
pub const DEFAULT_MAX_PACKET_SIZE: usize = 2048;

/// Last-will topic announced by the broker client
pub const LAST_WILL_TOPIC: &str = "domoticz/in/lastwill";

/// Last-will payload announced by the broker client
pub const LAST_WILL_PAYLOAD: &str = "going offline";

/// Default offset applied to diagnostic timestamps (UTC-3)
pub const DEFAULT_UTC_OFFSET_SECS: i32 = -10800;

const MAX_UTC_OFFSET_SECS: i32 = 86_399;

/// Main configuration for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Radio link source
    #[serde(default)]
    pub link: LinkConfig,

    /// Options for the broker collaborator
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Diagnostic record settings
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Service loop settings
    #[serde(default)]
    pub service: ServiceConfig,
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service.command_queue_size == 0 {
            return Err(GatewayError::InvalidConfig(
                "service.command_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.service.stats_interval.is_zero() {
            return Err(GatewayError::InvalidConfig(
                "service.stats_interval must be greater than zero".to_string(),
            ));
        }
        if !(-MAX_UTC_OFFSET_SECS..=MAX_UTC_OFFSET_SECS).contains(&self.diagnostics.utc_offset) {
            return Err(GatewayError::InvalidConfig(format!(
                "diagnostics.utc_offset {} is outside ±{}s",
                self.diagnostics.utc_offset, MAX_UTC_OFFSET_SECS
            )));
        }
        if self.broker.max_packet_size < MAX_CONTENT_LEN {
            return Err(GatewayError::InvalidConfig(format!(
                "broker.max_packet_size {} cannot hold a {}-byte payload",
                self.broker.max_packet_size, MAX_CONTENT_LEN
            )));
        }
        Ok(())
    }
}

/// Where frames come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    /// Datagrams of `MAC ‖ envelope` forwarded by an ESP-NOW receiver
    Udp {
        /// Local address to bind
        bind: SocketAddr,
    },
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::Udp {
            bind: default_udp_bind(),
        }
    }
}

fn default_udp_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4210))
}

/// Options handed to the broker collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Retain flag used for every publication
    #[serde(default)]
    pub retain: bool,

    /// Broker client packet buffer size
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Last-will topic
    #[serde(default = "default_last_will_topic")]
    pub last_will_topic: String,

    /// Last-will payload
    #[serde(default = "default_last_will_payload")]
    pub last_will_payload: String,
}

fn default_max_packet_size() -> usize {
    DEFAULT_MAX_PACKET_SIZE
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_last_will_topic() -> String {
    LAST_WILL_TOPIC.to_string()
}

fn default_last_will_payload() -> String {
    LAST_WILL_PAYLOAD.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            retain: false,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            client_id: default_client_id(),
            last_will_topic: default_last_will_topic(),
            last_will_payload: default_last_will_payload(),
        }
    }
}

/// Diagnostic record settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Emit a record for every frame
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Offset from UTC in seconds for record timestamps
    #[serde(default = "default_utc_offset")]
    pub utc_offset: i32,
}

fn default_enabled() -> bool {
    true
}

fn default_utc_offset() -> i32 {
    DEFAULT_UTC_OFFSET_SECS
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset: DEFAULT_UTC_OFFSET_SECS,
        }
    }
}

/// Service loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the handle command channel
    #[serde(default = "default_queue_size")]
    pub command_queue_size: usize,

    /// Pause after the link reports no frame available
    #[serde(with = "humantime_serde", default = "default_idle_poll")]
    pub idle_poll: Duration,

    /// Interval between periodic stats log lines
    #[serde(with = "humantime_serde", default = "default_stats_interval")]
    pub stats_interval: Duration,
}

fn default_queue_size() -> usize {
    256
}

fn default_idle_poll() -> Duration {
    Duration::from_millis(50)
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command_queue_size: default_queue_size(),
            idle_poll: default_idle_poll(),
            stats_interval: default_stats_interval(),
        }
    }
}

/// Builder for GatewayConfig
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive frames on a UDP address
    pub fn udp_bind(mut self, bind: SocketAddr) -> Self {
        self.config.link = LinkConfig::Udp { bind };
        self
    }

    /// Set the retain flag for publications
    pub fn retain(mut self, retain: bool) -> Self {
        self.config.broker.retain = retain;
        self
    }

    /// Set the broker client identifier
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.broker.client_id = client_id.into();
        self
    }

    /// Set the diagnostic timestamp offset in seconds
    pub fn utc_offset(mut self, seconds: i32) -> Self {
        self.config.diagnostics.utc_offset = seconds;
        self
    }

    /// Enable or disable diagnostic records
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.config.diagnostics.enabled = enabled;
        self
    }

    /// Set the pause after an empty link read
    pub fn idle_poll(mut self, idle_poll: Duration) -> Self {
        self.config.service.idle_poll = idle_poll;
        self
    }

    /// Set the interval between stats log lines
    pub fn stats_interval(mut self, stats_interval: Duration) -> Self {
        self.config.service.stats_interval = stats_interval;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
