use std::time::Duration;

use serde::Deserialize;

fn default_port() -> u16 {
    1883
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_discovery_timeout_secs() -> u64 {
    5
}

fn default_apply_timeout_secs() -> u64 {
    10
}

fn default_transition_secs() -> f64 {
    1.0
}

/// Configuration for the MQTT gateway
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client ID
    pub client_id: String,

    /// Discovery prefix for Zigbee2MQTT (default: "homeassistant")
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// How long to wait for retained discovery messages at startup
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Upper bound on publishing one light command
    #[serde(default = "default_apply_timeout_secs")]
    pub apply_timeout_secs: u64,

    /// Light transition time in seconds
    #[serde(default = "default_transition_secs")]
    pub transition_secs: f64,
}

impl Config {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }
}
