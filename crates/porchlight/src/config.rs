//! Configuration file parsing and structures.
//!
//! porchlight uses a single TOML file. Only `[location]`, `[mqtt]` and
//! `[devices]` are required; everything else has defaults.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

pub use crate::integrations::mqtt::MqttConfig;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub location: LocationConfig,
    pub mqtt: MqttConfig,
    pub devices: DevicesConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `rumqttc = "warn"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter. `force_debug` raises the default level to
    /// debug (the `--debug` flag); per-target overrides still apply.
    pub fn targets(&self, force_debug: bool) -> Targets {
        let level = if force_debug {
            LogLevel::Debug.min(self.level)
        } else {
            self.level
        };

        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

fn default_elevation_degrees() -> f64 {
    4.0
}

/// Where the lights are, for sunrise and sunset.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,

    /// IANA timezone identifier (e.g., "America/Denver")
    pub timezone: String,

    /// Sun elevation, in degrees above the horizon, that counts as sunrise
    /// and sunset
    #[serde(default = "default_elevation_degrees")]
    pub elevation_degrees: f64,

    /// Minutes to move sunrise later (negative: earlier)
    #[serde(default)]
    pub sunrise_offset_minutes: i64,

    /// Minutes to move sunset earlier (negative: later)
    #[serde(default)]
    pub sunset_offset_minutes: i64,
}

impl LocationConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))
    }
}

/// Device names as known to the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    /// Device carrying the motion sensor
    pub motion_sensor: String,

    /// Device carrying the ambient light sensor (defaults to the motion
    /// sensor device)
    #[serde(default)]
    pub light_level_sensor: Option<String>,

    /// Lights to control, in order
    pub lights: Vec<String>,
}

impl DevicesConfig {
    pub fn light_level_device(&self) -> &str {
        self.light_level_sensor
            .as_deref()
            .unwrap_or(&self.motion_sensor)
    }
}

const MAX_MOTION_TIMEOUT_SECS: u64 = 24 * 3600;
const MAX_ORACLE_RETRY_SECS: u64 = 24 * 3600;
const MAX_MQTT_TIMEOUT_SECS: u64 = 600;
const MAX_TRANSITION_SECS: f64 = 3600.0;
const MAX_SUN_OFFSET_MINUTES: i64 = 12 * 60;

fn default_motion_timeout_secs() -> u64 {
    5 * 60
}

fn default_oracle_retry_initial_secs() -> u64 {
    30
}

fn default_oracle_retry_max_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Seconds after the last "motion ended" before motion is considered over
    #[serde(default = "default_motion_timeout_secs")]
    pub motion_timeout_secs: u64,

    #[serde(default = "default_oracle_retry_initial_secs")]
    pub oracle_retry_initial_secs: u64,

    #[serde(default = "default_oracle_retry_max_secs")]
    pub oracle_retry_max_secs: u64,
}

impl ControllerConfig {
    pub fn motion_timeout(&self) -> Duration {
        Duration::from_secs(self.motion_timeout_secs)
    }

    pub fn oracle_retry_initial(&self) -> Duration {
        Duration::from_secs(self.oracle_retry_initial_secs)
    }

    pub fn oracle_retry_max(&self) -> Duration {
        Duration::from_secs(self.oracle_retry_max_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            motion_timeout_secs: default_motion_timeout_secs(),
            oracle_retry_initial_secs: default_oracle_retry_initial_secs(),
            oracle_retry_max_secs: default_oracle_retry_max_secs(),
        }
    }
}

/// Where alerts (e.g. low battery) go. With neither set they are only logged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsConfig {
    /// Program and arguments; the message is appended as the last argument
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// URL receiving a JSON POST `{"message": ...}`
    #[serde(default)]
    pub webhook: Option<String>,
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// Native HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_api_listen(),
            port: default_api_port(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let location = &self.location;
        if !(-90.0..=90.0).contains(&location.latitude) {
            return Err(ConfigError::Invalid(format!(
                "latitude {} out of range",
                location.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&location.longitude) {
            return Err(ConfigError::Invalid(format!(
                "longitude {} out of range",
                location.longitude
            )));
        }
        location.tz()?;
        if !(-18.0..=30.0).contains(&location.elevation_degrees) {
            return Err(ConfigError::Invalid(format!(
                "elevation_degrees {} out of range",
                location.elevation_degrees
            )));
        }
        check_range(
            "sunrise_offset_minutes",
            location.sunrise_offset_minutes,
            -MAX_SUN_OFFSET_MINUTES..=MAX_SUN_OFFSET_MINUTES,
        )?;
        check_range(
            "sunset_offset_minutes",
            location.sunset_offset_minutes,
            -MAX_SUN_OFFSET_MINUTES..=MAX_SUN_OFFSET_MINUTES,
        )?;

        if self.devices.lights.is_empty() {
            return Err(ConfigError::Invalid("no lights configured".to_string()));
        }

        let controller = &self.controller;
        check_range(
            "motion_timeout_secs",
            controller.motion_timeout_secs,
            1..=MAX_MOTION_TIMEOUT_SECS,
        )?;
        check_range(
            "oracle_retry_initial_secs",
            controller.oracle_retry_initial_secs,
            1..=MAX_ORACLE_RETRY_SECS,
        )?;
        check_range(
            "oracle_retry_max_secs",
            controller.oracle_retry_max_secs,
            controller.oracle_retry_initial_secs..=MAX_ORACLE_RETRY_SECS,
        )?;

        check_range(
            "discovery_timeout_secs",
            self.mqtt.discovery_timeout_secs,
            1..=MAX_MQTT_TIMEOUT_SECS,
        )?;
        check_range(
            "apply_timeout_secs",
            self.mqtt.apply_timeout_secs,
            1..=MAX_MQTT_TIMEOUT_SECS,
        )?;
        // NaN fails the range check too.
        if !(0.0..=MAX_TRANSITION_SECS).contains(&self.mqtt.transition_secs) {
            return Err(ConfigError::Invalid(format!(
                "transition_secs {} out of range",
                self.mqtt.transition_secs
            )));
        }

        if self.alerts.command.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(ConfigError::Invalid("alert command is empty".to_string()));
        }

        Ok(())
    }
}

fn check_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} {value} out of range {}..={}",
            range.start(),
            range.end()
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        [location]
        latitude = 39.7392
        longitude = -104.9903
        timezone = "America/Denver"

        [mqtt]
        broker = "localhost"
        client_id = "porchlight"

        [devices]
        motion_sensor = "Front Door outdoor motion sensor"
        lights = ["Front porch light", "Front walkway"]
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.location.tz().unwrap(), chrono_tz::America::Denver);
        assert_eq!(config.location.elevation_degrees, 4.0);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
        assert_eq!(config.devices.lights.len(), 2);
        assert_eq!(
            config.devices.light_level_device(),
            "Front Door outdoor motion sensor"
        );
        assert_eq!(config.controller.motion_timeout(), Duration::from_secs(300));
        assert!(config.alerts.command.is_none());
        assert!(!config.api.enabled);
        assert_eq!(config.api.port, 8565);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = format!(
            r#"{MINIMAL}
            [logging]
            level = "warn"
            overrides.rumqttc = "error"

            [controller]
            motion_timeout_secs = 120

            [alerts]
            command = ["/usr/local/bin/send-text", "--to", "me"]

            [api]
            enabled = true
            port = 9000
            "#
        );
        let config = Config::parse(&toml).unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.overrides["rumqttc"], LogLevel::Error);
        assert_eq!(config.controller.motion_timeout(), Duration::from_secs(120));
        assert_eq!(config.controller.oracle_retry_initial(), Duration::from_secs(30));
        assert_eq!(config.alerts.command.as_ref().unwrap().len(), 3);
        assert!(config.api.enabled);
        assert_eq!(config.api.listen, "127.0.0.1");
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let toml = MINIMAL.replace("America/Denver", "Mars/Olympus_Mons");
        assert!(matches!(Config::parse(&toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_out_of_range_latitude_rejected() {
        let toml = MINIMAL.replace("39.7392", "123.0");
        assert!(matches!(Config::parse(&toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_no_lights_rejected() {
        let toml = MINIMAL.replace(
            r#"lights = ["Front porch light", "Front walkway"]"#,
            "lights = []",
        );
        assert!(matches!(Config::parse(&toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_durations_out_of_range_rejected() {
        let cases = [
            "[controller]\nmotion_timeout_secs = 0",
            "[controller]\nmotion_timeout_secs = 9223372036854775807",
            "[controller]\noracle_retry_initial_secs = 0",
            "[controller]\noracle_retry_initial_secs = 600\noracle_retry_max_secs = 60",
            "[controller]\noracle_retry_max_secs = 9223372036854775807",
        ];
        for case in cases {
            let toml = format!("{MINIMAL}\n{case}\n");
            let result = Config::parse(&toml);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{case}: {result:?}");
        }
    }

    #[test]
    fn test_mqtt_timeouts_out_of_range_rejected() {
        for (key, value) in [
            ("discovery_timeout_secs", "0"),
            ("discovery_timeout_secs", "9223372036854775807"),
            ("apply_timeout_secs", "0"),
            ("transition_secs", "-1.0"),
            ("transition_secs", "nan"),
            ("transition_secs", "inf"),
        ] {
            let toml = MINIMAL.replace(
                r#"client_id = "porchlight""#,
                &format!("client_id = \"porchlight\"\n{key} = {value}"),
            );
            let result = Config::parse(&toml);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{key} = {value}: {result:?}");
        }
    }

    #[test]
    fn test_sun_settings_out_of_range_rejected() {
        for line in [
            "elevation_degrees = 45.0",
            "elevation_degrees = nan",
            "sunrise_offset_minutes = 100000000000",
            "sunset_offset_minutes = -721",
        ] {
            let toml = MINIMAL.replace(
                r#"timezone = "America/Denver""#,
                &format!("timezone = \"America/Denver\"\n{line}"),
            );
            let result = Config::parse(&toml);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{line}: {result:?}");
        }
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let toml = MINIMAL.replace("[devices]", "[other]");
        assert!(matches!(Config::parse(&toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.devices.motion_sensor, "Front Door outdoor motion sensor");
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(dir.path().join("porchlight.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }

    #[test]
    fn test_logging_targets() {
        let mut logging = LoggingConfig::default();
        logging
            .overrides
            .insert("rumqttc".to_string(), LogLevel::Warn);

        let targets = logging.targets(false);
        assert!(targets.would_enable("porchlight", &tracing::Level::INFO));
        assert!(!targets.would_enable("porchlight", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("rumqttc::state", &tracing::Level::INFO));

        let targets = logging.targets(true);
        assert!(targets.would_enable("porchlight", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("rumqttc", &tracing::Level::INFO));
    }

    #[test]
    fn test_force_debug_keeps_trace() {
        let logging = LoggingConfig {
            level: LogLevel::Trace,
            overrides: HashMap::new(),
        };
        let targets = logging.targets(true);
        assert!(targets.would_enable("porchlight", &tracing::Level::TRACE));
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../../../porchlight.example.toml")).unwrap();
        assert_eq!(config.devices.lights, vec!["Front porch", "Walkway"]);
        assert_eq!(config.devices.light_level_device(), "Front porch motion");
        assert!(config.alerts.command.is_none());
        assert!(!config.api.enabled);
    }
}
