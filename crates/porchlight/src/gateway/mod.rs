//! Device gateway abstraction.
//!
//! The controller knows lights only by identity and asks the gateway to apply
//! a preset to each of them. Discovery, transport and device quirks live in
//! the gateway implementation (see `integrations::mqtt`).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::controller::LightPreset;

/// Identity of a controllable light (its device name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LightId(pub String);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LightId {
    fn from(s: &str) -> Self {
        LightId(s.to_string())
    }
}

/// Identity of a sensor entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SensorId(pub String);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Devices the controller works with, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBinding {
    /// Name of the device carrying the motion sensor
    pub motion_device: String,

    pub motion_sensor: SensorId,

    pub light_level_sensor: SensorId,

    /// Lights in the controlled group, in configured order
    pub lights: Vec<LightId>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown light: {0}")]
    UnknownLight(LightId),

    #[error("gateway not connected")]
    NotConnected,

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish command: {0}")]
    Publish(String),

    #[error("no response from gateway after {0:?}")]
    Timeout(Duration),
}

/// Startup failures while resolving the `DeviceBinding`. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("failed to connect to gateway: {0}")]
    Connect(String),

    #[error("motion sensor device not found: {0}")]
    MotionSensorNotFound(String),

    #[error("light level sensor not found on device: {0}")]
    LightLevelSensorNotFound(String),

    #[error("light device(s) missing: {}", .0.join(", "))]
    LightsMissing(Vec<String>),
}

/// Applies light presets to physical lights.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Apply `preset` to a single light. One attempt, no retries.
    async fn apply(&self, light: &LightId, preset: &LightPreset) -> Result<(), GatewayError>;
}

/// Gateway that records every call, failing for selected lights.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingGateway {
    pub calls: std::sync::Mutex<Vec<(LightId, LightPreset)>>,
    pub failing: std::collections::HashSet<LightId>,
    /// Time each call takes before it is recorded.
    pub delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl RecordingGateway {
    pub fn failing_for(lights: &[&str]) -> Self {
        Self {
            calls: Default::default(),
            failing: lights.iter().map(|l| LightId::from(*l)).collect(),
            delay: None,
        }
    }

    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(LightId, LightPreset)> {
        self.calls.lock().unwrap().clone()
    }

    /// Preset names applied, in order, one entry per light call.
    pub fn applied(&self) -> Vec<crate::controller::PresetName> {
        self.calls().into_iter().map(|(_, p)| p.name).collect()
    }

    pub fn last(&self) -> Option<LightPreset> {
        self.calls().last().map(|(_, p)| *p)
    }
}

#[cfg(test)]
#[async_trait]
impl DeviceGateway for RecordingGateway {
    async fn apply(&self, light: &LightId, preset: &LightPreset) -> Result<(), GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push((light.clone(), *preset));
        if self.failing.contains(light) {
            return Err(GatewayError::Publish("light unreachable".to_string()));
        }
        Ok(())
    }
}
