//! Resolves configured device names to discovered entities.

use std::collections::HashMap;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::discovery::Component;
use super::discovery::DeviceInfo;
use super::discovery::DiscoveredEntity;
use super::light::LightEndpoint;
use super::sensor::SensorEndpoint;
use super::sensor::SensorTracker;
use crate::config::DevicesConfig;
use crate::gateway::BindingError;
use crate::gateway::DeviceBinding;
use crate::gateway::LightId;

const MOTION_CLASSES: [&str; 2] = ["motion", "occupancy"];

/// Accepted light level classes, most preferred first.
const LIGHT_LEVEL_CLASSES: [&str; 2] = ["illuminance_lux", "illuminance"];

fn describe(entity: &DiscoveredEntity) -> String {
    entity
        .message
        .device
        .as_ref()
        .map(DeviceInfo::describe)
        .unwrap_or_default()
}

/// Everything the gateway needs once binding succeeded.
#[derive(Debug)]
pub struct ResolvedDevices {
    pub binding: DeviceBinding,
    pub lights: HashMap<LightId, LightEndpoint>,
    pub sensors: SensorTracker,
}

/// Collects discovered entities until the configured devices are all bound.
#[derive(Debug)]
pub struct BindingResolver {
    motion_device: String,
    light_level_device: String,
    light_names: Vec<String>,

    motion: Option<SensorEndpoint>,
    light_level: Option<(usize, SensorEndpoint)>,
    battery: Option<SensorEndpoint>,
    lights: HashMap<String, LightEndpoint>,
}

impl BindingResolver {
    pub fn new(devices: &DevicesConfig) -> Self {
        Self {
            motion_device: devices.motion_sensor.clone(),
            light_level_device: devices.light_level_device().to_string(),
            light_names: devices.lights.clone(),
            motion: None,
            light_level: None,
            battery: None,
            lights: HashMap::new(),
        }
    }

    /// Whether every entity, including the optional battery sensor, has been
    /// found.
    pub fn is_complete(&self) -> bool {
        self.motion.is_some()
            && self.light_level.is_some()
            && self.battery.is_some()
            && self.light_names.iter().all(|n| self.lights.contains_key(n))
    }

    pub fn observe(&mut self, entity: &DiscoveredEntity) {
        let Some(device) = entity.device_name() else {
            return;
        };
        let class = entity.device_class();

        match entity.component {
            Component::BinarySensor
                if device == self.motion_device
                    && class.is_some_and(|c| MOTION_CLASSES.contains(&c)) =>
            {
                if let Some(endpoint) = SensorEndpoint::from_discovery(entity) {
                    info!(
                        "Found motion sensor {} on {} ({})",
                        endpoint.id,
                        device,
                        describe(entity)
                    );
                    self.motion = Some(endpoint);
                }
            }
            Component::Sensor if device == self.light_level_device => {
                let rank = class.and_then(|c| LIGHT_LEVEL_CLASSES.iter().position(|l| *l == c));
                let better = match (&self.light_level, rank) {
                    (_, None) => false,
                    (None, Some(_)) => true,
                    (Some((current, _)), Some(rank)) => rank < *current,
                };
                if let (true, Some(rank), Some(endpoint)) =
                    (better, rank, SensorEndpoint::from_discovery(entity))
                {
                    info!("Found light level sensor {} on {}", endpoint.id, device);
                    self.light_level = Some((rank, endpoint));
                }
                self.observe_battery(entity, device);
            }
            Component::Sensor => self.observe_battery(entity, device),
            Component::Light if self.light_names.iter().any(|n| n == device) => {
                match LightEndpoint::from_discovery(LightId::from(device), entity) {
                    Some(endpoint) => {
                        info!(
                            "Found light {} ({}) at {}",
                            device,
                            describe(entity),
                            endpoint.command_topic
                        );
                        self.lights.insert(device.to_string(), endpoint);
                    }
                    None => warn!("Light {} has no command topic, ignoring", device),
                }
            }
            _ => debug!(
                "Ignoring {} {} on {}",
                entity.component.as_str(),
                entity.object_id,
                device
            ),
        }
    }

    fn observe_battery(&mut self, entity: &DiscoveredEntity, device: &str) {
        if device != self.motion_device || entity.device_class() != Some("battery") {
            return;
        }
        if let Some(endpoint) = SensorEndpoint::from_discovery(entity) {
            info!("Found battery sensor {} on {}", endpoint.id, device);
            self.battery = Some(endpoint);
        }
    }

    /// Finish binding with whatever has been found.
    pub fn resolve(mut self) -> Result<ResolvedDevices, BindingError> {
        let motion = self
            .motion
            .take()
            .ok_or_else(|| BindingError::MotionSensorNotFound(self.motion_device.clone()))?;

        let (_, light_level) = self
            .light_level
            .take()
            .ok_or_else(|| BindingError::LightLevelSensorNotFound(self.light_level_device.clone()))?;

        let missing: Vec<String> = self
            .light_names
            .iter()
            .filter(|n| !self.lights.contains_key(*n))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(BindingError::LightsMissing(missing));
        }

        if self.battery.is_none() {
            warn!(
                "No battery sensor found on {}; battery alerts disabled",
                self.motion_device
            );
        }

        let lights: Vec<LightId> = self.light_names.iter().map(|n| LightId::from(n.as_str())).collect();
        let endpoints = self
            .lights
            .into_values()
            .map(|endpoint| (endpoint.id.clone(), endpoint))
            .collect();

        Ok(ResolvedDevices {
            binding: DeviceBinding {
                motion_device: self.motion_device,
                motion_sensor: motion.id.clone(),
                light_level_sensor: light_level.id.clone(),
                lights,
            },
            lights: endpoints,
            sensors: SensorTracker::new(motion, light_level, self.battery),
        })
    }
}
