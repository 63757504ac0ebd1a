//! Turns sensor state messages into controller events.

use serde_json::Value;
use tracing::debug;

use super::discovery::DiscoveredEntity;
use crate::controller::Event;
use crate::gateway::SensorId;

/// A bound sensor entity: where its state is published and which key of the
/// JSON payload holds its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEndpoint {
    pub id: SensorId,
    pub state_topic: String,
    pub key: String,
}

impl SensorEndpoint {
    pub fn from_discovery(entity: &DiscoveredEntity) -> Option<Self> {
        Some(Self {
            id: SensorId(entity.unique_id()),
            state_topic: entity.message.state_topic.clone()?,
            key: entity.value_key(),
        })
    }

    fn read<'a>(&self, topic: &str, payload: &'a Value) -> Option<&'a Value> {
        if topic != self.state_topic {
            return None;
        }
        payload.get(&self.key).filter(|v| !v.is_null())
    }
}

/// Tracks the last seen sensor values so only changes become events.
///
/// Zigbee2MQTT publishes every exposed property on each update, so one state
/// message may carry motion, light level and battery at once.
#[derive(Debug)]
pub struct SensorTracker {
    motion: SensorEndpoint,
    light_level: SensorEndpoint,
    battery: Option<SensorEndpoint>,

    occupied: bool,
    level: Option<u32>,
    battery_level: Option<u8>,
}

impl SensorTracker {
    pub fn new(
        motion: SensorEndpoint,
        light_level: SensorEndpoint,
        battery: Option<SensorEndpoint>,
    ) -> Self {
        Self {
            motion,
            light_level,
            battery,
            occupied: false,
            level: None,
            battery_level: None,
        }
    }

    /// State topics to subscribe to, deduplicated.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for endpoint in [Some(&self.motion), Some(&self.light_level), self.battery.as_ref()]
            .into_iter()
            .flatten()
        {
            if !topics.contains(&endpoint.state_topic) {
                topics.push(endpoint.state_topic.clone());
            }
        }
        topics
    }

    fn is_tracked(&self, topic: &str) -> bool {
        self.motion.state_topic == topic
            || self.light_level.state_topic == topic
            || self.battery.as_ref().is_some_and(|b| b.state_topic == topic)
    }

    /// Translate one state message into zero or more events.
    pub fn observe(&mut self, topic: &str, payload: &[u8]) -> Vec<Event> {
        if !self.is_tracked(topic) {
            return vec![Event::Unrecognized {
                source: topic.to_string(),
            }];
        }

        let payload: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                debug!("Ignoring malformed state on {}: {}", topic, e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if let Some(active) = self.motion.read(topic, &payload).and_then(parse_bool) {
            if active != self.occupied {
                self.occupied = active;
                events.push(Event::MotionChanged { active });
            }
        }

        if let Some(level) = self.light_level.read(topic, &payload).and_then(parse_level) {
            if self.level != Some(level) {
                self.level = Some(level);
                events.push(Event::LightLevelChanged { level });
            }
        }

        let battery = self
            .battery
            .as_ref()
            .and_then(|b| b.read(topic, &payload))
            .and_then(parse_battery);
        if let Some(battery) = battery {
            // The first reading only establishes a baseline
            if self.battery_level.is_some_and(|prev| prev != battery) {
                events.push(Event::DevicePowerChanged { battery });
            }
            self.battery_level = Some(battery);
        }

        events
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "ON" | "on" | "true" => Some(true),
            "OFF" | "off" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_level(value: &Value) -> Option<u32> {
    let level = value.as_f64()?;
    (level >= 0.0).then(|| level.round().min(f64::from(u32::MAX)) as u32)
}

fn parse_battery(value: &Value) -> Option<u8> {
    let level = value.as_f64()?;
    (level >= 0.0).then(|| level.round().min(100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "zigbee2mqtt/Front porch motion";

    fn endpoint(key: &str) -> SensorEndpoint {
        SensorEndpoint {
            id: SensorId(format!("0x01_{key}")),
            state_topic: TOPIC.to_string(),
            key: key.to_string(),
        }
    }

    fn tracker() -> SensorTracker {
        SensorTracker::new(
            endpoint("occupancy"),
            endpoint("illuminance_lux"),
            Some(endpoint("battery")),
        )
    }

    #[test]
    fn test_topics_deduplicated() {
        let mut t = tracker();
        t.light_level.state_topic = "zigbee2mqtt/Yard light sensor".to_string();
        assert_eq!(
            t.topics(),
            vec![TOPIC.to_string(), "zigbee2mqtt/Yard light sensor".to_string()]
        );
    }

    #[test]
    fn test_first_message() {
        let mut t = tracker();
        let events = t.observe(
            TOPIC,
            br#"{"occupancy": false, "illuminance_lux": 42, "battery": 97, "linkquality": 120}"#,
        );
        // Initial "no motion" is not a change and the first battery reading
        // is only a baseline
        assert_eq!(events, vec![Event::LightLevelChanged { level: 42 }]);
    }

    #[test]
    fn test_motion_only_on_change() {
        let mut t = tracker();
        assert_eq!(
            t.observe(TOPIC, br#"{"occupancy": true}"#),
            vec![Event::MotionChanged { active: true }]
        );
        assert_eq!(t.observe(TOPIC, br#"{"occupancy": true}"#), Vec::<Event>::new());
        assert_eq!(
            t.observe(TOPIC, br#"{"occupancy": false}"#),
            vec![Event::MotionChanged { active: false }]
        );
    }

    #[test]
    fn test_battery_change_after_baseline() {
        let mut t = tracker();
        assert_eq!(t.observe(TOPIC, br#"{"battery": 20}"#), Vec::<Event>::new());
        assert_eq!(t.observe(TOPIC, br#"{"battery": 20}"#), Vec::<Event>::new());
        assert_eq!(
            t.observe(TOPIC, br#"{"battery": 19.6}"#),
            Vec::<Event>::new()
        );
        assert_eq!(
            t.observe(TOPIC, br#"{"battery": 15}"#),
            vec![Event::DevicePowerChanged { battery: 15 }]
        );
    }

    #[test]
    fn test_combined_message_order() {
        let mut t = tracker();
        t.observe(TOPIC, br#"{"battery": 50}"#);
        let events = t.observe(
            TOPIC,
            br#"{"occupancy": true, "illuminance_lux": 3.4, "battery": 49}"#,
        );
        assert_eq!(
            events,
            vec![
                Event::MotionChanged { active: true },
                Event::LightLevelChanged { level: 3 },
                Event::DevicePowerChanged { battery: 49 },
            ]
        );
    }

    #[test]
    fn test_untracked_topic() {
        let mut t = tracker();
        assert_eq!(
            t.observe("zigbee2mqtt/bridge/state", br#"{"state": "online"}"#),
            vec![Event::Unrecognized {
                source: "zigbee2mqtt/bridge/state".to_string()
            }]
        );
    }

    #[test]
    fn test_malformed_and_null_values_ignored() {
        let mut t = tracker();
        assert_eq!(t.observe(TOPIC, b"not json"), Vec::<Event>::new());
        assert_eq!(
            t.observe(TOPIC, br#"{"occupancy": null, "illuminance_lux": "dark"}"#),
            Vec::<Event>::new()
        );
    }

    #[test]
    fn test_string_occupancy() {
        let mut t = tracker();
        assert_eq!(
            t.observe(TOPIC, br#"{"occupancy": "ON"}"#),
            vec![Event::MotionChanged { active: true }]
        );
    }

    #[test]
    fn test_without_battery_sensor() {
        let mut t = SensorTracker::new(endpoint("occupancy"), endpoint("illuminance_lux"), None);
        assert_eq!(t.observe(TOPIC, br#"{"battery": 10}"#), Vec::<Event>::new());
        assert_eq!(t.observe(TOPIC, br#"{"battery": 5}"#), Vec::<Event>::new());
    }
}
