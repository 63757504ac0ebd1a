use super::discovery::DiscoveredEntity;
use crate::controller::LightPreset;
use crate::gateway::LightId;

const DEFAULT_BRIGHTNESS_SCALE: u16 = 254;

/// Where and how to command one bound light.
#[derive(Debug, Clone, PartialEq)]
pub struct LightEndpoint {
    pub id: LightId,

    /// Topic to send commands
    pub command_topic: String,

    /// Whether brightness is supported, and the value meaning 100%
    pub brightness_scale: Option<u16>,

    pub supports_xy: bool,

    pub supports_color_temp: bool,
}

impl LightEndpoint {
    /// Build an endpoint from a light's discovery message. Lights without a
    /// command topic cannot be controlled and yield `None`.
    pub fn from_discovery(id: LightId, entity: &DiscoveredEntity) -> Option<Self> {
        let discovery = &entity.message;
        let command_topic = discovery.command_topic.clone()?;

        let has_mode = |mode: &str| discovery.supported_color_modes.iter().any(|m| m == mode);

        Some(Self {
            id,
            command_topic,
            brightness_scale: discovery
                .brightness
                .unwrap_or(false)
                .then(|| discovery.brightness_scale.unwrap_or(DEFAULT_BRIGHTNESS_SCALE)),
            supports_xy: has_mode("xy"),
            supports_color_temp: has_mode("color_temp") || discovery.color_temp.unwrap_or(false),
        })
    }

    /// Zigbee2MQTT JSON command for `preset`.
    ///
    /// Attributes are only sent when the light is being turned on and the
    /// light supports them.
    pub fn command_payload(
        &self,
        preset: &LightPreset,
        transition: f64,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let mut payload = serde_json::json!({
            "state": if preset.on { "ON" } else { "OFF" },
            "transition": transition,
        });

        if preset.on {
            if let (Some(scale), Some(percent)) = (self.brightness_scale, preset.brightness) {
                payload["brightness"] = serde_json::json!(scale_brightness(percent, scale));
            }
            if let Some(xy) = preset.color_xy.filter(|_| self.supports_xy) {
                payload["color"] = serde_json::json!({ "x": xy.x, "y": xy.y });
            }
            if let Some(mired) = preset.color_temp.filter(|_| self.supports_color_temp) {
                payload["color_temp"] = serde_json::json!(mired);
            }
        }

        serde_json::to_vec(&payload)
    }
}

fn scale_brightness(percent: u8, scale: u16) -> u16 {
    (u32::from(percent.min(100)) * u32::from(scale) / 100) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(config: &str) -> Option<LightEndpoint> {
        let entity = DiscoveredEntity::parse(
            "homeassistant/light/0x0017880104a1b2c3/light/config",
            config.as_bytes(),
            "homeassistant",
        )
        .unwrap()
        .unwrap();
        LightEndpoint::from_discovery(LightId::from("Porch"), &entity)
    }

    fn color_light() -> LightEndpoint {
        endpoint(
            r#"{
                "schema": "json",
                "command_topic": "zigbee2mqtt/Porch/set",
                "state_topic": "zigbee2mqtt/Porch",
                "brightness": true,
                "brightness_scale": 254,
                "supported_color_modes": ["xy", "color_temp"],
                "device": {"name": "Porch", "identifiers": ["zigbee2mqtt_0x0017880104a1b2c3"]}
            }"#,
        )
        .unwrap()
    }

    fn payload(endpoint: &LightEndpoint, preset: &LightPreset) -> serde_json::Value {
        serde_json::from_slice(&endpoint.command_payload(preset, 1.0).unwrap()).unwrap()
    }

    #[test]
    fn test_capabilities() {
        let light = color_light();
        assert_eq!(light.command_topic, "zigbee2mqtt/Porch/set");
        assert_eq!(light.brightness_scale, Some(254));
        assert!(light.supports_xy);
        assert!(light.supports_color_temp);
    }

    #[test]
    fn test_missing_command_topic() {
        assert_eq!(endpoint(r#"{"state_topic": "zigbee2mqtt/Porch"}"#), None);
    }

    #[test]
    fn test_night_payload() {
        let json = payload(&color_light(), &LightPreset::NIGHT);
        assert_eq!(
            json,
            serde_json::json!({
                "state": "ON",
                "transition": 1.0,
                "brightness": 190,
                "color": {"x": 0.5, "y": 0.45},
                "color_temp": 500,
            })
        );
    }

    #[test]
    fn test_bright_payload_full_brightness() {
        let json = payload(&color_light(), &LightPreset::BRIGHT);
        assert_eq!(json["brightness"], 254);
        assert_eq!(json["color_temp"], 153);
    }

    #[test]
    fn test_off_payloads_carry_no_attributes() {
        for preset in [LightPreset::OFF, LightPreset::DAYTIME_MOTION] {
            let json = payload(&color_light(), &preset);
            assert_eq!(
                json,
                serde_json::json!({"state": "OFF", "transition": 1.0})
            );
        }
    }

    #[test]
    fn test_unsupported_attributes_dropped() {
        let light = endpoint(r#"{"command_topic": "zigbee2mqtt/Plain/set"}"#).unwrap();
        let json = payload(&light, &LightPreset::BRIGHT);
        assert_eq!(json, serde_json::json!({"state": "ON", "transition": 1.0}));
    }

    #[test]
    fn test_legacy_color_temp_flag() {
        let light = endpoint(
            r#"{"command_topic": "zigbee2mqtt/Porch/set", "brightness": true, "color_temp": true}"#,
        )
        .unwrap();
        assert_eq!(light.brightness_scale, Some(254));
        assert!(light.supports_color_temp);
        assert!(!light.supports_xy);
    }
}
