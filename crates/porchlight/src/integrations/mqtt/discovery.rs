use serde::Deserialize;

/// Deserialize a field that can be either a string or an integer.
///
/// Zigbee2MQTT sends version fields like `hw_version` as integers, but the
/// Home Assistant discovery schema defines them as strings.
fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrInt;

    impl<'de> de::Visitor<'de> for StringOrInt {
        type Value = Option<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("string, integer, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
    }

    deserializer.deserialize_any(StringOrInt)
}

/// Home Assistant discovery payload, as published by Zigbee2MQTT.
///
/// Only the fields porchlight acts on are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryMessage {
    pub unique_id: Option<String>,

    /// Topic to receive state updates
    pub state_topic: Option<String>,

    /// Topic to send commands
    pub command_topic: Option<String>,

    pub device: Option<DeviceInfo>,

    /// e.g. "motion", "illuminance", "battery"
    pub device_class: Option<String>,

    /// Value template for extracting state from the JSON payload,
    /// e.g. `{{ value_json.occupancy }}`
    pub value_template: Option<String>,

    /// Whether brightness is supported (lights)
    pub brightness: Option<bool>,

    /// Scale used for `brightness` commands (defaults to 255 in Home
    /// Assistant; Zigbee2MQTT sends 254)
    pub brightness_scale: Option<u16>,

    /// e.g. `["xy", "color_temp"]` (lights)
    #[serde(default)]
    pub supported_color_modes: Vec<String>,

    /// Legacy color temperature flag (lights)
    pub color_temp: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    /// Device name, e.g. "Front porch motion"
    pub name: String,

    pub manufacturer: Option<String>,

    pub model: Option<String>,

    #[serde(default, deserialize_with = "deserialize_string_or_int")]
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    /// e.g. "Philips Hue outdoor motion sensor, firmware 2"
    pub fn describe(&self) -> String {
        let model = [self.manufacturer.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        match (model.is_empty(), &self.sw_version) {
            (true, _) => "unknown model".to_string(),
            (false, Some(version)) => format!("{model}, firmware {version}"),
            (false, None) => model,
        }
    }
}

/// Entity components porchlight binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Light,
    BinarySensor,
    Sensor,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Light, Component::BinarySensor, Component::Sensor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Light => "light",
            Component::BinarySensor => "binary_sensor",
            Component::Sensor => "sensor",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Wildcard subscription for this component's discovery topics.
    pub fn discovery_filter(&self, prefix: &str) -> String {
        format!("{}/{}/+/+/config", prefix, self.as_str())
    }
}

/// One discovered entity.
#[derive(Debug, Clone)]
pub struct DiscoveredEntity {
    pub component: Component,
    pub node_id: String,
    pub object_id: String,
    pub message: DiscoveryMessage,
}

impl DiscoveredEntity {
    /// Parse a discovery message. Returns `Ok(None)` for topics that are not
    /// discovery topics, unsupported components and removals (empty payload).
    pub fn parse(
        topic: &str,
        payload: &[u8],
        prefix: &str,
    ) -> Result<Option<Self>, serde_json::Error> {
        let Some((component, node_id, object_id)) = parse_discovery_topic(topic, prefix) else {
            return Ok(None);
        };
        let Some(component) = Component::parse(&component) else {
            return Ok(None);
        };
        if payload.is_empty() {
            return Ok(None);
        }

        let message = serde_json::from_slice(payload)?;
        Ok(Some(Self {
            component,
            node_id,
            object_id,
            message,
        }))
    }

    /// Name of the physical device this entity belongs to.
    pub fn device_name(&self) -> Option<&str> {
        self.message.device.as_ref().map(|d| d.name.as_str())
    }

    pub fn device_class(&self) -> Option<&str> {
        self.message.device_class.as_deref()
    }

    pub fn unique_id(&self) -> String {
        self.message
            .unique_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.node_id, self.object_id))
    }

    /// JSON key carrying this entity's value in state payloads. Falls back to
    /// the object id, which Zigbee2MQTT names after the exposed property.
    pub fn value_key(&self) -> String {
        self.message
            .value_template
            .as_deref()
            .and_then(parse_value_template_key)
            .unwrap_or(&self.object_id)
            .to_string()
    }
}

/// Parse a discovery topic to extract component type, node_id, and object_id
///
/// Topic format: {prefix}/{component}/{node_id}/{object_id}/config
/// Example: homeassistant/light/0x00124b001234abcd/light/config
pub fn parse_discovery_topic(topic: &str, prefix: &str) -> Option<(String, String, String)> {
    let without_prefix = topic.strip_prefix(prefix)?.strip_prefix('/')?;

    let parts: Vec<&str> = without_prefix.split('/').collect();

    if parts.len() < 4 || parts.last() != Some(&"config") {
        return None;
    }

    Some((
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
    ))
}

/// Extract the JSON key name from a Zigbee2MQTT value template.
///
/// Parses templates like `{{ value_json.occupancy }}` and returns `"occupancy"`.
pub fn parse_value_template_key(template: &str) -> Option<&str> {
    let inner = template
        .trim()
        .strip_prefix("{{")?
        .strip_suffix("}}")?
        .trim();
    inner.strip_prefix("value_json.")
}
