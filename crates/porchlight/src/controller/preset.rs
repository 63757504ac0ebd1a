use serde::Serialize;
use strum::Display;

/// Name of one of the predefined light presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PresetName {
    Off,
    Night,
    Bright,
    DaytimeMotion,
}

/// CIE 1931 chromaticity coordinates, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorXy {
    pub x: f64,
    pub y: f64,
}

/// Target configuration for every light in the controlled group.
///
/// Presets are applied whole: all lights in one resolution cycle receive the
/// same value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightPreset {
    pub name: PresetName,

    /// Whether the light is on or off.
    pub on: bool,

    /// Color, if the preset sets one.
    pub color_xy: Option<ColorXy>,

    /// Brightness in percent (0-100).
    pub brightness: Option<u8>,

    /// Color temperature in mired.
    pub color_temp: Option<u16>,
}

impl LightPreset {
    /// Light completely off.
    pub const OFF: LightPreset = LightPreset {
        name: PresetName::Off,
        on: false,
        color_xy: None,
        brightness: None,
        color_temp: None,
    };

    /// Dim light, reddish-yellow color, warm color temperature.
    pub const NIGHT: LightPreset = LightPreset {
        name: PresetName::Night,
        on: true,
        color_xy: Some(ColorXy { x: 0.5, y: 0.45 }),
        brightness: Some(75),
        color_temp: Some(500),
    };

    /// Bright light, neutral color, cold color temperature. Used for motion at
    /// night.
    pub const BRIGHT: LightPreset = LightPreset {
        name: PresetName::Bright,
        on: true,
        color_xy: Some(ColorXy { x: 0.35, y: 0.4 }),
        brightness: Some(100),
        color_temp: Some(153),
    };

    /// Used for motion during the day. The light stays off; the color fields
    /// only matter to gateways that stage attributes on off lights.
    pub const DAYTIME_MOTION: LightPreset = LightPreset {
        name: PresetName::DaytimeMotion,
        on: false,
        color_xy: Some(ColorXy { x: 0.7, y: 0.25 }),
        brightness: Some(50),
        color_temp: Some(153),
    };

    pub fn by_name(name: PresetName) -> LightPreset {
        match name {
            PresetName::Off => Self::OFF,
            PresetName::Night => Self::NIGHT,
            PresetName::Bright => Self::BRIGHT,
            PresetName::DaytimeMotion => Self::DAYTIME_MOTION,
        }
    }
}

impl Default for LightPreset {
    fn default() -> Self {
        Self::OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_off() {
        assert_eq!(LightPreset::default(), LightPreset::OFF);
        assert!(!LightPreset::default().on);
    }

    #[test]
    fn test_by_name_round_trips_constants() {
        for preset in [
            LightPreset::OFF,
            LightPreset::NIGHT,
            LightPreset::BRIGHT,
            LightPreset::DAYTIME_MOTION,
        ] {
            assert_eq!(LightPreset::by_name(preset.name), preset);
        }
    }

    #[test]
    fn test_preset_name_display() {
        assert_eq!(PresetName::Off.to_string(), "off");
        assert_eq!(PresetName::DaytimeMotion.to_string(), "daytime-motion");
    }

    #[test]
    fn test_preset_values_in_range() {
        for preset in [LightPreset::NIGHT, LightPreset::BRIGHT, LightPreset::DAYTIME_MOTION] {
            let xy = preset.color_xy.unwrap();
            assert!((0.0..=1.0).contains(&xy.x));
            assert!((0.0..=1.0).contains(&xy.y));
            assert!(preset.brightness.unwrap() <= 100);
        }
    }
}
