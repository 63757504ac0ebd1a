use super::preset::LightPreset;

/// Decide the light state for the whole group.
///
/// `motion` is "motion active or recently active". With no motion the
/// sun-driven `default_state` wins; otherwise daylight picks the
/// daytime-motion preset and darkness the bright one.
pub fn resolve(motion: bool, is_daytime: bool, default_state: LightPreset) -> LightPreset {
    if !motion {
        default_state
    } else if is_daytime {
        LightPreset::DAYTIME_MOTION
    } else {
        LightPreset::BRIGHT
    }
}
