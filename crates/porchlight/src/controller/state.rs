use std::time::Duration;

use serde::Serialize;

use super::debouncer::MotionDebouncer;
use super::preset::LightPreset;
use super::preset::PresetName;
use crate::schedule::SunPhase;

/// All mutable controller state. Only touched while holding the controller
/// gate.
#[derive(Debug)]
pub struct ControllerState {
    /// Motion reading, "recently active" flag and the debounce timer
    pub motion: MotionDebouncer,

    /// Light state used when there is no recent motion. Written only by the
    /// sun-phase loop.
    pub default_state: LightPreset,

    /// Last phase classified by the sun-phase loop
    pub sun_phase: Option<SunPhase>,

    /// Last ambient light reading. Informational only.
    pub light_level: Option<u32>,

    /// Preset pushed to the lights by the last resolution cycle
    pub last_applied: Option<PresetName>,
}

impl ControllerState {
    pub fn new(motion_timeout: Duration) -> Self {
        Self {
            motion: MotionDebouncer::new(motion_timeout),
            default_state: LightPreset::OFF,
            sun_phase: None,
            light_level: None,
            last_applied: None,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            motion_active: self.motion.motion_active(),
            recently_active: self.motion.recently_active(),
            timeout_pending: self.motion.is_pending(),
            default_state: self.default_state.name,
            sun_phase: self.sun_phase,
            light_level: self.light_level,
            last_applied: self.last_applied,
        }
    }
}

/// Point-in-time copy of `ControllerState`, safe to hand out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub motion_active: bool,
    pub recently_active: bool,
    pub timeout_pending: bool,
    pub default_state: PresetName,
    pub sun_phase: Option<SunPhase>,
    pub light_level: Option<u32>,
    pub last_applied: Option<PresetName>,
}
