/// Inbound events from the device gateway's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Motion sensor reading changed (already gated on reading validity).
    MotionChanged { active: bool },

    /// New ambient light reading.
    LightLevelChanged { level: u32 },

    /// Battery level of the motion sensor changed, in percent.
    DevicePowerChanged { battery: u8 },

    /// Anything else the gateway saw; ignored.
    Unrecognized { source: String },
}
