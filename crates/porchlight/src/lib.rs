pub mod alert;
pub mod api;
pub mod config;
pub mod controller;
pub mod gateway;
pub mod integrations;
pub mod schedule;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use controller::Controller;
pub use controller::Event;
pub use controller::LightPreset;
pub use controller::PresetName;
pub use controller::StateSnapshot;
pub use controller::SunPhaseLoop;
pub use gateway::DeviceBinding;
pub use gateway::DeviceGateway;
pub use schedule::Schedule;
pub use schedule::SunPhase;
