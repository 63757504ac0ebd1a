mod binding;
mod client;
mod config;
mod discovery;
mod light;
#[allow(clippy::module_inception)]
mod mqtt;
mod sensor;

pub use client::MqttClient;
pub use client::RumqttcClient;
pub use config::Config as MqttConfig;
pub use mqtt::MqttGateway;
