use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::MqttConfig;
use super::binding::BindingResolver;
use super::client::MessageReceiver;
use super::client::MqttClient;
use super::discovery::Component;
use super::discovery::DiscoveredEntity;
use super::light::LightEndpoint;
use super::sensor::SensorTracker;
use crate::config::DevicesConfig;
use crate::controller::EventSender;
use crate::controller::LightPreset;
use crate::gateway::BindingError;
use crate::gateway::DeviceBinding;
use crate::gateway::DeviceGateway;
use crate::gateway::GatewayError;
use crate::gateway::LightId;

/// Device gateway for Zigbee2MQTT over MQTT.
///
/// Devices are bound once at startup from Home Assistant discovery messages.
/// After that a background task turns sensor state messages into controller
/// events, and `apply` publishes light commands.
pub struct MqttGateway<C: MqttClient> {
    client: C,
    lights: HashMap<LightId, LightEndpoint>,
    transition: f64,
    apply_timeout: Duration,
}

impl<C: MqttClient + 'static> MqttGateway<C> {
    /// Connect, bind the configured devices and start forwarding sensor
    /// events to `events`.
    ///
    /// Returns the gateway, the resolved binding and the handle of the
    /// forwarding task.
    pub async fn start(
        mut client: C,
        config: &MqttConfig,
        devices: &DevicesConfig,
        events: EventSender,
    ) -> Result<(Self, DeviceBinding, JoinHandle<()>), BindingError> {
        info!(
            "Connecting to MQTT broker at {}:{}",
            config.broker, config.port
        );
        let mut inbound = client.connect().await?;
        info!("Connected to MQTT broker");

        for component in Component::ALL {
            let filter = component.discovery_filter(&config.discovery_prefix);
            debug!("Subscribing to {}", filter);
            client
                .subscribe(&filter)
                .await
                .map_err(|e| BindingError::Connect(e.to_string()))?;
        }

        let mut resolver = BindingResolver::new(devices);
        // Saturates for very long windows.
        let window = tokio::time::sleep(config.discovery_timeout());
        tokio::pin!(window);
        while !resolver.is_complete() {
            let msg = tokio::select! {
                msg = inbound.recv() => msg,
                () = &mut window => {
                    debug!(
                        "Discovery window of {:?} elapsed",
                        config.discovery_timeout()
                    );
                    break;
                }
            };
            let Some(msg) = msg else {
                return Err(BindingError::Connect(
                    "connection closed during discovery".to_string(),
                ));
            };
            match DiscoveredEntity::parse(&msg.topic, &msg.payload, &config.discovery_prefix) {
                Ok(Some(entity)) => resolver.observe(&entity),
                Ok(None) => {}
                Err(e) => warn!("Malformed discovery message on {}: {}", msg.topic, e),
            }
        }

        let resolved = resolver.resolve()?;

        for topic in resolved.sensors.topics() {
            debug!("Subscribing to {}", topic);
            client
                .subscribe(&topic)
                .await
                .map_err(|e| BindingError::Connect(e.to_string()))?;
        }

        info!(
            "Bound motion sensor {} and {} light(s)",
            resolved.binding.motion_device,
            resolved.binding.lights.len()
        );

        let task = tokio::spawn(Self::forward_events(
            inbound,
            resolved.sensors,
            events,
            config.discovery_prefix.clone(),
        ));

        let gateway = Self {
            client,
            lights: resolved.lights,
            transition: config.transition_secs,
            apply_timeout: config.apply_timeout(),
        };
        Ok((gateway, resolved.binding, task))
    }

    /// Translate sensor state messages until the connection or the
    /// controller goes away.
    async fn forward_events(
        mut inbound: MessageReceiver,
        mut sensors: SensorTracker,
        events: EventSender,
        discovery_prefix: String,
    ) {
        let discovery_topics = format!("{discovery_prefix}/");
        while let Some(msg) = inbound.recv().await {
            // Retained discovery messages keep arriving; binding is fixed
            if msg.topic.starts_with(&discovery_topics) {
                continue;
            }

            for event in sensors.observe(&msg.topic, &msg.payload) {
                debug!(
                    "Event from {}{}: {:?}",
                    msg.topic,
                    if msg.retain { " (retained)" } else { "" },
                    event
                );
                if events.send(event).await.is_err() {
                    info!("Controller stopped, no longer forwarding MQTT events");
                    return;
                }
            }
        }
        warn!("MQTT message stream ended");
    }
}

#[async_trait]
impl<C: MqttClient + 'static> DeviceGateway for MqttGateway<C> {
    async fn apply(&self, light: &LightId, preset: &LightPreset) -> Result<(), GatewayError> {
        let endpoint = self
            .lights
            .get(light)
            .ok_or_else(|| GatewayError::UnknownLight(light.clone()))?;

        let payload = endpoint.command_payload(preset, self.transition)?;

        tokio::time::timeout(
            self.apply_timeout,
            self.client
                .publish(&endpoint.command_topic, &payload, false),
        )
        .await
        .map_err(|_| GatewayError::Timeout(self.apply_timeout))??;

        debug!("Sent {} to light {}", preset.name, light);
        Ok(())
    }
}
