use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::MqttConfig;
use crate::gateway::BindingError;
use crate::gateway::GatewayError;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

pub type MessageReceiver = mpsc::UnboundedReceiver<MqttMessage>;

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker and hand back the stream of messages for
    /// every subscription made afterwards. Called once.
    async fn connect(&mut self) -> Result<MessageReceiver, BindingError>;

    /// Subscribe to an MQTT topic
    async fn subscribe(&self, topic: &str) -> Result<(), GatewayError>;

    /// Publish a message to an MQTT topic
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool)
    -> Result<(), GatewayError>;
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        // Discovery payloads can be large
        mqtt_options.set_max_packet_size(2 * 1024 * 1024, 2 * 1024 * 1024);

        // The broker keeps our subscriptions across reconnects
        mqtt_options.set_clean_session(false);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            event_loop_task: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, GatewayError> {
        self.client.as_ref().ok_or(GatewayError::NotConnected)
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<MessageReceiver, BindingError> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = oneshot::channel::<Result<(), String>>();

        let task = tokio::spawn(async move {
            let mut connected_tx = Some(connected_tx);
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                            retain: publish.retain,
                        };

                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        if let Some(tx) = connected_tx.take() {
                            let _ = tx.send(Ok(()));
                        } else {
                            info!("Reconnected to MQTT broker");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if let Some(tx) = connected_tx.take() {
                            let _ = tx.send(Err(e.to_string()));
                        }
                        warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("MQTT event loop task exiting");
        });
        self.event_loop_task = Some(task);

        match connected_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(BindingError::Connect(e)),
            Err(_) => {
                return Err(BindingError::Connect(
                    "MQTT event loop exited before connecting".to_string(),
                ));
            }
        }

        self.client = Some(client);
        Ok(message_rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), GatewayError> {
        self.client()?
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| GatewayError::Publish(e.to_string()))
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), GatewayError> {
        self.client()?
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| GatewayError::Publish(e.to_string()))
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}

/// Mock MQTT client for testing
///
/// Messages queued with `inject` are delivered once `connect` is called.
#[cfg(test)]
#[derive(Debug)]
pub struct MockMqttClient {
    inbound_tx: mpsc::UnboundedSender<MqttMessage>,
    inbound_rx: Option<MessageReceiver>,
    pub subscriptions: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    pub published: std::sync::Arc<std::sync::Mutex<Vec<(String, Vec<u8>, bool)>>>,
    pub refuse_connection: bool,
    pub stall_publish: bool,
}

#[cfg(test)]
impl MockMqttClient {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            subscriptions: Default::default(),
            published: Default::default(),
            refuse_connection: false,
            stall_publish: false,
        }
    }

    /// Handle for delivering messages after the client has been moved.
    pub fn sender(&self) -> mpsc::UnboundedSender<MqttMessage> {
        self.inbound_tx.clone()
    }

    pub fn inject(&self, topic: &str, payload: &str) {
        let _ = self.inbound_tx.send(MqttMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            retain: true,
        });
    }
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<MessageReceiver, BindingError> {
        if self.refuse_connection {
            return Err(BindingError::Connect("connection refused".to_string()));
        }
        self.inbound_rx
            .take()
            .ok_or_else(|| BindingError::Connect("already connected".to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), GatewayError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), GatewayError> {
        if self.stall_publish {
            std::future::pending::<()>().await;
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }
}
