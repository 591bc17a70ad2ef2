//! MQTT client wrapper used by the light bridge.

use crate::config::MqttConfig;
use crate::light::PublishAction;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;

/// Message received from MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

/// What the event loop reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent {
    /// A ConnAck arrived. Sent on the first connection and on every
    /// reconnect; subscriptions of a clean session are gone at that point.
    Connected,
    Message(MqttMessage),
}

impl MqttEvent {
    /// Translate a raw rumqttc event. Returns `None` for events the bridge
    /// does not care about.
    fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => Some(MqttEvent::Connected),
            Event::Incoming(Packet::Publish(publish)) => {
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => Some(MqttEvent::Message(MqttMessage {
                        topic: publish.topic,
                        payload,
                    })),
                    Err(e) => {
                        warn!("[MQTT] Invalid UTF-8 payload on {}: {}", publish.topic, e);
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

/// MQTT client for a light's command and state topics.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        // Set credentials if provided
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self { client, event_loop }
    }

    /// Run the MQTT event loop and forward connections and messages to the
    /// provided channel.
    ///
    /// Connection errors are retried every 5 seconds; the loop ends when the
    /// receiver is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<MqttEvent>) {
        info!("[MQTT] Starting event loop");

        loop {
            match self.event_loop.poll().await {
                Ok(event) => {
                    let Some(event) = MqttEvent::from_event(event) else {
                        continue;
                    };
                    match &event {
                        MqttEvent::Connected => info!("[MQTT] Connected to broker"),
                        MqttEvent::Message(msg) => {
                            debug!("[MQTT] Received on {}: {}", msg.topic, msg.payload)
                        }
                    }
                    if tx.send(event).await.is_err() {
                        error!("[MQTT] Event channel closed");
                        break;
                    }
                }
                Err(e) => {
                    error!("[MQTT] Connection error: {:?}", e);
                    // Wait before reconnecting
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}

/// Subscribe to a topic.
pub async fn subscribe(client: &AsyncClient, topic: &str, qos: QoS) -> Result<(), rumqttc::ClientError> {
    info!("[MQTT] Subscribing to {}", topic);
    client.subscribe(topic, qos).await
}

/// Publish a synchronizer action.
pub async fn publish(client: &AsyncClient, action: &PublishAction) -> Result<(), rumqttc::ClientError> {
    debug!("[MQTT] Publishing to {}: {}", action.topic, action.payload);
    client
        .publish(
            &action.topic,
            action.qos,
            action.retain,
            action.payload.as_bytes().to_vec(),
        )
        .await
}
