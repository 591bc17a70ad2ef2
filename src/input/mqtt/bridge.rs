//! Runs one light synchronizer against a live MQTT broker.
//!
//! The bridge owns the synchronizer inside a single task: broker messages
//! and light requests are handled one at a time, and the publish actions of
//! a request are sent in the order the synchronizer produced them. Other
//! tasks talk to the light through a [`LightHandle`].

use super::client::{self, MqttClient, MqttEvent, MqttMessage};
use crate::config::MqttConfig;
use crate::error::{BridgeError, Result};
use crate::light::{LightRequest, LightState, LightSynchronizer, PublishAction};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use rumqttc::{AsyncClient, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloneable handle for commanding a running light and reading its state.
#[derive(Clone)]
pub struct LightHandle {
    commands: mpsc::Sender<LightRequest>,
    state: Arc<RwLock<LightState>>,
}

impl LightHandle {
    /// Queue a request for the bridge task.
    pub async fn send(&self, request: LightRequest) -> Result<()> {
        self.commands
            .send(request)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.send(LightRequest::turn_on()).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.send(LightRequest::turn_off()).await
    }

    /// Latest known state snapshot.
    pub fn state(&self) -> LightState {
        self.state.read().clone()
    }
}

/// Synchronizer plus the shared snapshot it keeps current.
struct Session {
    synchronizer: LightSynchronizer,
    snapshot: Arc<RwLock<LightState>>,
}

impl Session {
    /// Feed a broker message to the synchronizer. Returns true when the
    /// message belonged to this light and was applied.
    fn handle_message(&mut self, msg: &MqttMessage) -> bool {
        let applied = match self.synchronizer.on_message(&msg.topic, &msg.payload) {
            None => {
                debug!("[Light] Ignoring message on unrelated topic {}", msg.topic);
                false
            }
            Some(Err(e)) => {
                warn!("[Light] Dropped message on {}: {}", msg.topic, e);
                false
            }
            Some(Ok(())) => true,
        };
        self.refresh();
        applied
    }

    /// Apply an event from the MQTT loop. Returns the topics to subscribe to
    /// when the broker connection was (re)established.
    fn handle_event(&mut self, event: MqttEvent) -> Option<Vec<(String, QoS)>> {
        match event {
            MqttEvent::Connected => Some(self.synchronizer.subscriptions()),
            MqttEvent::Message(msg) => {
                self.handle_message(&msg);
                None
            }
        }
    }

    /// Turn a request into publish actions. Rejected requests are logged and
    /// produce nothing.
    fn handle_request(&mut self, request: LightRequest) -> Vec<PublishAction> {
        match self.synchronizer.set(request) {
            Ok(actions) => {
                self.refresh();
                actions
            }
            Err(e) => {
                warn!("[Light] Rejected request: {}", e);
                Vec::new()
            }
        }
    }

    fn refresh(&self) {
        *self.snapshot.write() = self.synchronizer.state().clone();
    }
}

async fn subscribe_all(client: &AsyncClient, topics: Vec<(String, QoS)>) {
    for (topic, qos) in topics {
        if let Err(e) = client::subscribe(client, &topic, qos).await {
            warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e);
        }
    }
}

/// MQTT runtime for a single light.
pub struct LightBridge {
    config: MqttConfig,
    session: Session,
    commands_tx: mpsc::Sender<LightRequest>,
    commands_rx: mpsc::Receiver<LightRequest>,
}

impl LightBridge {
    pub fn new(config: MqttConfig, synchronizer: LightSynchronizer) -> Self {
        let snapshot = Arc::new(RwLock::new(synchronizer.state().clone()));
        let (commands_tx, commands_rx) = mpsc::channel(32);
        Self {
            config,
            session: Session {
                synchronizer,
                snapshot,
            },
            commands_tx,
            commands_rx,
        }
    }

    pub fn handle(&self) -> LightHandle {
        LightHandle {
            commands: self.commands_tx.clone(),
            state: self.session.snapshot.clone(),
        }
    }

    /// Start the bridge.
    ///
    /// Spawns a background task that connects to the broker, subscribes to
    /// the light's state and availability topics, then serves messages and
    /// requests until every [`LightHandle`] is dropped.
    pub fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> Result<()> {
        let Self {
            config,
            mut session,
            commands_tx,
            mut commands_rx,
        } = self;
        drop(commands_tx);

        let name = session.synchronizer.capabilities().name.clone();
        let broker = format!("{}:{}", config.broker_host, config.broker_port);
        info!("[MQTT] Connecting to {} for light '{}'", broker, name);

        let mqtt_client = MqttClient::new(&config);
        let client = mqtt_client.client();

        let (events_tx, mut events_rx) = mpsc::channel::<MqttEvent>(64);

        // Event loop must run before the connection can be established
        let mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(events_tx).await;
        });

        let first_connect = tokio::time::timeout(CONNECT_TIMEOUT, async {
            while let Some(event) = events_rx.recv().await {
                if event == MqttEvent::Connected {
                    return true;
                }
            }
            false
        })
        .await;
        match first_connect {
            Ok(true) => info!("[MQTT] Connection established, subscribing to topics"),
            Ok(false) => {
                mqtt_loop.abort();
                return Err(BridgeError::ChannelClosed);
            }
            Err(_) => {
                warn!("[MQTT] Connection timeout after {:?}", CONNECT_TIMEOUT);
                mqtt_loop.abort();
                return Err(BridgeError::ConnectionTimeout(broker));
            }
        }
        subscribe_all(&client, session.synchronizer.subscriptions()).await;

        info!("[Light] '{}' started", name);

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => {
                        if let Some(topics) = session.handle_event(event) {
                            info!("[MQTT] Reconnected, restoring subscriptions");
                            subscribe_all(&client, topics).await;
                        }
                    }
                    None => {
                        warn!("[MQTT] Event loop stopped");
                        break;
                    }
                },
                request = commands_rx.recv() => match request {
                    Some(request) => {
                        for action in session.handle_request(request) {
                            if let Err(e) = client::publish(&client, &action).await {
                                warn!("[MQTT] Failed to publish to {}: {:?}", action.topic, e);
                            }
                        }
                    }
                    None => {
                        info!("[Light] All handles dropped, stopping '{}'", name);
                        break;
                    }
                },
            }
        }

        mqtt_loop.abort();
        Ok(())
    }
}
