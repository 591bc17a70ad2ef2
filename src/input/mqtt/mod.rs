//! MQTT transport for the light synchronizer.

mod bridge;
mod client;

pub use bridge::{LightBridge, LightHandle};
pub use client::{MqttClient, MqttEvent, MqttMessage};
