use crate::light::Channel;
use thiserror::Error as ThisError;

/// Errors surfaced by the light synchronizer.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum LightError {
    /// The light could not be created from its configuration.
    #[error("Invalid light configuration: {0}")]
    Config(String),

    /// An inbound payload was dropped without touching state.
    #[error("Failed to decode {channel} payload: {reason}")]
    Decode { channel: Channel, reason: String },

    /// An availability payload matched neither configured payload.
    #[error("Unrecognized availability payload: {0}")]
    Availability(String),

    /// A command was rejected before any publish action was generated.
    #[error("Invalid light command: {0}")]
    Validation(String),
}

impl LightError {
    pub(crate) fn decode(channel: Channel, reason: impl Into<String>) -> Self {
        LightError::Decode {
            channel,
            reason: reason.into(),
        }
    }
}

/// Errors from the MQTT runtime around the synchronizer.
#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Light(#[from] LightError),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Timed out connecting to MQTT broker {0}")]
    ConnectionTimeout(String),

    #[error("Bridge channel closed")]
    ChannelClosed,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
