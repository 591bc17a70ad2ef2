//! MQTT light model: channels, state, wire payloads and the synchronizer
//! that ties them together.

mod capabilities;
mod channel;
pub mod payload;
mod state;
mod synchronizer;

pub use capabilities::{ChannelTopics, LightCapabilities};
pub use channel::{Channel, OnCommandType};
pub use state::{LightColor, LightRequest, LightState, Power};
pub use synchronizer::{DEFAULT_COLOR_TEMP, DEFAULT_EFFECT, LightSynchronizer, PublishAction};
