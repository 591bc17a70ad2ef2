//! Transports that connect a light synchronizer to the outside world.

pub mod mqtt;

pub use mqtt::{LightBridge, LightHandle};
