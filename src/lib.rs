//! MQTT light state synchronizer.
//!
//! Mirrors a light that is spread over several MQTT topics (power,
//! brightness, color in RGB/HS/XY, color temperature, white value, effect)
//! into one coherent [`light::LightState`], and turns partial state requests
//! into the ordered command messages the light expects.

pub mod color;
pub mod config;
pub mod error;
pub mod input;
pub mod light;
pub mod template;
