//! Keeps one light's state in step with its MQTT topics.
//!
//! Inbound: every state-topic payload updates exactly one field of
//! [`LightState`]. Outbound: [`LightSynchronizer::set`] turns a partial
//! request into the ordered publish actions for the configured command
//! topics and applies optimistic updates for channels nobody reports on.
//! The synchronizer never talks to the broker itself.

use super::capabilities::{ChannelTopics, LightCapabilities};
use super::channel::{Channel, OnCommandType};
use super::payload;
use super::state::{LightRequest, LightState};
use crate::color::{self, Rgb};
use crate::config::LightConfig;
use crate::error::LightError;
use crate::template::{TemplateEngine, ValueTemplate};
use log::{debug, info, warn};
use rumqttc::QoS;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default color temperature of a light that has not reported one.
pub const DEFAULT_COLOR_TEMP: u16 = 150;

/// Default effect of a light that has not reported one.
pub const DEFAULT_EFFECT: &str = "none";

/// A message the transport should publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAction {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

/// State synchronizer for a single light.
pub struct LightSynchronizer {
    capabilities: LightCapabilities,
    state: LightState,
    templates: Arc<dyn TemplateEngine>,
    state_tx: Option<mpsc::UnboundedSender<LightState>>,
}

impl LightSynchronizer {
    /// Create a synchronizer for `config`.
    ///
    /// Fails with [`LightError::Config`] when the configuration has no
    /// command topic.
    pub fn new(config: &LightConfig) -> Result<Self, LightError> {
        let capabilities = LightCapabilities::from_config(config)?;
        let state = Self::initial_state(&capabilities);
        Ok(Self {
            capabilities,
            state,
            templates: Arc::new(ValueTemplate),
            state_tx: None,
        })
    }

    /// Use a different template engine for value and command templates.
    pub fn with_template_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.templates = engine;
        self
    }

    /// Set a channel to receive every state-changed notification.
    pub fn with_state_channel(mut self, tx: mpsc::UnboundedSender<LightState>) -> Self {
        self.state_tx = Some(tx);
        self
    }

    /// Seed optimistic channels from a previously known state. Reported
    /// channels keep their defaults until their topic delivers a value.
    pub fn with_restored_state(mut self, last: Option<LightState>) -> Self {
        let Some(last) = last else {
            return self;
        };
        let caps = &self.capabilities;

        if caps.is_optimistic(Channel::Power) {
            self.state.on = last.on;
        }
        if caps.is_optimistic(Channel::Brightness) && last.brightness.is_some() {
            self.state.brightness = last.brightness;
        }
        let color_reported = Channel::COLORS.iter().any(|c| caps.is_reported(*c));
        if caps.has_color() && !color_reported && last.color.is_some() {
            self.state.color = last.color;
        }
        if caps.is_optimistic(Channel::ColorTemp) && last.color_temp.is_some() {
            self.state.color_temp = last.color_temp;
        }
        if caps.is_optimistic(Channel::WhiteValue) && last.white_value.is_some() {
            self.state.white_value = last.white_value;
        }
        if caps.is_optimistic(Channel::Effect) && last.effect.is_some() {
            self.state.effect = last.effect;
        }

        debug!("[Light] {}: restored state {:?}", caps.name, self.state);
        self
    }

    fn initial_state(caps: &LightCapabilities) -> LightState {
        LightState {
            available: caps.availability_topic.is_none(),
            on: false,
            brightness: caps.has(Channel::Brightness).then_some(255),
            color: caps.has_color().then_some(Rgb::WHITE),
            color_temp: caps.has(Channel::ColorTemp).then_some(DEFAULT_COLOR_TEMP),
            white_value: caps.has(Channel::WhiteValue).then_some(255),
            effect: caps
                .has(Channel::Effect)
                .then(|| DEFAULT_EFFECT.to_string()),
            assumed: caps.is_optimistic(Channel::Power),
        }
    }

    pub fn state(&self) -> &LightState {
        &self.state
    }

    pub fn capabilities(&self) -> &LightCapabilities {
        &self.capabilities
    }

    /// Topics the transport must subscribe to for this light.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.capabilities
            .subscriptions()
            .into_iter()
            .map(|topic| (topic, self.capabilities.qos))
            .collect()
    }

    /// Route a raw broker message. Returns `None` when the topic does not
    /// belong to this light.
    pub fn on_message(&mut self, topic: &str, payload: &str) -> Option<Result<(), LightError>> {
        if self.capabilities.availability_topic.as_deref() == Some(topic) {
            return Some(self.on_availability_message(payload));
        }
        let channel = self.capabilities.channel_for_state_topic(topic)?;
        Some(self.on_topic_message(channel, payload))
    }

    /// Apply a payload received on `channel`'s state topic.
    ///
    /// On any extraction or parse failure the message is dropped, the state is
    /// left untouched and no notification is sent.
    pub fn on_topic_message(&mut self, channel: Channel, raw: &str) -> Result<(), LightError> {
        let topics = self
            .capabilities
            .channel(channel)
            .ok_or_else(|| LightError::decode(channel, "channel is not configured"))?;
        if topics.state_topic.is_none() {
            return Err(LightError::decode(channel, "channel has no state topic"));
        }

        let extracted = match &topics.value_template {
            Some(template) => self
                .templates
                .extract(template, raw)
                .map_err(|e| LightError::decode(channel, e.to_string()))?,
            None => raw.to_string(),
        };
        let decode = |reason: String| LightError::decode(channel, reason);

        match channel {
            Channel::Power => {
                if extracted == self.capabilities.payload_on {
                    self.state.on = true;
                } else if extracted == self.capabilities.payload_off {
                    self.state.on = false;
                } else {
                    return Err(decode(format!(
                        "`{extracted}` matches neither `{}` nor `{}`",
                        self.capabilities.payload_on, self.capabilities.payload_off
                    )));
                }
            }
            Channel::Brightness => {
                self.state.brightness =
                    Some(payload::parse_level(&extracted, topics.scale).map_err(decode)?);
            }
            Channel::Rgb => {
                let rgb = payload::parse_rgb(&extracted, topics.scale).map_err(decode)?;
                let (chroma, value) = color::normalize(rgb);
                self.state.color = Some(chroma);
                if !self.capabilities.is_reported(Channel::Brightness) {
                    self.state.brightness = Some(value);
                }
            }
            Channel::Hs => {
                let hs = payload::parse_hs(&extracted).map_err(decode)?;
                self.state.color = Some(color::hs_to_rgb(hs));
            }
            Channel::Xy => {
                let xy = payload::parse_xy(&extracted).map_err(decode)?;
                self.state.color = Some(color::normalize(color::xy_to_rgb(xy)).0);
            }
            Channel::ColorTemp => {
                self.state.color_temp = Some(payload::parse_mireds(&extracted).map_err(decode)?);
            }
            Channel::WhiteValue => {
                self.state.white_value =
                    Some(payload::parse_level(&extracted, topics.scale).map_err(decode)?);
            }
            Channel::Effect => {
                self.state.effect = Some(extracted);
            }
        }

        debug!(
            "[Light] {}: {} updated from topic: {:?}",
            self.capabilities.name, channel, self.state
        );
        self.notify();
        Ok(())
    }

    /// Apply a payload received on the availability topic.
    pub fn on_availability_message(&mut self, payload: &str) -> Result<(), LightError> {
        if payload == self.capabilities.payload_available {
            self.set_available(true);
            Ok(())
        } else if payload == self.capabilities.payload_not_available {
            self.set_available(false);
            Ok(())
        } else {
            Err(LightError::Availability(payload.to_string()))
        }
    }

    pub fn set_available(&mut self, available: bool) {
        if self.state.available != available {
            info!(
                "[Light] {} is now {}",
                self.capabilities.name,
                if available { "available" } else { "unavailable" }
            );
        }
        self.state.available = available;
        self.notify();
    }

    /// Translate a request into ordered publish actions.
    ///
    /// The request is validated first; a rejected request produces no
    /// actions and no state change.
    pub fn set(&mut self, request: LightRequest) -> Result<Vec<PublishAction>, LightError> {
        self.validate(&request)?;

        if request.is_off() {
            return Ok(self.turn_off());
        }

        let caps = &self.capabilities;
        let mut actions = Vec::new();
        let mut next = self.state.clone();
        let mut optimistic = false;

        let mut brightness = request.brightness;
        match caps.on_command_type {
            OnCommandType::First => actions.push(self.action(&caps.command_topic, &caps.payload_on)),
            OnCommandType::Brightness if brightness.is_none() => {
                brightness = Some(self.state.brightness.filter(|b| *b > 0).unwrap_or(255));
            }
            _ => {}
        }

        let requested = request.color.map(|color| {
            let (chroma, value) = color.chroma();
            (color, chroma, value)
        });

        // Without a brightness channel an RGB request carries its own level.
        if brightness.is_none() && !caps.has(Channel::Brightness) {
            brightness = requested.and_then(|(_, _, value)| value);
        }

        if let Some((color, chroma, _)) = requested {
            let mut color_optimistic = false;

            if let Some(topics) = caps.channel(Channel::Rgb) {
                let level = if caps.has(Channel::Brightness) {
                    255
                } else {
                    brightness.unwrap_or_else(|| self.stored_level())
                };
                let rendered = self.render_rgb(topics, color::dim(chroma, level))?;
                actions.push(self.action(&topics.command_topic, &rendered));
                color_optimistic |= caps.is_optimistic(Channel::Rgb);
            }
            if let Some(topics) = caps.channel(Channel::Hs) {
                let hs = payload::format_hs(color.to_hs(chroma));
                actions.push(self.action(&topics.command_topic, &hs));
                color_optimistic |= caps.is_optimistic(Channel::Hs);
            }
            if let Some(topics) = caps.channel(Channel::Xy) {
                let xy = payload::format_xy(color.to_xy(chroma));
                actions.push(self.action(&topics.command_topic, &xy));
                color_optimistic |= caps.is_optimistic(Channel::Xy);
            }

            if color_optimistic {
                next.color = Some(chroma);
                optimistic = true;
            }
        }

        if let Some(level) = brightness {
            if let Some(topics) = caps.channel(Channel::Brightness) {
                let scaled = payload::format_level(level, topics.scale);
                actions.push(self.action(&topics.command_topic, &scaled));
                if caps.is_optimistic(Channel::Brightness) {
                    next.brightness = Some(level);
                    optimistic = true;
                }
            } else if let Some(topics) = caps.channel(Channel::Rgb) {
                if requested.is_none() {
                    let chroma = self.state.color.unwrap_or(Rgb::WHITE);
                    let rendered = self.render_rgb(topics, color::dim(chroma, level))?;
                    actions.push(self.action(&topics.command_topic, &rendered));
                }
                if caps.is_optimistic(Channel::Rgb) {
                    next.brightness = Some(level);
                    optimistic = true;
                }
            }
        }

        if let (Some(mireds), Some(topics)) = (request.color_temp, caps.channel(Channel::ColorTemp)) {
            actions.push(self.action(&topics.command_topic, &mireds.to_string()));
            if caps.is_optimistic(Channel::ColorTemp) {
                next.color_temp = Some(mireds);
                optimistic = true;
            }
        }

        if let (Some(effect), Some(topics)) = (&request.effect, caps.channel(Channel::Effect)) {
            actions.push(self.action(&topics.command_topic, effect));
            if caps.is_optimistic(Channel::Effect) {
                next.effect = Some(effect.clone());
                optimistic = true;
            }
        }

        if let (Some(white), Some(topics)) = (request.white_value, caps.channel(Channel::WhiteValue)) {
            let scaled = payload::format_level(white, topics.scale);
            actions.push(self.action(&topics.command_topic, &scaled));
            if caps.is_optimistic(Channel::WhiteValue) {
                next.white_value = Some(white);
                optimistic = true;
            }
        }

        if caps.on_command_type == OnCommandType::Last {
            actions.push(self.action(&caps.command_topic, &caps.payload_on));
        }

        if caps.is_optimistic(Channel::Power) {
            next.on = true;
            optimistic = true;
        }

        debug!(
            "[Light] {}: publishing {} command(s)",
            caps.name,
            actions.len()
        );

        if optimistic {
            next.assumed = true;
            self.state = next;
            self.notify();
        }

        Ok(actions)
    }

    fn turn_off(&mut self) -> Vec<PublishAction> {
        let caps = &self.capabilities;
        let actions = vec![self.action(&caps.command_topic, &caps.payload_off)];

        if caps.is_optimistic(Channel::Power) {
            self.state.on = false;
            self.state.assumed = true;
            self.notify();
        }

        actions
    }

    fn validate(&self, request: &LightRequest) -> Result<(), LightError> {
        let caps = &self.capabilities;
        let unsupported =
            |feature: &str| LightError::Validation(format!("{} does not support {feature}", caps.name));

        if request.brightness.is_some() && !caps.supports_brightness() {
            return Err(unsupported("brightness"));
        }
        if request.color.is_some() && !caps.has_color() {
            return Err(unsupported("color"));
        }
        if request.color_temp.is_some() && !caps.has(Channel::ColorTemp) {
            return Err(unsupported("color temperature"));
        }
        if request.white_value.is_some() && !caps.has(Channel::WhiteValue) {
            return Err(unsupported("white value"));
        }
        if let Some(effect) = &request.effect {
            if !caps.has(Channel::Effect) {
                return Err(unsupported("effects"));
            }
            if !caps.effect_list.contains(effect) {
                return Err(LightError::Validation(format!(
                    "effect `{effect}` is not in the effect list of {}",
                    caps.name
                )));
            }
        }
        Ok(())
    }

    // Level used to dim the RGB payload when no explicit brightness is given.
    fn stored_level(&self) -> u8 {
        self.state.brightness.filter(|b| *b > 0).unwrap_or(255)
    }

    fn render_rgb(&self, topics: &ChannelTopics, rgb: Rgb) -> Result<String, LightError> {
        let Some(template) = &topics.command_template else {
            return Ok(payload::format_rgb(rgb, topics.scale));
        };

        let scale = |c: u8| Value::from(color::scale_value(f64::from(c), 255, topics.scale));
        let mut context = Map::new();
        context.insert("red".to_string(), scale(rgb.r));
        context.insert("green".to_string(), scale(rgb.g));
        context.insert("blue".to_string(), scale(rgb.b));

        self.templates
            .render(template, &context)
            .map_err(|e| LightError::Validation(format!("rgb_command_template: {e}")))
    }

    fn action(&self, topic: &str, payload: &str) -> PublishAction {
        PublishAction {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos: self.capabilities.qos,
            retain: false,
        }
    }

    fn notify(&mut self) {
        if let Some(tx) = &self.state_tx
            && tx.send(self.state.clone()).is_err()
        {
            warn!(
                "[Light] {}: state channel closed, dropping notifications",
                self.capabilities.name
            );
            self.state_tx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Hs;
    use crate::light::Power;

    fn s(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn publish(topic: &str, payload: &str) -> PublishAction {
        PublishAction {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    /// Every channel with a state topic.
    fn reported_light() -> LightConfig {
        LightConfig {
            state_topic: s("test_light_rgb/status"),
            brightness_command_topic: s("test_light_rgb/brightness/set"),
            brightness_state_topic: s("test_light_rgb/brightness/status"),
            rgb_command_topic: s("test_light_rgb/rgb/set"),
            rgb_state_topic: s("test_light_rgb/rgb/status"),
            hs_command_topic: s("test_light_rgb/hs/set"),
            hs_state_topic: s("test_light_rgb/hs/status"),
            xy_command_topic: s("test_light_rgb/xy/set"),
            xy_state_topic: s("test_light_rgb/xy/status"),
            color_temp_command_topic: s("test_light_rgb/color_temp/set"),
            color_temp_state_topic: s("test_light_rgb/color_temp/status"),
            white_value_command_topic: s("test_light_rgb/white_value/set"),
            white_value_state_topic: s("test_light_rgb/white_value/status"),
            effect_command_topic: s("test_light_rgb/effect/set"),
            effect_state_topic: s("test_light_rgb/effect/status"),
            effect_list: vec!["colorloop".to_string(), "random".to_string()],
            ..LightConfig::new("test_light_rgb/set")
        }
    }

    fn optimistic_brightness_light(on_command_type: OnCommandType) -> LightConfig {
        LightConfig {
            brightness_command_topic: s("test_light/bright"),
            rgb_command_topic: s("test_light/rgb"),
            on_command_type,
            ..LightConfig::new("test_light/set")
        }
    }

    fn rgb_only_light() -> LightConfig {
        LightConfig {
            rgb_command_topic: s("test_light/rgb"),
            ..LightConfig::new("test_light/set")
        }
    }

    #[test]
    fn test_new_requires_command_topic() {
        let result = LightSynchronizer::new(&LightConfig::default());
        assert!(matches!(result, Err(LightError::Config(_))));
    }

    #[test]
    fn test_initial_state() {
        let sync = LightSynchronizer::new(&reported_light()).unwrap();
        let state = sync.state();
        assert_eq!(state.power(), Power::Off);
        assert_eq!(state.brightness, Some(255));
        assert_eq!(state.color, Some(Rgb::WHITE));
        assert_eq!(state.color_temp, Some(150));
        assert_eq!(state.white_value, Some(255));
        assert_eq!(state.effect.as_deref(), Some("none"));
        assert!(!state.assumed);

        let sync = LightSynchronizer::new(&LightConfig::new("test_light/set")).unwrap();
        let state = sync.state();
        assert_eq!(state.brightness, None);
        assert_eq!(state.color, None);
        assert_eq!(state.effect, None);
        assert!(state.assumed);
    }

    #[test]
    fn test_state_topics_update_fields() {
        let mut sync = LightSynchronizer::new(&reported_light()).unwrap();

        sync.on_topic_message(Channel::Power, "ON").unwrap();
        sync.on_topic_message(Channel::Brightness, "100").unwrap();
        sync.on_topic_message(Channel::ColorTemp, "300").unwrap();
        sync.on_topic_message(Channel::Effect, "rainbow").unwrap();
        sync.on_topic_message(Channel::WhiteValue, "100").unwrap();
        sync.on_topic_message(Channel::Rgb, "125,125,125").unwrap();

        let state = sync.state();
        assert!(state.is_on());
        assert_eq!(state.brightness, Some(100));
        assert_eq!(state.color, Some(Rgb::WHITE));
        assert_eq!(state.color_temp, Some(300));
        assert_eq!(state.effect.as_deref(), Some("rainbow"));
        assert_eq!(state.white_value, Some(100));

        sync.on_topic_message(Channel::Hs, "200,50").unwrap();
        let hs = sync.state().hs_color().unwrap();
        assert!((hs.hue - 200.0).abs() < 1.0, "hue {}", hs.hue);
        assert!((hs.saturation - 50.0).abs() < 1.0, "saturation {}", hs.saturation);

        sync.on_topic_message(Channel::Xy, "0.675,0.322").unwrap();
        let color = sync.state().color.unwrap();
        assert_eq!(color.r, 255);
        assert!(color.g < 100 && color.b < 100);

        sync.on_topic_message(Channel::Power, "OFF").unwrap();
        assert_eq!(sync.state().power(), Power::Off);
    }

    #[test]
    fn test_brightness_scale_inbound_and_outbound() {
        let config = LightConfig {
            state_topic: s("test_scale/status"),
            brightness_command_topic: s("test_scale/brightness/set"),
            brightness_state_topic: s("test_scale/brightness/status"),
            brightness_scale: 99,
            ..LightConfig::new("test_scale/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        sync.on_topic_message(Channel::Brightness, "99").unwrap();
        assert_eq!(sync.state().brightness, Some(255));

        let actions = sync.set(LightRequest::turn_on().with_brightness(255)).unwrap();
        assert_eq!(actions[0], publish("test_scale/brightness/set", "99"));
    }

    #[test]
    fn test_rgb_sets_brightness_when_not_reported() {
        let config = LightConfig {
            state_topic: s("test_light/status"),
            rgb_command_topic: s("test_light/rgb/set"),
            rgb_state_topic: s("test_light/rgb/status"),
            ..LightConfig::new("test_light/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        sync.on_topic_message(Channel::Rgb, "127,0,0").unwrap();
        assert_eq!(sync.state().color, Some(Rgb::new(255, 0, 0)));
        assert_eq!(sync.state().brightness, Some(127));

        sync.on_topic_message(Channel::Rgb, "0,0,0").unwrap();
        assert_eq!(sync.state().color, Some(Rgb::WHITE));
        assert_eq!(sync.state().brightness, Some(0));
    }

    #[test]
    fn test_invalid_payload_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = LightSynchronizer::new(&reported_light())
            .unwrap()
            .with_state_channel(tx);
        let before = sync.state().clone();

        for (channel, payload) in [
            (Channel::Power, "on"),
            (Channel::Brightness, "bright"),
            (Channel::Rgb, "255,0"),
            (Channel::Hs, "red"),
            (Channel::ColorTemp, "warm"),
        ] {
            let result = sync.on_topic_message(channel, payload);
            assert!(
                matches!(result, Err(LightError::Decode { channel: c, .. }) if c == channel),
                "{channel} accepted `{payload}`"
            );
        }

        assert_eq!(sync.state(), &before);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_value_templates() {
        let config = LightConfig {
            state_topic: s("test_light/status"),
            state_value_template: s("{{ value_json.hello }}"),
            brightness_command_topic: s("test_light/brightness/set"),
            brightness_state_topic: s("test_light/brightness/status"),
            brightness_value_template: s("{{ value_json.hello }}"),
            rgb_command_topic: s("test_light/rgb/set"),
            rgb_state_topic: s("test_light/rgb/status"),
            rgb_value_template: s("{{ value_json.hello | join(\",\") }}"),
            ..LightConfig::new("test_light/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        sync.on_topic_message(Channel::Power, r#"{"hello": "ON"}"#).unwrap();
        sync.on_topic_message(Channel::Brightness, r#"{"hello": "50"}"#).unwrap();
        sync.on_topic_message(Channel::Rgb, r#"{"hello": [1, 2, 3]}"#).unwrap();

        let state = sync.state().clone();
        assert!(state.is_on());
        assert_eq!(state.brightness, Some(50));
        assert_eq!(state.color, Some(color::normalize(Rgb::new(1, 2, 3)).0));

        let result = sync.on_topic_message(Channel::Power, "not json");
        assert!(matches!(result, Err(LightError::Decode { .. })));
        assert_eq!(sync.state(), &state);
    }

    #[test]
    fn test_failed_extraction_sends_no_notification() {
        let config = LightConfig {
            state_topic: s("test_light/status"),
            state_value_template: s("{{ value_json.hello }}"),
            ..LightConfig::new("test_light/set")
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = LightSynchronizer::new(&config)
            .unwrap()
            .with_state_channel(tx);
        let before = sync.state().clone();

        let result = sync.on_topic_message(Channel::Power, "garbage");
        assert!(matches!(
            result,
            Err(LightError::Decode {
                channel: Channel::Power,
                ..
            })
        ));
        assert_eq!(sync.state(), &before);
        assert!(rx.try_recv().is_err());

        sync.on_topic_message(Channel::Power, r#"{"hello": "ON"}"#)
            .unwrap();
        assert!(rx.try_recv().unwrap().on);
    }

    #[test]
    fn test_message_routing() {
        let config = LightConfig {
            availability_topic: s("test_light_rgb/availability"),
            ..reported_light()
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        assert_eq!(sync.on_message("test_light_rgb/status", "ON"), Some(Ok(())));
        assert_eq!(
            sync.on_message("test_light_rgb/brightness/status", "42"),
            Some(Ok(()))
        );
        assert!(sync.on_message("test_light_rgb/set", "ON").is_none());
        assert!(sync.on_message("other/topic", "ON").is_none());
        assert_eq!(sync.state().brightness, Some(42));

        let subscriptions = sync.subscriptions();
        assert_eq!(subscriptions.len(), 9);
        assert!(subscriptions.iter().all(|(_, qos)| *qos == QoS::AtMostOnce));
    }

    #[test]
    fn test_availability() {
        let config = LightConfig {
            state_topic: s("test_light/status"),
            availability_topic: s("availability-topic"),
            ..LightConfig::new("test_light/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();
        assert_eq!(sync.state().power(), Power::Unavailable);

        sync.on_message("availability-topic", "online").unwrap().unwrap();
        assert_eq!(sync.state().power(), Power::Off);

        sync.on_message("test_light/status", "ON").unwrap().unwrap();
        assert_eq!(sync.state().power(), Power::On);

        sync.on_message("availability-topic", "offline").unwrap().unwrap();
        assert_eq!(sync.state().power(), Power::Unavailable);

        assert_eq!(
            sync.on_availability_message("maybe"),
            Err(LightError::Availability("maybe".to_string()))
        );
        assert!(!sync.state().available);
    }

    #[test]
    fn test_custom_availability_payloads() {
        let config = LightConfig {
            availability_topic: s("availability-topic"),
            payload_available: "good".to_string(),
            payload_not_available: "nogood".to_string(),
            ..LightConfig::new("test_light/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        sync.on_availability_message("good").unwrap();
        assert!(sync.state().available);
        assert!(sync.on_availability_message("online").is_err());
        sync.on_availability_message("nogood").unwrap();
        assert!(!sync.state().available);
    }

    #[test]
    fn test_on_command_last() {
        let mut sync =
            LightSynchronizer::new(&optimistic_brightness_light(OnCommandType::Last)).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_brightness(50)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/bright", "50"),
                publish("test_light/set", "ON"),
            ]
        );
        assert!(sync.state().is_on());
        assert_eq!(sync.state().brightness, Some(50));

        let actions = sync.set(LightRequest::turn_off()).unwrap();
        assert_eq!(actions, vec![publish("test_light/set", "OFF")]);
        assert_eq!(sync.state().power(), Power::Off);
    }

    #[test]
    fn test_on_command_first() {
        let mut sync =
            LightSynchronizer::new(&optimistic_brightness_light(OnCommandType::First)).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_brightness(50)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/set", "ON"),
                publish("test_light/bright", "50"),
            ]
        );
    }

    #[test]
    fn test_on_command_brightness() {
        let mut sync = LightSynchronizer::new(&optimistic_brightness_light(
            OnCommandType::Brightness,
        ))
        .unwrap();

        let actions = sync.set(LightRequest::turn_on()).unwrap();
        assert_eq!(actions, vec![publish("test_light/bright", "255")]);

        let actions = sync.set(LightRequest::turn_off()).unwrap();
        assert_eq!(actions, vec![publish("test_light/set", "OFF")]);

        let actions = sync.set(LightRequest::turn_on().with_brightness(50)).unwrap();
        assert_eq!(actions, vec![publish("test_light/bright", "50")]);

        sync.set(LightRequest::turn_off()).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_rgb(255, 128, 0)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/rgb", "255,128,0"),
                publish("test_light/bright", "50"),
            ]
        );
    }

    #[test]
    fn test_rgb_only_light_scales_color() {
        let mut sync = LightSynchronizer::new(&rgb_only_light()).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_brightness(127)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/rgb", "127,127,127"),
                publish("test_light/set", "ON"),
            ]
        );
        assert_eq!(sync.state().brightness, Some(127));

        let actions = sync.set(LightRequest::turn_on().with_rgb(255, 128, 0)).unwrap();
        assert_eq!(actions[0], publish("test_light/rgb", "255,128,0"));
        assert_eq!(sync.state().brightness, Some(255));
        assert_eq!(sync.state().color, Some(Rgb::new(255, 128, 0)));

        let actions = sync.set(LightRequest::turn_on().with_brightness(0)).unwrap();
        assert_eq!(actions[0], publish("test_light/rgb", "0,0,0"));
    }

    #[test]
    fn test_rgb_request_sets_brightness_without_brightness_channel() {
        let mut sync = LightSynchronizer::new(&rgb_only_light()).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_rgb(127, 0, 0)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/rgb", "127,0,0"),
                publish("test_light/set", "ON"),
            ]
        );
        assert_eq!(sync.state().brightness, Some(127));
        assert_eq!(sync.state().color, Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_rgb_with_brightness_channel_is_full_value() {
        let mut sync =
            LightSynchronizer::new(&optimistic_brightness_light(OnCommandType::Last)).unwrap();

        let actions = sync
            .set(LightRequest::turn_on().with_rgb(127, 64, 0).with_brightness(100))
            .unwrap();
        assert_eq!(actions[0].topic, "test_light/rgb");
        assert!(actions[0].payload.starts_with("255,"));
        assert_eq!(actions[1], publish("test_light/bright", "100"));
        assert_eq!(sync.state().brightness, Some(100));
    }

    #[test]
    fn test_rgb_command_template() {
        let config = LightConfig {
            rgb_command_template: s("#{{ red | hex }}{{ green | hex }}{{ blue | hex }}"),
            ..rgb_only_light()
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_rgb(255, 128, 64)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/rgb", "#ff8040"),
                publish("test_light/set", "ON"),
            ]
        );
    }

    #[test]
    fn test_hs_and_xy_commands() {
        let config = LightConfig {
            hs_command_topic: s("test_light/hs"),
            xy_command_topic: s("test_light/xy"),
            ..LightConfig::new("test_light/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        let actions = sync.set(LightRequest::turn_on().with_hs(359.0, 78.0)).unwrap();
        let chroma = color::hs_to_rgb(Hs::new(359.0, 78.0));
        assert_eq!(
            actions,
            vec![
                publish("test_light/hs", "359.0,78.0"),
                publish("test_light/xy", &payload::format_xy(color::rgb_to_xy(chroma))),
                publish("test_light/set", "ON"),
            ]
        );
        assert_eq!(sync.state().color, Some(chroma));

        let actions = sync.set(LightRequest::turn_on().with_xy(0.14, 0.131)).unwrap();
        assert_eq!(actions[1], publish("test_light/xy", "0.14,0.131"));
    }

    #[test]
    fn test_optimistic_white_value() {
        let config = LightConfig {
            white_value_command_topic: s("test_light/white_value"),
            ..LightConfig::new("test_light/set")
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = LightSynchronizer::new(&config)
            .unwrap()
            .with_state_channel(tx);

        let actions = sync.set(LightRequest::turn_on().with_white_value(80)).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light/white_value", "80"),
                publish("test_light/set", "ON"),
            ]
        );

        let notified = rx.try_recv().unwrap();
        assert!(notified.is_on());
        assert_eq!(notified.white_value, Some(80));
        assert!(notified.assumed);
    }

    #[test]
    fn test_full_command_order() {
        let config = LightConfig {
            optimistic: true,
            ..reported_light()
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        let request = LightRequest {
            on: Some(true),
            brightness: Some(50),
            color: None,
            color_temp: Some(125),
            white_value: Some(80),
            effect: Some("colorloop".to_string()),
        };
        let topics: Vec<String> = sync
            .set(request)
            .unwrap()
            .into_iter()
            .map(|a| a.topic)
            .collect();
        assert_eq!(
            topics,
            vec![
                "test_light_rgb/brightness/set",
                "test_light_rgb/color_temp/set",
                "test_light_rgb/effect/set",
                "test_light_rgb/white_value/set",
                "test_light_rgb/set",
            ]
        );

        let state = sync.state();
        assert_eq!(state.brightness, Some(50));
        assert_eq!(state.color_temp, Some(125));
        assert_eq!(state.effect.as_deref(), Some("colorloop"));
        assert_eq!(state.white_value, Some(80));
        assert!(state.assumed);
    }

    #[test]
    fn test_reported_light_waits_for_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = LightSynchronizer::new(&reported_light())
            .unwrap()
            .with_state_channel(tx);

        let actions = sync.set(LightRequest::turn_on().with_brightness(50)).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(sync.state().power(), Power::Off);
        assert_eq!(sync.state().brightness, Some(255));

        let actions = sync.set(LightRequest::turn_off()).unwrap();
        assert_eq!(actions, vec![publish("test_light_rgb/set", "OFF")]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_effect_validation() {
        let mut sync = LightSynchronizer::new(&reported_light()).unwrap();

        let result = sync.set(LightRequest::turn_on().with_effect("strobe"));
        assert!(matches!(result, Err(LightError::Validation(_))));

        let actions = sync.set(LightRequest::turn_on().with_effect("random")).unwrap();
        assert_eq!(
            actions,
            vec![
                publish("test_light_rgb/effect/set", "random"),
                publish("test_light_rgb/set", "ON"),
            ]
        );
    }

    #[test]
    fn test_unsupported_features_are_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = LightSynchronizer::new(&LightConfig::new("test_light/set"))
            .unwrap()
            .with_state_channel(tx);

        for request in [
            LightRequest::turn_on().with_brightness(10),
            LightRequest::turn_on().with_rgb(255, 0, 0),
            LightRequest::turn_on().with_color_temp(300),
            LightRequest::turn_on().with_white_value(10),
            LightRequest::turn_on().with_effect("none"),
        ] {
            assert!(matches!(sync.set(request), Err(LightError::Validation(_))));
        }
        assert_eq!(sync.state().power(), Power::Off);
        assert!(rx.try_recv().is_err());

        assert_eq!(
            sync.set(LightRequest::turn_on()).unwrap(),
            vec![publish("test_light/set", "ON")]
        );
    }

    #[test]
    fn test_custom_payloads_and_qos() {
        let config = LightConfig {
            state_topic: s("test_light/status"),
            payload_on: "1".to_string(),
            payload_off: "0".to_string(),
            qos: 2,
            ..LightConfig::new("test_light/set")
        };
        let mut sync = LightSynchronizer::new(&config).unwrap();

        sync.on_topic_message(Channel::Power, "1").unwrap();
        assert!(sync.state().is_on());
        assert!(sync.on_topic_message(Channel::Power, "ON").is_err());

        let actions = sync.set(LightRequest::turn_off()).unwrap();
        assert_eq!(actions[0].payload, "0");
        assert_eq!(actions[0].qos, QoS::ExactlyOnce);
        assert!(!actions[0].retain);
    }

    #[test]
    fn test_restored_state_only_for_optimistic_channels() {
        let last = LightState {
            on: true,
            brightness: Some(95),
            color: Some(Rgb::new(255, 0, 0)),
            color_temp: Some(100),
            white_value: Some(50),
            effect: Some("random".to_string()),
            ..LightState::default()
        };

        let config = LightConfig {
            effect_list: vec!["random".to_string()],
            ..reported_light()
        };
        let sync = LightSynchronizer::new(&config)
            .unwrap()
            .with_restored_state(Some(last.clone()));
        assert_eq!(sync.state().power(), Power::Off);
        assert_eq!(sync.state().brightness, Some(255));
        assert_eq!(sync.state().color, Some(Rgb::WHITE));

        let optimistic = LightConfig {
            optimistic: true,
            ..config
        };
        let sync = LightSynchronizer::new(&optimistic)
            .unwrap()
            .with_restored_state(Some(last));
        let state = sync.state();
        assert!(state.is_on());
        assert_eq!(state.brightness, Some(95));
        assert_eq!(state.color, Some(Rgb::new(255, 0, 0)));
        assert_eq!(state.color_temp, Some(100));
        assert_eq!(state.white_value, Some(50));
        assert_eq!(state.effect.as_deref(), Some("random"));

        let sync = LightSynchronizer::new(&rgb_only_light())
            .unwrap()
            .with_restored_state(None);
        assert_eq!(sync.state().color, Some(Rgb::WHITE));
    }

    #[test]
    fn test_closed_state_channel_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut sync = LightSynchronizer::new(&rgb_only_light())
            .unwrap()
            .with_state_channel(tx);

        sync.set(LightRequest::turn_on()).unwrap();
        sync.set(LightRequest::turn_off()).unwrap();
        assert!(sync.state_tx.is_none());
    }
}
