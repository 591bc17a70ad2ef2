//! Which channels a light has, resolved once from its configuration.

use super::channel::{Channel, OnCommandType};
use crate::config::LightConfig;
use crate::error::LightError;
use log::warn;
use rumqttc::QoS;
use std::collections::BTreeMap;

/// Topics, template and scale of one configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopics {
    pub command_topic: String,
    pub state_topic: Option<String>,
    pub value_template: Option<String>,
    pub command_template: Option<String>,
    /// Wire-side maximum for scaled channels (brightness, rgb, white_value).
    pub scale: u32,
}

/// Immutable description of a light's configured channels.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCapabilities {
    pub name: String,
    pub command_topic: String,
    channels: BTreeMap<Channel, ChannelTopics>,
    pub effect_list: Vec<String>,
    pub payload_on: String,
    pub payload_off: String,
    pub availability_topic: Option<String>,
    pub payload_available: String,
    pub payload_not_available: String,
    pub qos: QoS,
    pub optimistic: bool,
    pub on_command_type: OnCommandType,
}

fn qos_from_level(level: u8) -> Result<QoS, LightError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(LightError::Config(format!("qos must be 0, 1 or 2, got {other}"))),
    }
}

impl LightCapabilities {
    pub fn from_config(config: &LightConfig) -> Result<Self, LightError> {
        config.validate()?;

        let mut channels = BTreeMap::new();
        let mut add = |channel: Channel,
                       command: &Option<String>,
                       state: &Option<String>,
                       value_template: &Option<String>,
                       command_template: &Option<String>,
                       scale: u32| {
            if let Some(command_topic) = command.clone().filter(|t| !t.is_empty()) {
                channels.insert(
                    channel,
                    ChannelTopics {
                        command_topic,
                        state_topic: state.clone().filter(|t| !t.is_empty()),
                        value_template: value_template.clone(),
                        command_template: command_template.clone(),
                        scale,
                    },
                );
            }
        };

        add(
            Channel::Power,
            &config.command_topic,
            &config.state_topic,
            &config.state_value_template,
            &None,
            1,
        );
        add(
            Channel::Brightness,
            &config.brightness_command_topic,
            &config.brightness_state_topic,
            &config.brightness_value_template,
            &None,
            config.brightness_scale,
        );
        add(
            Channel::Rgb,
            &config.rgb_command_topic,
            &config.rgb_state_topic,
            &config.rgb_value_template,
            &config.rgb_command_template,
            config.rgb_scale,
        );
        add(
            Channel::Hs,
            &config.hs_command_topic,
            &config.hs_state_topic,
            &config.hs_value_template,
            &None,
            1,
        );
        add(
            Channel::Xy,
            &config.xy_command_topic,
            &config.xy_state_topic,
            &config.xy_value_template,
            &None,
            1,
        );
        add(
            Channel::ColorTemp,
            &config.color_temp_command_topic,
            &config.color_temp_state_topic,
            &config.color_temp_value_template,
            &None,
            1,
        );
        add(
            Channel::WhiteValue,
            &config.white_value_command_topic,
            &config.white_value_state_topic,
            &config.white_value_template,
            &None,
            config.white_value_scale,
        );
        add(
            Channel::Effect,
            &config.effect_command_topic,
            &config.effect_state_topic,
            &config.effect_value_template,
            &None,
            1,
        );

        let mut on_command_type = config.on_command_type;
        if on_command_type == OnCommandType::Brightness
            && !channels.contains_key(&Channel::Brightness)
        {
            warn!(
                "[Light] {}: on_command_type 'brightness' needs a brightness_command_topic, sending power last instead",
                config.name
            );
            on_command_type = OnCommandType::Last;
        }

        Ok(Self {
            name: config.name.clone(),
            command_topic: config.command_topic.clone().unwrap_or_default(),
            channels,
            effect_list: config.effect_list.clone(),
            payload_on: config.payload_on.clone(),
            payload_off: config.payload_off.clone(),
            availability_topic: config.availability_topic.clone().filter(|t| !t.is_empty()),
            payload_available: config.payload_available.clone(),
            payload_not_available: config.payload_not_available.clone(),
            qos: qos_from_level(config.qos)?,
            optimistic: config.optimistic,
            on_command_type,
        })
    }

    /// Topics of a channel, if it has a command topic.
    pub fn channel(&self, channel: Channel) -> Option<&ChannelTopics> {
        self.channels.get(&channel)
    }

    pub fn has(&self, channel: Channel) -> bool {
        self.channels.contains_key(&channel)
    }

    /// True when the channel has a state topic the light reports on.
    pub fn is_reported(&self, channel: Channel) -> bool {
        !self.optimistic
            && self
                .channel(channel)
                .is_some_and(|topics| topics.state_topic.is_some())
    }

    /// True when a configured channel is updated locally on command.
    pub fn is_optimistic(&self, channel: Channel) -> bool {
        self.has(channel) && !self.is_reported(channel)
    }

    pub fn has_color(&self) -> bool {
        Channel::COLORS.iter().any(|c| self.has(*c))
    }

    /// Brightness can be driven by its own topic or by scaling the RGB payload.
    pub fn supports_brightness(&self) -> bool {
        self.has(Channel::Brightness) || self.has(Channel::Rgb)
    }

    /// Configured channels in publish order.
    pub fn channels(&self) -> impl Iterator<Item = (Channel, &ChannelTopics)> {
        self.channels.iter().map(|(channel, topics)| (*channel, topics))
    }

    /// Every state topic plus the availability topic.
    pub fn subscriptions(&self) -> Vec<String> {
        self.channels()
            .filter_map(|(_, topics)| topics.state_topic.clone())
            .chain(self.availability_topic.clone())
            .collect()
    }

    /// Channel reported on `topic`, if any.
    pub fn channel_for_state_topic(&self, topic: &str) -> Option<Channel> {
        self.channels()
            .find(|(_, topics)| topics.state_topic.as_deref() == Some(topic))
            .map(|(channel, _)| channel)
    }
}
