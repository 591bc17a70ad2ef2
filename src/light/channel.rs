//! Light sub-features that can be commanded and reported independently.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Power,
    Brightness,
    Rgb,
    Hs,
    Xy,
    ColorTemp,
    WhiteValue,
    Effect,
}

impl Channel {
    /// The three mutually convertible color representations.
    pub const COLORS: [Channel; 3] = [Channel::Rgb, Channel::Hs, Channel::Xy];
}

/// Order in which the power message is sent relative to feature messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OnCommandType {
    /// Power message before feature messages.
    First,
    /// Power message after feature messages.
    #[default]
    Last,
    /// No power message when turning on; the brightness message implies it.
    Brightness,
}
