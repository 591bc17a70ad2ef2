//! In-memory light state and partial state requests.

use crate::color::{self, Hs, Rgb, Xy};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Power as reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Power {
    Unavailable,
    Off,
    On,
}

/// Complete state of one light.
///
/// Color is stored once, as full-value RGB; brightness is kept separately.
/// HS and XY are derived on read so repeated reads never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightState {
    pub available: bool,
    pub on: bool,
    pub brightness: Option<u8>,
    pub color: Option<Rgb>,
    pub color_temp: Option<u16>,
    pub white_value: Option<u8>,
    pub effect: Option<String>,
    pub assumed: bool,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            available: true,
            on: false,
            brightness: None,
            color: None,
            color_temp: None,
            white_value: None,
            effect: None,
            assumed: false,
        }
    }
}

impl LightState {
    pub fn power(&self) -> Power {
        match (self.available, self.on) {
            (false, _) => Power::Unavailable,
            (true, false) => Power::Off,
            (true, true) => Power::On,
        }
    }

    pub fn is_on(&self) -> bool {
        self.power() == Power::On
    }

    pub fn hs_color(&self) -> Option<Hs> {
        self.color.map(color::rgb_to_hs)
    }

    pub fn xy_color(&self) -> Option<Xy> {
        self.color.map(color::rgb_to_xy)
    }
}

/// A requested color in any of the supported representations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightColor {
    Rgb(Rgb),
    Hs(Hs),
    Xy(Xy),
}

impl LightColor {
    /// Full-value chroma of the request, plus the value it carried when the
    /// request was RGB.
    pub fn chroma(&self) -> (Rgb, Option<u8>) {
        match *self {
            LightColor::Rgb(rgb) => {
                let (full, value) = color::normalize(rgb);
                (full, Some(value))
            }
            LightColor::Hs(hs) => (color::hs_to_rgb(hs), None),
            LightColor::Xy(xy) => (color::normalize(color::xy_to_rgb(xy)).0, None),
        }
    }

    pub fn to_hs(&self, chroma: Rgb) -> Hs {
        match *self {
            LightColor::Hs(hs) => hs,
            _ => color::rgb_to_hs(chroma),
        }
    }

    pub fn to_xy(&self, chroma: Rgb) -> Xy {
        match *self {
            LightColor::Xy(xy) => xy,
            _ => color::rgb_to_xy(chroma),
        }
    }
}

/// Partial light state requested by a command. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightRequest {
    /// `Some(false)` turns the light off; anything else turns it on.
    pub on: Option<bool>,
    pub brightness: Option<u8>,
    pub color: Option<LightColor>,
    pub color_temp: Option<u16>,
    pub white_value: Option<u8>,
    pub effect: Option<String>,
}

impl LightRequest {
    pub fn turn_on() -> Self {
        Self {
            on: Some(true),
            ..Self::default()
        }
    }

    pub fn turn_off() -> Self {
        Self {
            on: Some(false),
            ..Self::default()
        }
    }

    pub fn is_off(&self) -> bool {
        self.on == Some(false)
    }

    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn with_rgb(mut self, r: u8, g: u8, b: u8) -> Self {
        self.color = Some(LightColor::Rgb(Rgb::new(r, g, b)));
        self
    }

    pub fn with_hs(mut self, hue: f64, saturation: f64) -> Self {
        self.color = Some(LightColor::Hs(Hs::new(hue, saturation)));
        self
    }

    pub fn with_xy(mut self, x: f64, y: f64) -> Self {
        self.color = Some(LightColor::Xy(Xy::new(x, y)));
        self
    }

    pub fn with_color_temp(mut self, mireds: u16) -> Self {
        self.color_temp = Some(mireds);
        self
    }

    pub fn with_white_value(mut self, white_value: u8) -> Self {
        self.white_value = Some(white_value);
        self
    }

    pub fn with_effect(mut self, effect: impl Into<String>) -> Self {
        self.effect = Some(effect.into());
        self
    }
}
