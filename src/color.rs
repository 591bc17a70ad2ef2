//! Color conversions between RGB, hue/saturation and CIE XY chromaticity.
//!
//! All routines are pure. Inputs outside their domain are clamped rather than
//! rejected, so every conversion always yields an in-range result.

use palette::{FromColor, Hsv, Srgb, encoding};
use serde::{Deserialize, Serialize};

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Largest channel, i.e. the HSV value on a 0-255 scale.
    pub fn max_channel(&self) -> u8 {
        self.r.max(self.g).max(self.b)
    }
}

/// Hue in degrees `[0, 360)` and saturation in percent `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hs {
    pub hue: f64,
    pub saturation: f64,
}

impl Hs {
    pub const fn new(hue: f64, saturation: f64) -> Self {
        Self { hue, saturation }
    }
}

/// CIE 1931 chromaticity coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Triangle of chromaticities a device can reproduce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gamut {
    pub red: Xy,
    pub green: Xy,
    pub blue: Xy,
}

/// Gamut spanned by the primaries of the wide RGB D65 matrix used below.
pub const WIDE_GAMUT: Gamut = Gamut {
    red: Xy::new(0.7006, 0.2993),
    green: Xy::new(0.1724, 0.7468),
    blue: Xy::new(0.1355, 0.0399),
};

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn channel_from_unit(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Convert RGB to `(hue, saturation, value)`, hue in degrees and the other two
/// in percent, each rounded to 3 decimals.
pub fn rgb_to_hsv(rgb: Rgb) -> (f64, f64, f64) {
    let srgb: Srgb<f64> = Srgb::<u8>::new(rgb.r, rgb.g, rgb.b).into_format();
    let hsv: Hsv<encoding::Srgb, f64> = Hsv::from_color(srgb);

    let mut hue = round_to(hsv.hue.into_positive_degrees(), 3);
    if hue >= 360.0 {
        hue -= 360.0;
    }
    (
        hue,
        round_to(hsv.saturation * 100.0, 3),
        round_to(hsv.value * 100.0, 3),
    )
}

/// Convert HSV (degrees, percent, percent) to RGB.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> Rgb {
    let hsv: Hsv<encoding::Srgb, f64> = Hsv::new(
        hue.rem_euclid(360.0),
        saturation.clamp(0.0, 100.0) / 100.0,
        value.clamp(0.0, 100.0) / 100.0,
    );
    let srgb = Srgb::<f64>::from_color(hsv);
    Rgb::new(
        channel_from_unit(srgb.red),
        channel_from_unit(srgb.green),
        channel_from_unit(srgb.blue),
    )
}

pub fn rgb_to_hs(rgb: Rgb) -> Hs {
    let (hue, saturation, _) = rgb_to_hsv(rgb);
    Hs::new(hue, saturation)
}

/// Full-value RGB for a hue/saturation pair.
pub fn hs_to_rgb(hs: Hs) -> Rgb {
    hsv_to_rgb(hs.hue, hs.saturation, 100.0)
}

fn gamma_expand(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn gamma_compress(linear: f64) -> f64 {
    if linear <= 0.003_130_8 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert RGB to XY chromaticity, rounded to 3 decimals. Black maps to the
/// origin.
pub fn rgb_to_xy(rgb: Rgb) -> Xy {
    if rgb == Rgb::BLACK {
        return Xy::new(0.0, 0.0);
    }

    let r = gamma_expand(rgb.r);
    let g = gamma_expand(rgb.g);
    let b = gamma_expand(rgb.b);

    let x = r * 0.664_511 + g * 0.154_324 + b * 0.162_028;
    let y = r * 0.283_881 + g * 0.668_433 + b * 0.047_685;
    let z = r * 0.000_088 + g * 0.072_310 + b * 0.986_039;
    let sum = x + y + z;

    Xy::new(
        round_to((x / sum).clamp(0.0, 1.0), 3),
        round_to((y / sum).clamp(0.0, 1.0), 3),
    )
}

/// Convert XY chromaticity to full-brightness RGB.
pub fn xy_to_rgb(xy: Xy) -> Rgb {
    xy_brightness_to_rgb(xy, 255)
}

/// Convert XY chromaticity at the given brightness (0-255) to RGB.
///
/// Points outside [`WIDE_GAMUT`] are first moved to the closest point on the
/// triangle boundary.
pub fn xy_brightness_to_rgb(xy: Xy, brightness: u8) -> Rgb {
    if brightness == 0 {
        return Rgb::BLACK;
    }

    let xy = clamp_to_gamut(
        Xy::new(xy.x.clamp(0.0, 1.0), xy.y.clamp(0.0, 1.0)),
        &WIDE_GAMUT,
    );

    let big_y = f64::from(brightness) / 255.0;
    let vy = if xy.y == 0.0 { 1e-11 } else { xy.y };
    let big_x = (big_y / vy) * xy.x;
    let big_z = (big_y / vy) * (1.0 - xy.x - vy);

    let r = big_x * 1.656_492 - big_y * 0.354_851 - big_z * 0.255_038;
    let g = -big_x * 0.707_196 + big_y * 1.655_397 + big_z * 0.036_152;
    let b = big_x * 0.051_713 - big_y * 0.121_364 + big_z * 1.011_530;

    let mut channels = [r, g, b].map(|c| gamma_compress(c).max(0.0));
    let max = channels.iter().copied().fold(0.0_f64, f64::max);
    if max > 1.0 {
        channels = channels.map(|c| c / max);
    }

    let [r, g, b] = channels.map(|c| (c * 255.0).clamp(0.0, 255.0) as u8);
    Rgb::new(r, g, b)
}

fn cross(a: Xy, b: Xy) -> f64 {
    a.x * b.y - a.y * b.x
}

/// True when `point` lies inside (or on) the gamut triangle.
pub fn in_gamut(point: Xy, gamut: &Gamut) -> bool {
    let v1 = Xy::new(gamut.green.x - gamut.red.x, gamut.green.y - gamut.red.y);
    let v2 = Xy::new(gamut.blue.x - gamut.red.x, gamut.blue.y - gamut.red.y);
    let q = Xy::new(point.x - gamut.red.x, point.y - gamut.red.y);

    let denominator = cross(v1, v2);
    let s = cross(q, v2) / denominator;
    let t = cross(v1, q) / denominator;
    s >= 0.0 && t >= 0.0 && s + t <= 1.0
}

fn closest_point_on_segment(a: Xy, b: Xy, p: Xy) -> Xy {
    let ap = Xy::new(p.x - a.x, p.y - a.y);
    let ab = Xy::new(b.x - a.x, b.y - a.y);
    let t = ((ap.x * ab.x + ap.y * ab.y) / (ab.x * ab.x + ab.y * ab.y)).clamp(0.0, 1.0);
    Xy::new(a.x + ab.x * t, a.y + ab.y * t)
}

fn distance(a: Xy, b: Xy) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Move `point` onto the closest edge of the gamut when it lies outside.
pub fn clamp_to_gamut(point: Xy, gamut: &Gamut) -> Xy {
    if in_gamut(point, gamut) {
        return point;
    }

    [
        closest_point_on_segment(gamut.red, gamut.green, point),
        closest_point_on_segment(gamut.blue, gamut.red, point),
        closest_point_on_segment(gamut.green, gamut.blue, point),
    ]
    .into_iter()
    .min_by(|a, b| distance(*a, point).total_cmp(&distance(*b, point)))
    .unwrap_or(point)
}

/// Split a color into its full-value chroma and its value (0-255).
///
/// Black carries no chroma and normalizes to white at value 0.
pub fn normalize(rgb: Rgb) -> (Rgb, u8) {
    let max = rgb.max_channel();
    if max == 0 {
        return (Rgb::WHITE, 0);
    }
    let stretch = |c: u8| scale_value(f64::from(c), u32::from(max), 255) as u8;
    (Rgb::new(stretch(rgb.r), stretch(rgb.g), stretch(rgb.b)), max)
}

/// Dim a full-value color to the given brightness (0-255).
pub fn dim(rgb: Rgb, brightness: u8) -> Rgb {
    let scale = |c: u8| scale_value(f64::from(c) * f64::from(brightness), 255 * 255, 255) as u8;
    Rgb::new(scale(rgb.r), scale(rgb.g), scale(rgb.b))
}

/// Linearly rescale `value` from `0..=from_max` to `0..=to_max`, rounding to
/// the nearest integer. The top of the source range maps exactly onto
/// `to_max`; values beyond either end are clamped.
pub fn scale_value(value: f64, from_max: u32, to_max: u32) -> u32 {
    if from_max == 0 || !value.is_finite() {
        return 0;
    }
    let scaled = (value / f64::from(from_max) * f64::from(to_max)).round();
    scaled.clamp(0.0, f64::from(to_max)) as u32
}
