//! Default wire formats of the light channels.

use crate::color::{Hs, Rgb, Xy, round_to, scale_value};

/// Parse a scaled level (brightness, white value) into the internal 0-255 range.
pub fn parse_level(payload: &str, scale: u32) -> Result<u8, String> {
    let raw: f64 = payload
        .trim()
        .parse()
        .map_err(|_| format!("`{payload}` is not a number"))?;
    Ok(scale_value(raw, scale, 255) as u8)
}

pub fn parse_mireds(payload: &str) -> Result<u16, String> {
    let trimmed = payload.trim();
    trimmed
        .parse::<u16>()
        .or_else(|_| {
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|m| m.is_finite() && (0.0..=f64::from(u16::MAX)).contains(m))
                .map(|m| m as u16)
                .ok_or(())
        })
        .map_err(|_| format!("`{payload}` is not a color temperature"))
}

fn parse_list<T: std::str::FromStr, const N: usize>(payload: &str) -> Result<[T; N], String> {
    let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!(
            "expected {N} comma-separated values, got `{payload}`"
        ));
    }
    let mut values = Vec::with_capacity(N);
    for part in parts {
        values.push(
            part.parse::<T>()
                .map_err(|_| format!("`{part}` is not a number in `{payload}`"))?,
        );
    }
    values
        .try_into()
        .map_err(|_| format!("expected {N} values in `{payload}`"))
}

/// Parse `r,g,b` on a `0..=scale` wire range into 0-255 channels.
pub fn parse_rgb(payload: &str, scale: u32) -> Result<Rgb, String> {
    let [r, g, b] = parse_list::<f64, 3>(payload)?;
    let channel = |v: f64| scale_value(v, scale, 255) as u8;
    Ok(Rgb::new(channel(r), channel(g), channel(b)))
}

pub fn parse_hs(payload: &str) -> Result<Hs, String> {
    let [hue, saturation] = parse_list::<f64, 2>(payload)?;
    if !hue.is_finite() || !saturation.is_finite() {
        return Err(format!("`{payload}` is not a hue/saturation pair"));
    }
    Ok(Hs::new(hue, saturation))
}

pub fn parse_xy(payload: &str) -> Result<Xy, String> {
    let [x, y] = parse_list::<f64, 2>(payload)?;
    if !x.is_finite() || !y.is_finite() {
        return Err(format!("`{payload}` is not an xy pair"));
    }
    Ok(Xy::new(x, y))
}

/// Render a level from 0-255 onto a `0..=scale` wire range.
pub fn format_level(level: u8, scale: u32) -> String {
    scale_value(f64::from(level), 255, scale).to_string()
}

pub fn format_rgb(rgb: Rgb, scale: u32) -> String {
    let channel = |c: u8| scale_value(f64::from(c), 255, scale);
    format!("{},{},{}", channel(rgb.r), channel(rgb.g), channel(rgb.b))
}

/// Float rounded to 3 decimals, always with a fractional part (`359.0`).
pub fn format_float(value: f64) -> String {
    let rounded = round_to(value, 3);
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        rounded.to_string()
    }
}

pub fn format_hs(hs: Hs) -> String {
    format!("{},{}", format_float(hs.hue), format_float(hs.saturation))
}

pub fn format_xy(xy: Xy) -> String {
    format!("{},{}", format_float(xy.x), format_float(xy.y))
}
