//! Color type, parsing/formatting and brightness scaling.
//!
//! The device takes one solid 8-bit-per-channel color. Every input edge
//! (CLI, control requests, config) clamps wider integers into `0..=255`
//! before a [`Color`] exists, so the encoder never sees out-of-range values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An RGB color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    /// Warm white the bar powers up with.
    pub const WARM_WHITE: Color = Color::new(255, 200, 120);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Build a color from unbounded integers, clamping each channel.
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        Color::new(clamp_channel(r), clamp_channel(g), clamp_channel(b))
    }

    /// Linear interpolation from `self` to `target` at `step / steps`,
    /// rounded to nearest per channel.
    ///
    /// `step == steps` returns `target` exactly; `steps == 0` is treated as 1.
    pub fn lerp(self, target: Color, step: u32, steps: u32) -> Color {
        let steps = steps.max(1);
        let step = step.min(steps);
        let t = step as f64 / steps as f64;
        let mix = |a: u8, b: u8| -> u8 {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v.round_ties_even().clamp(0.0, 255.0) as u8
        };
        Color::new(
            mix(self.r, target.r),
            mix(self.g, target.g),
            mix(self.b, target.b),
        )
    }

    /// Sum of absolute per-channel differences (0..=765).
    pub fn distance(self, other: Color) -> u32 {
        self.r.abs_diff(other.r) as u32
            + self.g.abs_diff(other.g) as u32
            + self.b.abs_diff(other.b) as u32
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_color(*self))
    }
}

/// Clamp an integer channel value into `0..=255`.
pub fn clamp_channel(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

/// Clamp a brightness percentage into `0..=100`.
pub fn clamp_brightness(v: i64) -> u8 {
    v.clamp(0, 100) as u8
}

/// Scale a color by a brightness percentage, rounding to nearest (ties to even).
///
/// Values above 100 are treated as 100.
pub fn apply_brightness(color: Color, brightness: u8) -> Color {
    let scale = brightness.min(100) as f64 / 100.0;
    let ch = |v: u8| (v as f64 * scale).round_ties_even() as u8;
    Color::new(ch(color.r), ch(color.g), ch(color.b))
}

/// Parse a color string.
///
/// Accepts:
/// - Hex: `"#FF0000"`, `"FF0000"`, `"#ff0000"`
/// - Named: `"red"`, `"green"`, `"blue"`, `"white"`, `"warm"`, `"cool"`, `"orange"`,
///   `"yellow"`, `"purple"`, `"cyan"`, `"off"`/`"black"`
pub fn parse_color(s: &str) -> crate::error::Result<Color> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "red" => return Ok(Color::new(0xFF, 0x00, 0x00)),
        "green" => return Ok(Color::new(0x00, 0xFF, 0x00)),
        "blue" => return Ok(Color::new(0x00, 0x00, 0xFF)),
        "white" => return Ok(Color::WHITE),
        "warm" => return Ok(Color::WARM_WHITE),
        "cool" => return Ok(Color::new(0xD8, 0xEC, 0xFF)),
        "orange" => return Ok(Color::new(0xFF, 0x80, 0x00)),
        "yellow" => return Ok(Color::new(0xFF, 0xFF, 0x00)),
        "purple" => return Ok(Color::new(0xB4, 0x00, 0xFF)),
        "cyan" => return Ok(Color::new(0x00, 0xFF, 0xFF)),
        "off" | "black" => return Ok(Color::BLACK),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(crate::RobobloqError::Color(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| crate::RobobloqError::Color(format!("Invalid hex color: {s}")))?;
    Ok(Color::new(
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ))
}

/// Format a color as `#RRGGBB`.
pub fn format_color(color: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}
