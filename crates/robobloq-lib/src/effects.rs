//! Fade, pulse and rainbow math.
//!
//! Pure functions only; the scheduler owns timing, cancellation and writes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::color::Color;

// ── Fade ──

pub const DEFAULT_FADE_DURATION_MS: u64 = 800;
pub const DEFAULT_FADE_STEPS: u32 = 40;
pub const MAX_FADE_DURATION_MS: u64 = 60_000;
pub const MAX_FADE_STEPS: u32 = 300;

pub fn clamp_fade_duration(ms: i64) -> u64 {
    ms.clamp(0, MAX_FADE_DURATION_MS as i64) as u64
}

pub fn clamp_fade_steps(steps: i64) -> u32 {
    steps.clamp(1, MAX_FADE_STEPS as i64) as u32
}

/// Colors written by a fade, in order: steps `1..=steps`.
///
/// Step 0 (the start color) is never part of the sequence and the last
/// element is always exactly `target`.
pub fn fade_sequence(start: Color, target: Color, steps: u32) -> impl Iterator<Item = Color> {
    let steps = steps.max(1);
    (1..=steps).map(move |i| start.lerp(target, i, steps))
}

/// Delay between two fade steps.
pub fn fade_step_delay(duration_ms: u64, steps: u32) -> Duration {
    Duration::from_millis(duration_ms) / steps.max(1)
}

// ── Periodic effects ──

pub const DEFAULT_EFFECT_SPEED: u8 = 50;

/// Steps in each half of a pulse cycle.
pub const PULSE_STEPS: u32 = 50;

const PULSE_SLOW_HALF_PERIOD_S: f64 = 3.0;
const PULSE_FAST_HALF_PERIOD_S: f64 = 0.4;
const RAINBOW_SLOW_DELAY_MS: f64 = 100.0;
const RAINBOW_FAST_DELAY_MS: f64 = 10.0;

/// Number of distinct wheel positions.
pub const WHEEL_POSITIONS: u32 = 256;

/// A named periodic effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Pulse,
    Rainbow,
}

impl EffectKind {
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Pulse => "pulse",
            EffectKind::Rainbow => "rainbow",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = ();

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulse" => Ok(EffectKind::Pulse),
            "rainbow" => Ok(EffectKind::Rainbow),
            _ => Err(()),
        }
    }
}

pub fn clamp_speed(speed: i64) -> u8 {
    speed.clamp(1, 100) as u8
}

/// Position of `speed` on the slow (0.0) to fast (1.0) axis.
fn speed_fraction(speed: u8) -> f64 {
    (speed.clamp(1, 100) - 1) as f64 / 99.0
}

/// Duration of one pulse ramp (up or down): 3.0 s at speed 1, 0.4 s at 100.
pub fn pulse_half_period(speed: u8) -> Duration {
    let t = speed_fraction(speed);
    Duration::from_secs_f64(PULSE_SLOW_HALF_PERIOD_S * (1.0 - t) + PULSE_FAST_HALF_PERIOD_S * t)
}

pub fn pulse_step_delay(speed: u8) -> Duration {
    pulse_half_period(speed) / PULSE_STEPS
}

/// Brightness levels of one pulse cycle: `1..=50` up, then `49..=0` down.
pub fn pulse_levels() -> impl Iterator<Item = u32> {
    (1..=PULSE_STEPS).chain((0..PULSE_STEPS).rev())
}

/// Color at `level` of `PULSE_STEPS` between black and `base`.
pub fn pulse_color(base: Color, level: u32) -> Color {
    Color::BLACK.lerp(base, level, PULSE_STEPS)
}

/// Per-position delay of the rainbow: 100 ms at speed 1, 10 ms at 100.
pub fn rainbow_delay(speed: u8) -> Duration {
    let t = speed_fraction(speed);
    let ms = RAINBOW_SLOW_DELAY_MS * (1.0 - t) + RAINBOW_FAST_DELAY_MS * t;
    Duration::from_secs_f64(ms / 1000.0)
}

/// Hue wheel over 256 positions in three 85-wide linear bands.
///
/// Every output has channel sum 255.
pub fn wheel(pos: u32) -> Color {
    let p = (pos % WHEEL_POSITIONS) as u8;
    match p {
        0..85 => Color::new(p * 3, 255 - p * 3, 0),
        85..170 => {
            let q = p - 85;
            Color::new(255 - q * 3, 0, q * 3)
        }
        _ => {
            let s = p - 170;
            Color::new(0, s * 3, 255 - s * 3)
        }
    }
}
