//! Screen-sync color pipeline: I/O-free.
//!
//! Turns frames into at most one color write per tick:
//! downscale → edge band means → weighted combine → EMA → change gate.
//! The scheduler feeds frames and performs the writes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::color::Color;

// ── Settings ──

pub const DEFAULT_MONITOR: usize = 1;
pub const DEFAULT_FPS: u32 = 25;
pub const DEFAULT_THICKNESS: u32 = 80;
pub const DEFAULT_DOWNSCALE: u32 = 4;
pub const DEFAULT_ALPHA: f64 = 0.35;
pub const DEFAULT_THRESHOLD: u32 = 6;

const WEIGHT_LEFT: f64 = 0.25;
const WEIGHT_TOP: f64 = 0.50;
const WEIGHT_RIGHT: f64 = 0.25;

/// Screen-sync parameters. Everything except `monitor` is clamped, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// 1-based monitor index, validated against the frame source.
    pub monitor: usize,
    pub fps: u32,
    /// Edge band thickness in downscaled pixels.
    pub thickness: u32,
    /// Keep every n-th pixel in both axes.
    pub downscale: u32,
    /// Smoothing factor; lower is smoother.
    pub alpha: f64,
    /// Minimum summed channel change before a write.
    pub threshold: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            monitor: DEFAULT_MONITOR,
            fps: DEFAULT_FPS,
            thickness: DEFAULT_THICKNESS,
            downscale: DEFAULT_DOWNSCALE,
            alpha: DEFAULT_ALPHA,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

pub fn clamp_fps(v: i64) -> u32 {
    v.clamp(1, 120) as u32
}

pub fn clamp_thickness(v: i64) -> u32 {
    v.clamp(1, 1000) as u32
}

pub fn clamp_downscale(v: i64) -> u32 {
    v.clamp(1, 16) as u32
}

/// Clamp into `[0.01, 1.0]`; NaN falls back to the default.
pub fn clamp_alpha(v: f64) -> f64 {
    if v.is_nan() {
        return DEFAULT_ALPHA;
    }
    v.clamp(0.01, 1.0)
}

pub fn clamp_threshold(v: i64) -> u32 {
    v.clamp(0, 765) as u32
}

impl SyncSettings {
    /// Copy with every numeric field forced into range.
    pub fn clamped(self) -> Self {
        SyncSettings {
            monitor: self.monitor,
            fps: clamp_fps(self.fps as i64),
            thickness: clamp_thickness(self.thickness as i64),
            downscale: clamp_downscale(self.downscale as i64),
            alpha: clamp_alpha(self.alpha),
            threshold: clamp_threshold(self.threshold as i64),
        }
    }

    /// Time allotted to one tick.
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

// ── Sampling ──

/// Effective band thickness: `max(1, min(thickness, w/4, h/4))`.
pub fn edge_thickness(thickness: u32, width: usize, height: usize) -> usize {
    (thickness as usize).min(width / 4).min(height / 4).max(1)
}

/// Truncated mean of the pixels in `xs × ys`; black when the band is empty.
fn band_mean(
    frame: &Frame,
    xs: std::ops::Range<usize>,
    ys: std::ops::Range<usize>,
) -> Color {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for y in ys {
        for x in xs.clone() {
            let px = frame.pixel(x, y);
            for (acc, v) in sum.iter_mut().zip(px) {
                *acc += v as u64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return Color::BLACK;
    }
    Color::new(
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    )
}

/// Mean colors of the left, top and right edge bands.
pub fn edge_averages(frame: &Frame, thickness: u32) -> (Color, Color, Color) {
    let (w, h) = (frame.width(), frame.height());
    let t = edge_thickness(thickness, w, h).min(w).min(h);
    let left = band_mean(frame, 0..t, 0..h);
    let top = band_mean(frame, 0..w, 0..t);
    let right = band_mean(frame, w - t..w, 0..h);
    (left, top, right)
}

/// Weighted blend favoring the top edge, truncated per channel.
pub fn combine_edges(left: Color, top: Color, right: Color) -> Color {
    let mix = |l: u8, t: u8, r: u8| -> u8 {
        (WEIGHT_LEFT * l as f64 + WEIGHT_TOP * t as f64 + WEIGHT_RIGHT * r as f64) as u8
    };
    Color::new(
        mix(left.r, top.r, right.r),
        mix(left.g, top.g, right.g),
        mix(left.b, top.b, right.b),
    )
}

// ── Smoothing + write suppression ──

/// Exponential moving average starting from black.
#[derive(Debug, Clone)]
pub struct Smoother {
    alpha: f64,
    state: [f64; 3],
}

impl Smoother {
    pub fn new(alpha: f64) -> Self {
        Smoother {
            alpha: clamp_alpha(alpha),
            state: [0.0; 3],
        }
    }

    /// Fold in `target` and return the smoothed color (clipped, truncated).
    pub fn update(&mut self, target: Color) -> Color {
        let a = self.alpha;
        for (s, t) in self.state.iter_mut().zip([target.r, target.g, target.b]) {
            *s = (1.0 - a) * *s + a * t as f64;
        }
        let out = |v: f64| v.clamp(0.0, 255.0) as u8;
        Color::new(out(self.state[0]), out(self.state[1]), out(self.state[2]))
    }
}

/// Lets a color through only when it differs enough from the last one let
/// through.
///
/// Before the first write the baseline sits one below black on every
/// channel, so a dark first frame within the threshold writes nothing.
#[derive(Debug, Clone)]
pub struct ChangeGate {
    threshold: u32,
    last_written: Option<Color>,
}

impl ChangeGate {
    pub fn new(threshold: u32) -> Self {
        ChangeGate {
            threshold,
            last_written: None,
        }
    }

    pub fn admit(&mut self, color: Color) -> bool {
        let distance = match self.last_written {
            None => color.r as u32 + color.g as u32 + color.b as u32 + 3,
            Some(last) => color.distance(last),
        };
        let pass = distance > self.threshold;
        if pass {
            self.last_written = Some(color);
        }
        pass
    }
}

/// Per-tick state for one sync session.
#[derive(Debug, Clone)]
pub struct SyncPipeline {
    settings: SyncSettings,
    smoother: Smoother,
    gate: ChangeGate,
}

impl SyncPipeline {
    pub fn new(settings: SyncSettings) -> Self {
        let settings = settings.clamped();
        SyncPipeline {
            settings,
            smoother: Smoother::new(settings.alpha),
            gate: ChangeGate::new(settings.threshold),
        }
    }

    /// Process one full-resolution frame; `Some(color)` means write it.
    pub fn process(&mut self, frame: &Frame) -> Option<Color> {
        let small = frame.downscale(self.settings.downscale as usize);
        let (l, t, r) = edge_averages(&small, self.settings.thickness);
        let target = combine_edges(l, t, r);
        let smoothed = self.smoother.update(target);
        self.gate.admit(smoothed).then_some(smoothed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── settings ──

    #[test]
    fn defaults() {
        let s = SyncSettings::default();
        assert_eq!(s.monitor, 1);
        assert_eq!(s.fps, 25);
        assert_eq!(s.thickness, 80);
        assert_eq!(s.downscale, 4);
        assert_eq!(s.threshold, 6);
        assert!((s.alpha - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn clamped_forces_ranges() {
        let s = SyncSettings {
            monitor: 9,
            fps: 500,
            thickness: 0,
            downscale: 99,
            alpha: 0.0,
            threshold: 10_000,
        }
        .clamped();
        assert_eq!(s.monitor, 9, "monitor is validated elsewhere, not clamped");
        assert_eq!(s.fps, 120);
        assert_eq!(s.thickness, 1);
        assert_eq!(s.downscale, 16);
        assert!((s.alpha - 0.01).abs() < f64::EPSILON);
        assert_eq!(s.threshold, 765);
    }

    #[test]
    fn alpha_nan_uses_default() {
        assert_eq!(clamp_alpha(f64::NAN), DEFAULT_ALPHA);
        assert_eq!(clamp_alpha(3.0), 1.0);
    }

    #[test]
    fn frame_budget_from_fps() {
        let s = SyncSettings {
            fps: 25,
            ..Default::default()
        };
        assert_eq!(s.frame_budget(), Duration::from_millis(40));
    }

    #[test]
    fn deserialize_partial_uses_defaults() {
        let s: SyncSettings = toml::from_str("fps = 60").unwrap();
        assert_eq!(s.fps, 60);
        assert_eq!(s.thickness, DEFAULT_THICKNESS);
    }

    // ── sampling ──

    #[test]
    fn edge_thickness_limits() {
        assert_eq!(edge_thickness(80, 480, 270), 67);
        assert_eq!(edge_thickness(10, 480, 270), 10);
        assert_eq!(edge_thickness(80, 3, 3), 1);
    }

    #[test]
    fn edge_averages_pick_bands() {
        // 8x8: left two columns red, right two columns blue, rest green.
        let f = Frame::from_fn(8, 8, |x, _| match x {
            0..2 => Color::new(255, 0, 0),
            6.. => Color::new(0, 0, 255),
            _ => Color::new(0, 255, 0),
        });
        let (l, t, r) = edge_averages(&f, 2);
        assert_eq!(l, Color::new(255, 0, 0));
        assert_eq!(r, Color::new(0, 0, 255));
        // top band: 2 red, 4 green, 2 blue per row
        assert_eq!(t, Color::new(63, 127, 63));
    }

    #[test]
    fn band_means_truncate() {
        let f = Frame::from_fn(4, 4, |x, _| {
            if x == 0 {
                Color::new(3, 0, 0)
            } else {
                Color::BLACK
            }
        });
        let (l, _, _) = edge_averages(&f, 1);
        assert_eq!(l, Color::new(3, 0, 0));
        let (_, t, _) = edge_averages(&f, 1);
        // (3 + 0 + 0 + 0) / 4 = 0.75 -> 0
        assert_eq!(t, Color::BLACK);
    }

    #[test]
    fn combine_weights_top_double() {
        let c = combine_edges(
            Color::new(100, 0, 0),
            Color::new(0, 100, 0),
            Color::new(0, 0, 100),
        );
        assert_eq!(c, Color::new(25, 50, 25));
    }

    #[test]
    fn combine_truncates() {
        let c = combine_edges(Color::new(1, 0, 0), Color::BLACK, Color::new(2, 0, 0));
        // 0.25 + 0.5 = 0.75 -> 0
        assert_eq!(c.r, 0);
    }

    // ── smoothing ──

    #[test]
    fn smoother_starts_from_black() {
        let mut s = Smoother::new(0.5);
        assert_eq!(s.update(Color::new(200, 100, 0)), Color::new(100, 50, 0));
        assert_eq!(s.update(Color::new(200, 100, 0)), Color::new(150, 75, 0));
    }

    #[test]
    fn smoother_alpha_one_tracks_target() {
        let mut s = Smoother::new(1.0);
        assert_eq!(s.update(Color::new(9, 8, 7)), Color::new(9, 8, 7));
    }

    // ── change gate ──

    #[test]
    fn first_color_measured_against_baseline_below_black() {
        let mut g = ChangeGate::new(6);
        assert!(!g.admit(Color::BLACK)); // 3
        assert!(!g.admit(Color::new(1, 1, 1))); // 6, not > 6
        assert!(g.admit(Color::new(2, 1, 1))); // 7
        assert!(!g.admit(Color::new(2, 1, 1)));
    }

    #[test]
    fn small_changes_suppressed_against_last_written() {
        let mut g = ChangeGate::new(6);
        assert!(g.admit(Color::new(100, 100, 100)));
        assert!(!g.admit(Color::new(102, 102, 102))); // 6, not > 6
        assert!(!g.admit(Color::new(103, 101, 101))); // 5
        assert!(g.admit(Color::new(103, 102, 102))); // 7
        assert!(g.admit(Color::new(100, 100, 100))); // 3 + 2 + 2 from the new last
    }

    #[test]
    fn threshold_zero_admits_any_change() {
        let mut g = ChangeGate::new(0);
        assert!(g.admit(Color::BLACK));
        assert!(!g.admit(Color::BLACK));
        assert!(g.admit(Color::new(0, 0, 1)));
    }

    // ── pipeline ──

    #[test]
    fn static_frame_converges_then_goes_quiet() {
        let mut p = SyncPipeline::new(SyncSettings::default());
        let frame = Frame::solid(64, 36, Color::new(200, 120, 40));

        let mut writes = Vec::new();
        for _ in 0..60 {
            if let Some(c) = p.process(&frame) {
                writes.push(c);
            }
        }
        assert!(!writes.is_empty());
        assert!(writes.len() < 60, "near-static frames must be suppressed");
        let last = *writes.last().unwrap();
        assert!(last.distance(Color::new(200, 120, 40)) <= 6 + 3);
        // Once converged nothing more is written.
        assert!(p.process(&frame).is_none());
    }

    #[test]
    fn black_frames_never_write() {
        let mut p = SyncPipeline::new(SyncSettings::default());
        let frame = Frame::solid(16, 16, Color::BLACK);
        for _ in 0..10 {
            assert_eq!(p.process(&frame), None);
        }
    }

    #[test]
    fn first_bright_frame_writes() {
        let mut p = SyncPipeline::new(SyncSettings {
            alpha: 1.0,
            ..SyncSettings::default()
        });
        let frame = Frame::solid(16, 16, Color::new(0, 90, 200));
        assert_eq!(p.process(&frame), Some(Color::new(0, 90, 200)));
        assert_eq!(p.process(&frame), None);
    }
}
