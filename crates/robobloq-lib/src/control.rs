//! Control surface: typed JSON requests dispatched to the scheduler.
//!
//! One request per line in, one response per line out:
//!
//! ```text
//! {"op":"fade","r":255,"g":0,"b":0,"brightness":50,"duration_ms":1000}
//! {"ok":true,"target":{"r":128,"g":0,"b":0},"brightness":50,"duration_ms":1000,"steps":40}
//! ```
//!
//! Integer inputs are taken as `i64` and clamped; only the effect name, the
//! monitor index and color strings are rejected.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::color::{self, Color};
use crate::context::Mode;
use crate::effects;
use crate::error::Result;
use crate::scheduler::{Scheduler, ValidationError};
use crate::sync::{self, SyncSettings};

// ── Requests ──

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Color(ColorRequest),
    Fade(FadeRequest),
    Effect(EffectRequest),
    StopEffect,
    Sync(SyncRequest),
    StopSync,
    Stop,
    Status,
    Off,
}

/// Channels as integers, or `color` as `#RRGGBB` / a color name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ColorRequest {
    pub r: i64,
    pub g: i64,
    pub b: i64,
    pub color: Option<String>,
    pub brightness: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FadeRequest {
    pub r: i64,
    pub g: i64,
    pub b: i64,
    pub color: Option<String>,
    pub brightness: Option<i64>,
    pub duration_ms: Option<i64>,
    pub steps: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EffectRequest {
    pub name: String,
    pub speed: Option<i64>,
    pub r: Option<i64>,
    pub g: Option<i64>,
    pub b: Option<i64>,
    pub color: Option<String>,
    pub brightness: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    pub monitor: Option<i64>,
    pub fps: Option<i64>,
    pub thickness: Option<i64>,
    pub downscale: Option<i64>,
    pub alpha: Option<f64>,
    pub threshold: Option<i64>,
}

/// Values used when a request leaves an optional field out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Defaults {
    pub brightness: u8,
    pub fade_duration_ms: u64,
    pub fade_steps: u32,
    pub effect_speed: u8,
    pub sync: SyncSettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            brightness: 100,
            fade_duration_ms: effects::DEFAULT_FADE_DURATION_MS,
            fade_steps: effects::DEFAULT_FADE_STEPS,
            effect_speed: effects::DEFAULT_EFFECT_SPEED,
            sync: SyncSettings::default(),
        }
    }
}

fn resolve_color(r: i64, g: i64, b: i64, named: Option<&str>) -> Result<Color> {
    match named {
        Some(s) => color::parse_color(s)
            .map_err(|_| ValidationError::InvalidColor(s.trim().to_string()).into()),
        None => Ok(Color::clamped(r, g, b)),
    }
}

impl SyncRequest {
    /// Merge over `base`, clamping numbers. Monitor index < 1 is rejected.
    pub fn settings(&self, base: SyncSettings) -> Result<SyncSettings> {
        let monitor = match self.monitor {
            None => base.monitor,
            Some(m) if m >= 1 => m as usize,
            Some(m) => {
                return Err(ValidationError::InvalidMonitor {
                    index: m,
                    available: 0,
                }
                .into());
            }
        };
        Ok(SyncSettings {
            monitor,
            fps: self.fps.map_or(base.fps, sync::clamp_fps),
            thickness: self.thickness.map_or(base.thickness, sync::clamp_thickness),
            downscale: self.downscale.map_or(base.downscale, sync::clamp_downscale),
            alpha: self.alpha.map_or(base.alpha, sync::clamp_alpha),
            threshold: self.threshold.map_or(base.threshold, sync::clamp_threshold),
        }
        .clamped())
    }
}

// ── Responses ──

/// Payload of a successful response, flattened next to `"ok": true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Color {
        r: u8,
        g: u8,
        b: u8,
        brightness: u8,
    },
    Fade {
        target: Color,
        brightness: u8,
        duration_ms: u64,
        steps: u32,
    },
    Effect {
        effect: &'static str,
        speed: u8,
    },
    Sync {
        sync: SyncSettings,
    },
    Stopped {
        stopped: Option<Mode>,
    },
    Status {
        mode: Mode,
        r: u8,
        g: u8,
        b: u8,
        last_error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(flatten)]
    pub reply: Option<Reply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(reply: Reply) -> Self {
        Response {
            ok: true,
            reply: Some(reply),
            error: None,
        }
    }

    pub fn ack() -> Self {
        Response {
            ok: true,
            reply: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response {
            ok: false,
            reply: None,
            error: Some(message.into()),
        }
    }
}

// ── Dispatch ──

/// A scheduler plus the request defaults.
#[derive(Debug)]
pub struct ControlSurface {
    scheduler: Scheduler,
    defaults: Defaults,
}

impl ControlSurface {
    pub fn new(scheduler: Scheduler, defaults: Defaults) -> Self {
        ControlSurface {
            scheduler,
            defaults,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn brightness(&self, requested: Option<i64>) -> u8 {
        requested.map_or(self.defaults.brightness, color::clamp_brightness)
    }

    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(Some(reply)) => Response::ok(reply),
            Ok(None) => Response::ack(),
            Err(e) => Response::error(e.to_string()),
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Option<Reply>> {
        let s = &self.scheduler;
        let reply = match request {
            Request::Color(req) => {
                let color = resolve_color(req.r, req.g, req.b, req.color.as_deref())?;
                let brightness = self.brightness(req.brightness);
                let applied = s.set_color(color, brightness).await?;
                Reply::Color {
                    r: applied.r,
                    g: applied.g,
                    b: applied.b,
                    brightness,
                }
            }
            Request::Fade(req) => {
                let color = resolve_color(req.r, req.g, req.b, req.color.as_deref())?;
                let brightness = self.brightness(req.brightness);
                let duration_ms = req
                    .duration_ms
                    .map_or(self.defaults.fade_duration_ms, effects::clamp_fade_duration);
                let steps = req
                    .steps
                    .map_or(self.defaults.fade_steps, effects::clamp_fade_steps);
                let target = s.fade(color, brightness, duration_ms, steps).await;
                Reply::Fade {
                    target,
                    brightness,
                    duration_ms,
                    steps,
                }
            }
            Request::Effect(req) => {
                let base = match (req.color.as_deref(), req.r, req.g, req.b) {
                    (Some(named), ..) => Some(resolve_color(0, 0, 0, Some(named))?),
                    (None, None, None, None) => None,
                    (None, r, g, b) => Some(Color::clamped(
                        r.unwrap_or(0),
                        g.unwrap_or(0),
                        b.unwrap_or(0),
                    )),
                };
                let speed = req
                    .speed
                    .map_or(self.defaults.effect_speed, effects::clamp_speed);
                let brightness = self.brightness(req.brightness);
                let kind = s.start_effect(&req.name, speed, base, brightness).await?;
                Reply::Effect {
                    effect: kind.name(),
                    speed,
                }
            }
            Request::StopEffect => Reply::Stopped {
                stopped: s.stop_effect().await,
            },
            Request::Sync(req) => {
                let settings = req.settings(self.defaults.sync)?;
                let applied = s.start_sync(settings).await?;
                Reply::Sync { sync: applied }
            }
            Request::StopSync => Reply::Stopped {
                stopped: s.stop_sync().await,
            },
            Request::Stop => Reply::Stopped {
                stopped: s.stop().await,
            },
            Request::Status => {
                let st = s.status();
                Reply::Status {
                    mode: st.mode,
                    r: st.color.r,
                    g: st.color.g,
                    b: st.color.b,
                    last_error: st.last_error,
                }
            }
            Request::Off => {
                s.off().await?;
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    /// Parse and handle one JSON line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::error(format!("Invalid request: {e}")),
        }
    }

    /// Serve JSON lines from `reader` until EOF, answering on `writer`.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            let mut out = serde_json::to_string(&response).map_err(std::io::Error::other)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok(())
    }
}
