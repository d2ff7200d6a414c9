//! Drive context: the controller plus the shared "what is on the bar" state.
//!
//! One instance is shared (via `Arc`) by the scheduler and every driver
//! task it spawns. The controller sits behind the async drive lock; the
//! small state record sits behind a plain mutex that is never held across
//! an `.await`.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::color::Color;
use crate::device::{self, Controller, Delivery};

/// Which driver currently owns the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Idle,
    Manual,
    Fade,
    Pulse,
    Rainbow,
    Sync,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Manual => "manual",
            Mode::Fade => "fade",
            Mode::Pulse => "pulse",
            Mode::Rainbow => "rainbow",
            Mode::Sync => "sync",
        }
    }

    /// True for the long-running periodic effects.
    pub fn is_effect(self) -> bool {
        matches!(self, Mode::Pulse | Mode::Rainbow)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of the shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveState {
    pub mode: Mode,
    /// Last color successfully written (or the assumed power-on color).
    pub color: Color,
    pub last_error: Option<String>,
}

pub struct DriveContext {
    device: tokio::sync::Mutex<Controller>,
    state: Mutex<DriveState>,
}

impl fmt::Debug for DriveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveContext")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl DriveContext {
    /// `initial` is what the bar is assumed to show before the first write;
    /// it seeds the first fade.
    pub fn new(controller: Controller, initial: Color) -> Self {
        DriveContext {
            device: tokio::sync::Mutex::new(controller),
            state: Mutex::new(DriveState {
                mode: Mode::Idle,
                color: initial,
                last_error: None,
            }),
        }
    }

    /// Acquire the drive lock. Held by a driver for its whole main loop.
    pub async fn lock_device(&self) -> tokio::sync::MutexGuard<'_, Controller> {
        self.device.lock().await
    }

    fn state(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DriveState {
        self.state().clone()
    }

    pub fn current_color(&self) -> Color {
        self.state().color
    }

    pub fn set_mode(&self, mode: Mode) {
        self.state().mode = mode;
    }

    /// Record a driver failure and fall back to idle.
    pub fn record_error(&self, message: String) {
        let mut state = self.state();
        state.mode = Mode::Idle;
        state.last_error = Some(message);
    }

    /// Write `color` through a held controller and update the current color.
    ///
    /// The current color only changes when the write succeeded.
    pub fn write(&self, controller: &mut Controller, color: Color) -> device::Result<Delivery> {
        let delivery = controller.set_color(color)?;
        self.state().color = color;
        Ok(delivery)
    }
}
