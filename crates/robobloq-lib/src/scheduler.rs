//! Driver scheduler: at most one color driver owns the bar at a time.
//!
//! Every start operation holds the switch gate for its whole duration:
//! validate → cancel and await the running driver → spawn the new one. The
//! spawned driver takes the drive lock before its first write, so writes
//! from two drivers can never interleave.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::capture::FrameSource;
use crate::color::{Color, apply_brightness};
use crate::context::{DriveContext, DriveState, Mode};
use crate::effects::{self, EffectKind};
use crate::error::Result;
use crate::sync::{SyncPipeline, SyncSettings};

// ── Error type ──

/// A request rejected before anything running was touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    UnknownEffect(String),
    InvalidMonitor { index: i64, available: usize },
    InvalidColor(String),
    /// Screen sync requested without a frame source.
    CaptureUnavailable,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownEffect(name) => {
                write!(f, "Unknown effect: {name} (use pulse or rainbow)")
            }
            ValidationError::InvalidMonitor { index, available } => {
                write!(
                    f,
                    "Invalid monitor index {index}. Available: 1..{available}"
                )
            }
            ValidationError::InvalidColor(e) => write!(f, "Invalid color: {e}"),
            ValidationError::CaptureUnavailable => write!(f, "Screen capture is not available"),
        }
    }
}

impl std::error::Error for ValidationError {}

// ── Stop signal ──

/// Cooperative cancellation token shared by the scheduler and one driver.
///
/// Drivers check it once per iteration; [`StopSignal::sleep`] returns early
/// as soon as it fires.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<StopInner>);

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless stopped first. Returns `true` if stopped.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = notified => true,
        }
    }

    /// Resolve once [`StopSignal::stop`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

// ── Scheduler ──

struct ActiveDriver {
    mode: Mode,
    stop: StopSignal,
    /// Closed when the driver task ends.
    done: watch::Receiver<()>,
    handle: JoinHandle<()>,
}

impl ActiveDriver {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct Scheduler {
    ctx: Arc<DriveContext>,
    source: Option<Arc<dyn FrameSource>>,
    active: tokio::sync::Mutex<Option<ActiveDriver>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("ctx", &self.ctx)
            .field("capture", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(ctx: DriveContext) -> Self {
        Scheduler {
            ctx: Arc::new(ctx),
            source: None,
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Enable screen sync with the given frame source.
    pub fn with_frame_source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn status(&self) -> DriveState {
        self.ctx.snapshot()
    }

    pub fn current_color(&self) -> Color {
        self.ctx.current_color()
    }

    /// Cancel the running driver (if any) and wait for it to exit.
    ///
    /// Returns the driver's mode if it was still running.
    async fn cancel(&self, slot: &mut Option<ActiveDriver>) -> Option<Mode> {
        let active = slot.take()?;
        let was_running = active.is_running();
        active.stop.stop();
        if let Err(e) = active.handle.await {
            log::error!("{} driver aborted: {e}", active.mode);
            self.ctx.record_error(format!("{} driver aborted: {e}", active.mode));
        }
        if was_running {
            log::debug!("{} driver cancelled", active.mode);
            self.ctx.set_mode(Mode::Idle);
            Some(active.mode)
        } else {
            None
        }
    }

    fn spawn<F, Fut>(&self, slot: &mut Option<ActiveDriver>, mode: Mode, body: F)
    where
        F: FnOnce(Arc<DriveContext>, StopSignal) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let stop = StopSignal::new();
        let (done_tx, done_rx) = watch::channel(());
        let ctx = Arc::clone(&self.ctx);
        let driver = body(Arc::clone(&self.ctx), stop.clone());

        self.ctx.set_mode(mode);
        let handle = tokio::spawn(async move {
            let _done = done_tx;
            match driver.await {
                Ok(()) => ctx.set_mode(Mode::Idle),
                Err(e) => {
                    log::error!("{mode} driver stopped: {e}");
                    ctx.record_error(e.to_string());
                }
            }
        });

        *slot = Some(ActiveDriver {
            mode,
            stop,
            done: done_rx,
            handle,
        });
    }

    /// Set one color immediately, tearing down whatever runs.
    ///
    /// Returns the color actually written (after brightness).
    pub async fn set_color(&self, color: Color, brightness: u8) -> Result<Color> {
        let applied = apply_brightness(color, brightness);
        let mut slot = self.active.lock().await;
        self.cancel(&mut slot).await;

        let mut device = self.ctx.lock_device().await;
        self.ctx.write(&mut device, applied)?;
        self.ctx.set_mode(Mode::Manual);
        Ok(applied)
    }

    /// Cancel everything and turn the bar black.
    pub async fn off(&self) -> Result<()> {
        self.set_color(Color::BLACK, 100).await.map(|_| ())
    }

    /// Start a fade from the current color to `color` at `brightness`.
    ///
    /// `duration_ms` is clamped to `[0, 60000]`, `steps` to `[1, 300]`.
    /// Returns the fade target.
    pub async fn fade(&self, color: Color, brightness: u8, duration_ms: u64, steps: u32) -> Color {
        let target = apply_brightness(color, brightness);
        let duration_ms = duration_ms.min(effects::MAX_FADE_DURATION_MS);
        let steps = steps.clamp(1, effects::MAX_FADE_STEPS);

        let mut slot = self.active.lock().await;
        self.cancel(&mut slot).await;
        self.spawn(&mut slot, Mode::Fade, move |ctx, stop| {
            run_fade(ctx, stop, target, duration_ms, steps)
        });
        log::debug!("fade to {target} over {duration_ms} ms / {steps} steps");
        target
    }

    /// Start a named periodic effect.
    ///
    /// An unknown name is rejected before the running driver is touched.
    /// Pulse without `base` pulses the color currently on the bar.
    pub async fn start_effect(
        &self,
        name: &str,
        speed: u8,
        base: Option<Color>,
        brightness: u8,
    ) -> Result<EffectKind> {
        let kind: EffectKind = name
            .parse()
            .map_err(|_| ValidationError::UnknownEffect(name.trim().to_string()))?;
        let speed = speed.clamp(1, 100);
        let brightness = brightness.min(100);

        let mut slot = self.active.lock().await;
        self.cancel(&mut slot).await;
        match kind {
            EffectKind::Pulse => {
                let base = base.unwrap_or_else(|| self.ctx.current_color());
                let base = apply_brightness(base, brightness);
                self.spawn(&mut slot, Mode::Pulse, move |ctx, stop| {
                    run_pulse(ctx, stop, base, speed)
                });
            }
            EffectKind::Rainbow => {
                self.spawn(&mut slot, Mode::Rainbow, move |ctx, stop| {
                    run_rainbow(ctx, stop, speed, brightness)
                });
            }
        }
        log::debug!("{kind} effect started at speed {speed}");
        Ok(kind)
    }

    /// Stop the running effect. Other drivers are left alone.
    pub async fn stop_effect(&self) -> Option<Mode> {
        self.stop_if(Mode::is_effect).await
    }

    /// Start screen sync.
    ///
    /// Numeric settings are clamped; the monitor index is validated against
    /// the frame source before the running driver is touched.
    pub async fn start_sync(&self, settings: SyncSettings) -> Result<SyncSettings> {
        let settings = settings.clamped();
        let source = self
            .source
            .clone()
            .ok_or(ValidationError::CaptureUnavailable)?;
        if !source.has_monitor(settings.monitor) {
            return Err(ValidationError::InvalidMonitor {
                index: settings.monitor as i64,
                available: source.monitors().len(),
            }
            .into());
        }

        let mut slot = self.active.lock().await;
        self.cancel(&mut slot).await;
        self.spawn(&mut slot, Mode::Sync, move |ctx, stop| {
            run_sync(ctx, stop, source, settings)
        });
        log::debug!(
            "sync started on monitor {} @ {} fps, thickness {}",
            settings.monitor,
            settings.fps,
            settings.thickness
        );
        Ok(settings)
    }

    /// Stop screen sync. Other drivers are left alone.
    pub async fn stop_sync(&self) -> Option<Mode> {
        self.stop_if(|m| m == Mode::Sync).await
    }

    /// Stop whatever runs; the bar keeps its current color.
    pub async fn stop(&self) -> Option<Mode> {
        let mut slot = self.active.lock().await;
        self.cancel(&mut slot).await
    }

    async fn stop_if(&self, pred: impl Fn(Mode) -> bool) -> Option<Mode> {
        let mut slot = self.active.lock().await;
        let matches = slot
            .as_ref()
            .is_some_and(|a| a.is_running() && pred(a.mode));
        if !matches {
            return None;
        }
        self.cancel(&mut slot).await
    }

    /// Wait until the running driver ends on its own (or is stopped).
    ///
    /// Returns immediately when nothing runs.
    pub async fn wait(&self) {
        let done = {
            let slot = self.active.lock().await;
            slot.as_ref().map(|a| a.done.clone())
        };
        if let Some(mut done) = done {
            while done.changed().await.is_ok() {}
        }
    }
}

// ── Driver bodies ──

async fn run_fade(
    ctx: Arc<DriveContext>,
    stop: StopSignal,
    target: Color,
    duration_ms: u64,
    steps: u32,
) -> Result<()> {
    let mut device = ctx.lock_device().await;
    let start = ctx.current_color();
    let delay = effects::fade_step_delay(duration_ms, steps);

    for color in effects::fade_sequence(start, target, steps) {
        if stop.is_stopped() {
            return Ok(());
        }
        ctx.write(&mut device, color)?;
        if stop.sleep(delay).await {
            return Ok(());
        }
    }
    Ok(())
}

async fn run_pulse(ctx: Arc<DriveContext>, stop: StopSignal, base: Color, speed: u8) -> Result<()> {
    let mut device = ctx.lock_device().await;
    let delay = effects::pulse_step_delay(speed);

    loop {
        for level in effects::pulse_levels() {
            if stop.is_stopped() {
                return Ok(());
            }
            ctx.write(&mut device, effects::pulse_color(base, level))?;
            if stop.sleep(delay).await {
                return Ok(());
            }
        }
    }
}

async fn run_rainbow(
    ctx: Arc<DriveContext>,
    stop: StopSignal,
    speed: u8,
    brightness: u8,
) -> Result<()> {
    let mut device = ctx.lock_device().await;
    let delay = effects::rainbow_delay(speed);

    for pos in (0..effects::WHEEL_POSITIONS).cycle() {
        if stop.is_stopped() {
            break;
        }
        ctx.write(&mut device, apply_brightness(effects::wheel(pos), brightness))?;
        if stop.sleep(delay).await {
            break;
        }
    }
    Ok(())
}

async fn run_sync(
    ctx: Arc<DriveContext>,
    stop: StopSignal,
    source: Arc<dyn FrameSource>,
    settings: SyncSettings,
) -> Result<()> {
    let mut device = ctx.lock_device().await;
    let mut pipeline = SyncPipeline::new(settings);
    let budget = settings.frame_budget();

    while !stop.is_stopped() {
        let tick = Instant::now();

        let src = Arc::clone(&source);
        let monitor = settings.monitor;
        let grab = tokio::task::spawn_blocking(move || src.grab(monitor));
        let frame = tokio::select! {
            joined = grab => joined.map_err(std::io::Error::other)??,
            _ = stop.cancelled() => break,
        };

        if let Some(color) = pipeline.process(&frame) {
            ctx.write(&mut device, color)?;
        }

        let elapsed = tick.elapsed();
        if elapsed < budget {
            if stop.sleep(budget - elapsed).await {
                break;
            }
        } else {
            tokio::task::yield_now().await;
        }
    }
    Ok(())
}
