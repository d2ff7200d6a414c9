//! `sync` subcommand: drive the bar from a raw frame stream until Ctrl+C.

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use robobloq_lib::capture::RawVideoSource;
use robobloq_lib::control::SyncRequest;

use super::{Config, Result, open_scheduler, run_until_interrupted, runtime};

/// Sync tuning; unset values come from the config `[sync]` table.
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Monitor index (1-based)
    #[arg(long, allow_negative_numbers = true)]
    monitor: Option<i64>,
    /// Capture rate (1-120)
    #[arg(long, allow_negative_numbers = true)]
    fps: Option<i64>,
    /// Edge band thickness in pixels (1-1000)
    #[arg(long, allow_negative_numbers = true)]
    thickness: Option<i64>,
    /// Sample every Nth pixel (1-16)
    #[arg(long, allow_negative_numbers = true)]
    downscale: Option<i64>,
    /// Smoothing factor (0.01-1.0)
    #[arg(long, allow_negative_numbers = true)]
    alpha: Option<f64>,
    /// Minimum color change before a write (0-765)
    #[arg(long, allow_negative_numbers = true)]
    threshold: Option<i64>,
}

impl SyncArgs {
    fn request(&self) -> SyncRequest {
        SyncRequest {
            monitor: self.monitor,
            fps: self.fps,
            thickness: self.thickness,
            downscale: self.downscale,
            alpha: self.alpha,
            threshold: self.threshold,
        }
    }
}

pub(super) fn cmd_sync(
    config: &Config,
    input: &Path,
    width: usize,
    height: usize,
    tuning: &SyncArgs,
    dev: Option<&Path>,
) -> Result<()> {
    let settings = tuning.request().settings(config.control_defaults().sync)?;
    let source = RawVideoSource::open(input, width, height)?;

    let (scheduler, path) = open_scheduler(config, dev)?;
    let scheduler = scheduler.with_frame_source(Arc::new(source));

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let settings = scheduler.start_sync(settings).await?;
        println!(
            "[sync] monitor {} at {} fps from {} on {} (Ctrl+C to stop)",
            settings.monitor,
            settings.fps,
            input.display(),
            path.display()
        );
        run_until_interrupted(&scheduler).await
    });
    // A grab blocked on a stalled stream must not hold up exit.
    rt.shutdown_background();
    outcome?;

    println!("[sync] stopped");
    Ok(())
}
