//! `fade` subcommand: fade to a color and exit once the last step lands
//! (or on Ctrl+C).

use std::path::Path;
use std::sync::atomic::Ordering;

use robobloq_lib::effects;

use super::{Color, Config, RUNNING, Result, color, open_scheduler, run_until_interrupted, runtime};

/// Optional fade parameters; `None` falls back to the config defaults.
pub(super) struct FadeArgs {
    pub brightness: Option<i64>,
    pub duration_ms: Option<i64>,
    pub steps: Option<i64>,
}

pub(super) fn cmd_fade(
    config: &Config,
    requested: Color,
    args: FadeArgs,
    dev: Option<&Path>,
) -> Result<()> {
    let defaults = config.control_defaults();
    let brightness = args.brightness.map_or(defaults.brightness, color::clamp_brightness);
    let duration_ms = args
        .duration_ms
        .map_or(defaults.fade_duration_ms, effects::clamp_fade_duration);
    let steps = args.steps.map_or(defaults.fade_steps, effects::clamp_fade_steps);

    let (scheduler, path) = open_scheduler(config, dev)?;
    let start = scheduler.current_color();

    let target = runtime()?.block_on(async {
        let target = scheduler.fade(requested, brightness, duration_ms, steps).await;
        run_until_interrupted(&scheduler).await.map(|()| target)
    })?;

    if !RUNNING.load(Ordering::SeqCst) {
        println!("[fade] interrupted at {}", scheduler.current_color());
        return Ok(());
    }

    println!(
        "OK: faded {start} -> {target} in {duration_ms} ms ({steps} steps) on {}",
        path.display()
    );
    Ok(())
}
