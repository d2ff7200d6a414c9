//! `effect` subcommand: run pulse or rainbow until Ctrl+C.

use std::path::Path;

use robobloq_lib::effects;

use super::{Config, Result, color, open_scheduler, parse_base, run_until_interrupted, runtime};

pub(super) fn cmd_effect(
    config: &Config,
    name: &str,
    speed: Option<i64>,
    base: Option<&str>,
    brightness: Option<i64>,
    dev: Option<&Path>,
) -> Result<()> {
    let defaults = config.control_defaults();
    let speed = speed.map_or(defaults.effect_speed, effects::clamp_speed);
    let brightness = brightness.map_or(defaults.brightness, color::clamp_brightness);
    let base = parse_base(base)?;

    let (scheduler, path) = open_scheduler(config, dev)?;
    runtime()?.block_on(async {
        let kind = scheduler.start_effect(name, speed, base, brightness).await?;
        println!(
            "[effect] {kind} at speed {speed} on {} (Ctrl+C to stop)",
            path.display()
        );
        run_until_interrupted(&scheduler).await
    })?;

    println!("[effect] stopped");
    Ok(())
}
