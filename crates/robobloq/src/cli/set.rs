//! `set` subcommand: write one static color and exit.

use std::path::Path;

use super::{Color, Config, Result, color, open_scheduler, runtime};

pub(super) fn cmd_set(
    config: &Config,
    requested: Color,
    brightness: Option<i64>,
    dev: Option<&Path>,
) -> Result<()> {
    let brightness = brightness.map_or(
        config.control_defaults().brightness,
        color::clamp_brightness,
    );
    let (scheduler, path) = open_scheduler(config, dev)?;

    let applied = runtime()?.block_on(scheduler.set_color(requested, brightness))?;
    log::debug!("wrote {applied} at {brightness}%");

    println!(
        "OK: set ({},{},{}) on {}",
        requested.r,
        requested.g,
        requested.b,
        path.display()
    );
    Ok(())
}
