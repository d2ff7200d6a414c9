//! `serve` subcommand: JSON-line control surface on stdin/stdout.
//!
//! Requests are answered until stdin closes. A driver still running at
//! that point keeps going until it finishes or Ctrl+C arrives, so
//! `echo '{"op":"effect","name":"rainbow"}' | robobloq-cli serve` works.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use robobloq_lib::capture::RawVideoSource;
use robobloq_lib::control::ControlSurface;
use tokio::io::BufReader;

use super::{Config, Result, open_scheduler, runtime, wait_for_driver};

pub(super) fn cmd_serve(
    config: &Config,
    frames: Option<(PathBuf, usize, usize)>,
    dev: Option<&Path>,
) -> Result<()> {
    let (mut scheduler, path) = open_scheduler(config, dev)?;
    if let Some((input, width, height)) = frames {
        let source = RawVideoSource::open(&input, width, height)?;
        log::debug!("frames from {} ({width}x{height})", input.display());
        scheduler = scheduler.with_frame_source(Arc::new(source));
    }
    log::info!("serving control requests for {}", path.display());

    let surface = ControlSurface::new(scheduler, config.control_defaults());
    runtime()?.block_on(async {
        surface
            .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await?;
        wait_for_driver(surface.scheduler()).await;
        Ok(())
    })
}
