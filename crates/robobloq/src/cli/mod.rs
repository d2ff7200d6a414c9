//! CLI subcommands: one-shot color, fades, effects, screen sync, JSON serve.

mod config_cmd;
mod devices;
mod effect;
mod fade;
mod serve;
mod set;
mod sync_cmd;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use robobloq_lib::color::{self, Color};
pub(super) use robobloq_lib::config::Config;
pub(super) use robobloq_lib::context::{DriveContext, Mode};
pub(super) use robobloq_lib::device::{self, DiscoveredDevice};
pub(super) use robobloq_lib::error::Result;
pub(super) use robobloq_lib::scheduler::Scheduler;

const PADDING: usize = 2;

/// How often long-running commands check for Ctrl+C.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

// ── Shared setup ──

/// Load config from `custom` (or the default path), logging parse warnings
/// and validation problems. Always returns a usable config.
pub(super) fn load_config(custom: Option<&Path>) -> Config {
    let (config, warnings) = match custom {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    if let Err(problems) = config.validate() {
        for p in &problems {
            log::warn!("[config] {p}");
        }
    }
    config
}

/// Open the device (`--dev`, then config `device_path`, then discovery)
/// and wrap it in a scheduler seeded with the configured initial color.
pub(super) fn open_scheduler(config: &Config, dev: Option<&Path>) -> Result<(Scheduler, PathBuf)> {
    let path = dev.map(Path::to_path_buf).or_else(|| config.device_path());
    let controller = device::open_device(path.as_deref())?;
    let path = controller.path().to_path_buf();
    log::debug!("using {}", path.display());
    let ctx = DriveContext::new(controller, config.initial_color());
    Ok((Scheduler::new(ctx), path))
}

pub(super) fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Block until Ctrl+C or until the running driver ends on its own,
/// then stop whatever is still running.
pub(super) async fn wait_for_driver(scheduler: &Scheduler) {
    wait_while(scheduler, &RUNNING).await;
}

async fn wait_while(scheduler: &Scheduler, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) && is_driving(scheduler.status().mode) {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    scheduler.stop().await;
}

/// [`wait_for_driver`], then report the driver's error if it ended by failing.
pub(super) async fn run_until_interrupted(scheduler: &Scheduler) -> Result<()> {
    wait_for_driver(scheduler).await;
    driver_outcome(scheduler)
}

/// True while a background driver owns the bar.
fn is_driving(mode: Mode) -> bool {
    !matches!(mode, Mode::Idle | Mode::Manual)
}

/// Surface a driver failure recorded in the shared state as an error.
pub(super) fn driver_outcome(scheduler: &Scheduler) -> Result<()> {
    match scheduler.status().last_error {
        Some(e) => Err(std::io::Error::other(e).into()),
        None => Ok(()),
    }
}

/// Parse an optional `--color` value (hex or name).
pub(super) fn parse_base(color: Option<&str>) -> Result<Option<Color>> {
    color.map(color::parse_color).transpose()
}

#[derive(Subcommand)]
pub enum Command {
    /// Set a static color once
    Set {
        /// Red channel (0-255, clamped)
        #[arg(long, allow_negative_numbers = true)]
        r: i64,
        /// Green channel (0-255, clamped)
        #[arg(long, allow_negative_numbers = true)]
        g: i64,
        /// Blue channel (0-255, clamped)
        #[arg(long, allow_negative_numbers = true)]
        b: i64,
        /// Brightness percentage (0-100, default from config)
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<i64>,
        /// Path to hidraw device (auto-detect if omitted)
        #[arg(long, value_name = "PATH")]
        dev: Option<PathBuf>,
    },

    /// Fade from the configured initial color to a target color
    Fade {
        #[arg(long, allow_negative_numbers = true)]
        r: i64,
        #[arg(long, allow_negative_numbers = true)]
        g: i64,
        #[arg(long, allow_negative_numbers = true)]
        b: i64,
        /// Brightness percentage (0-100, default from config)
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<i64>,
        /// Fade duration in milliseconds (0-60000, default from config)
        #[arg(long, allow_negative_numbers = true)]
        duration_ms: Option<i64>,
        /// Number of steps (1-300, default from config)
        #[arg(long, allow_negative_numbers = true)]
        steps: Option<i64>,
        /// Path to hidraw device (auto-detect if omitted)
        #[arg(long, value_name = "PATH")]
        dev: Option<PathBuf>,
    },

    /// Run a periodic effect (pulse or rainbow) until Ctrl+C
    Effect {
        /// Effect name: pulse or rainbow
        name: String,
        /// Speed (1 = slowest, 100 = fastest, default from config)
        #[arg(long, allow_negative_numbers = true)]
        speed: Option<i64>,
        /// Base color for pulse, as #RRGGBB or a name (default: initial color)
        #[arg(long)]
        color: Option<String>,
        /// Brightness percentage (0-100, default from config)
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<i64>,
        /// Path to hidraw device (auto-detect if omitted)
        #[arg(long, value_name = "PATH")]
        dev: Option<PathBuf>,
    },

    /// Follow the screen's edge colors from a raw rgb24 frame stream until Ctrl+C
    Sync {
        /// Frame stream (file or FIFO, `-` for stdin)
        #[arg(long, default_value = "-", value_name = "PATH")]
        input: PathBuf,
        /// Frame width in pixels
        #[arg(long, default_value_t = 1920)]
        width: usize,
        /// Frame height in pixels
        #[arg(long, default_value_t = 1080)]
        height: usize,
        #[command(flatten)]
        tuning: sync_cmd::SyncArgs,
        /// Path to hidraw device (auto-detect if omitted)
        #[arg(long, value_name = "PATH")]
        dev: Option<PathBuf>,
    },

    /// Answer JSON-line control requests on stdin/stdout
    Serve {
        /// Optional rgb24 frame stream enabling `sync` requests (file or FIFO)
        #[arg(long, value_name = "PATH", requires_all = ["width", "height"])]
        input: Option<PathBuf>,
        /// Frame width in pixels
        #[arg(long)]
        width: Option<usize>,
        /// Frame height in pixels
        #[arg(long)]
        height: Option<usize>,
        /// Path to hidraw device (auto-detect if omitted)
        #[arg(long, value_name = "PATH")]
        dev: Option<PathBuf>,
    },

    /// List hidraw nodes and mark the vendor LED interface
    Devices,

    /// Show current configuration and file paths
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Devices => return devices::cmd_devices(json),
        Command::Config { write } => return config_cmd::cmd_config(json, config_path, write),
        _ => {}
    }

    if json {
        warn_json_unsupported(cmd.name());
    }
    let config = load_config(config_path);

    match cmd {
        Command::Set {
            r,
            g,
            b,
            brightness,
            dev,
        } => set::cmd_set(&config, Color::clamped(r, g, b), brightness, dev.as_deref()),
        Command::Fade {
            r,
            g,
            b,
            brightness,
            duration_ms,
            steps,
            dev,
        } => fade::cmd_fade(
            &config,
            Color::clamped(r, g, b),
            fade::FadeArgs {
                brightness,
                duration_ms,
                steps,
            },
            dev.as_deref(),
        ),
        Command::Effect {
            name,
            speed,
            color,
            brightness,
            dev,
        } => effect::cmd_effect(
            &config,
            &name,
            speed,
            color.as_deref(),
            brightness,
            dev.as_deref(),
        ),
        Command::Sync {
            input,
            width,
            height,
            tuning,
            dev,
        } => sync_cmd::cmd_sync(&config, &input, width, height, &tuning, dev.as_deref()),
        Command::Serve {
            input,
            width,
            height,
            dev,
        } => {
            let frames = match (input, width, height) {
                (Some(p), Some(w), Some(h)) => Some((p, w, h)),
                _ => None,
            };
            serve::cmd_serve(&config, frames, dev.as_deref())
        }
        Command::Devices | Command::Config { .. } => Ok(()),
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Fade { .. } => "fade",
            Command::Effect { .. } => "effect",
            Command::Sync { .. } => "sync",
            Command::Serve { .. } => "serve",
            Command::Devices => "devices",
            Command::Config { .. } => "config",
        }
    }
}


#[cfg(test)]
mod setup_tests {
    use super::*;

    #[test]
    fn load_config_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_config_reads_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "brightness = 40\neffect_speed = 90\n").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.brightness, 40);
        assert_eq!(config.effect_speed, 90);
    }

    #[test]
    fn open_scheduler_prefers_dev_flag() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("hidraw7");
        let config = Config {
            device_path: "/nonexistent/hidraw0".into(),
            ..Config::default()
        };
        let (scheduler, path) = open_scheduler(&config, Some(&node)).unwrap();
        assert_eq!(path, node);
        assert_eq!(scheduler.status().mode, Mode::Idle);
        assert_eq!(scheduler.current_color(), Color::WARM_WHITE);
    }

    #[test]
    fn parse_base_accepts_names_and_rejects_garbage() {
        assert_eq!(parse_base(None).unwrap(), None);
        assert_eq!(parse_base(Some("#00FF00")).unwrap(), Some(Color::new(0, 255, 0)));
        assert!(parse_base(Some("not-a-color")).is_err());
    }

    fn node(dir: &Path) -> PathBuf {
        let node = dir.join("hidraw0");
        std::fs::write(&node, b"").unwrap();
        node
    }

    #[tokio::test]
    async fn cleared_flag_stops_long_fade() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = open_scheduler(&Config::default(), Some(&node(dir.path()))).unwrap();
        scheduler.fade(Color::WHITE, 100, 60_000, 2).await;

        let running = AtomicBool::new(false);
        let started = std::time::Instant::now();
        wait_while(&scheduler, &running).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(scheduler.status().mode, Mode::Idle);
        assert_ne!(scheduler.current_color(), Color::WHITE);
        assert!(driver_outcome(&scheduler).is_ok());
    }

    #[tokio::test]
    async fn finished_fade_ends_wait() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());
        let (scheduler, _) = open_scheduler(&Config::default(), Some(&node)).unwrap();
        scheduler.fade(Color::new(0, 0, 200), 100, 0, 3).await;

        let running = AtomicBool::new(true);
        wait_while(&scheduler, &running).await;

        assert_eq!(scheduler.status().mode, Mode::Idle);
        assert_eq!(scheduler.current_color(), Color::new(0, 0, 200));
        assert_eq!(&std::fs::read(&node).unwrap()[6..=8], &[0, 0, 200]);
    }

    #[test]
    fn manual_and_idle_are_not_driving() {
        assert!(!is_driving(Mode::Idle));
        assert!(!is_driving(Mode::Manual));
        assert!(is_driving(Mode::Fade));
        assert!(is_driving(Mode::Sync));
    }

    #[test]
    fn command_names() {
        assert_eq!(Command::Devices.name(), "devices");
        assert_eq!(Command::Config { write: false }.name(), "config");
    }
}
