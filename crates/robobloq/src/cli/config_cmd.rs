//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{Config, ConfigOutput, Result, color, kv, kv_indent, kv_width};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>, write: bool) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);

    if write {
        match &config_path {
            Some(p) => {
                config.save_to(p)?;
                log::info!("wrote {}", p.display());
            }
            None => log::warn!("no config directory; nothing written"),
        }
    }
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "device_path:",
            "initial_color:",
            "brightness:",
            "fade_duration_ms:",
            "fade_steps:",
            "effect_speed:",
            "monitor:",
            "fps:",
            "thickness:",
            "downscale:",
            "alpha:",
            "threshold:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    let device_display = match config.device_path() {
        Some(p) => p.display().to_string(),
        None => "(auto-detect)".to_string(),
    };
    kv_indent("device_path:", device_display, w);
    let color_display = match color::parse_color(&config.initial_color) {
        Ok(c) => format!("{} -> {}", config.initial_color, color::format_color(c)),
        Err(_) => format!("{} (invalid)", config.initial_color),
    };
    kv_indent("initial_color:", color_display, w);
    kv_indent("brightness:", format_args!("{}%", config.brightness), w);
    kv_indent("fade_duration_ms:", config.fade_duration_ms, w);
    kv_indent("fade_steps:", config.fade_steps, w);
    kv_indent("effect_speed:", config.effect_speed, w);
    println!();

    println!("Sync:");
    kv_indent("monitor:", config.sync.monitor, w);
    kv_indent("fps:", config.sync.fps, w);
    kv_indent("thickness:", config.sync.thickness, w);
    kv_indent("downscale:", config.sync.downscale, w);
    kv_indent("alpha:", config.sync.alpha, w);
    kv_indent("threshold:", config.sync.threshold, w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
