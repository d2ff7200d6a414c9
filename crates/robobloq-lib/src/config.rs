//! Application configuration: TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::{self, Color};
use crate::control::Defaults;
use crate::effects;
use crate::sync::SyncSettings;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# Robobloq LED configuration, read by robobloq-cli at startup.\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// hidraw node to drive. Empty = auto-discover the vendor interface.
    #[serde(default)]
    pub device_path: String,

    /// Color the bar is assumed to show at startup (seeds the first fade).
    #[serde(default = "default_initial_color")]
    pub initial_color: String,

    /// Default brightness percentage (0..100) for color, fade and effects.
    #[serde(default = "default_brightness")]
    pub brightness: u8,

    /// Default fade duration in milliseconds (0..60000).
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,

    /// Default number of fade steps (1..300).
    #[serde(default = "default_fade_steps")]
    pub fade_steps: u32,

    /// Default effect speed (1 = slowest, 100 = fastest).
    #[serde(default = "default_effect_speed")]
    pub effect_speed: u8,

    /// Screen sync defaults.
    /// Example in TOML: `[sync]` / `fps = 30` / `threshold = 8`
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_initial_color() -> String {
    color::format_color(Color::WARM_WHITE)
}
fn default_brightness() -> u8 {
    100
}
fn default_fade_duration_ms() -> u64 {
    effects::DEFAULT_FADE_DURATION_MS
}
fn default_fade_steps() -> u32 {
    effects::DEFAULT_FADE_STEPS
}
fn default_effect_speed() -> u8 {
    effects::DEFAULT_EFFECT_SPEED
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_path: String::new(),
            initial_color: default_initial_color(),
            brightness: default_brightness(),
            fade_duration_ms: default_fade_duration_ms(),
            fade_steps: default_fade_steps(),
            effect_speed: default_effect_speed(),
            sync: SyncSettings::default(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The `initial_color` field could not be parsed as a valid color.
    InvalidColor(String),
    /// A numeric field lies outside its documented range.
    OutOfRange {
        field: &'static str,
        value: String,
        range: &'static str,
    },
    /// `device_path` is set but does not exist.
    InvalidDevicePath(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidColor(e) => write!(f, "Invalid initial color: {e}"),
            ConfigError::OutOfRange {
                field,
                value,
                range,
            } => write!(f, "{field} = {value} is out of range ({range})"),
            ConfigError::InvalidDevicePath(p) => write!(f, "Device path not found: {p}"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("robobloq"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Explicit device node, or `None` to auto-discover.
    pub fn device_path(&self) -> Option<PathBuf> {
        let p = self.device_path.trim();
        (!p.is_empty()).then(|| PathBuf::from(p))
    }

    /// Parsed `initial_color`, falling back to warm white.
    pub fn initial_color(&self) -> Color {
        color::parse_color(&self.initial_color).unwrap_or_else(|e| {
            log::warn!("{e}; assuming {}", Color::WARM_WHITE);
            Color::WARM_WHITE
        })
    }

    /// Defaults for requests that omit optional fields, clamped.
    pub fn control_defaults(&self) -> Defaults {
        Defaults {
            brightness: color::clamp_brightness(self.brightness as i64),
            fade_duration_ms: effects::clamp_fade_duration(self.fade_duration_ms as i64),
            fade_steps: effects::clamp_fade_steps(self.fade_steps as i64),
            effect_speed: effects::clamp_speed(self.effect_speed as i64),
            sync: self.sync.clamped(),
        }
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// Returns `Ok(())` if valid, or `Err(Vec<ConfigError>)` with all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if let Err(e) = color::parse_color(&self.initial_color) {
            errors.push(ConfigError::InvalidColor(e.to_string()));
        }

        let mut range = |field: &'static str, ok: bool, value: String, range: &'static str| {
            if !ok {
                errors.push(ConfigError::OutOfRange {
                    field,
                    value,
                    range,
                });
            }
        };
        range(
            "brightness",
            self.brightness <= 100,
            self.brightness.to_string(),
            "0..100",
        );
        range(
            "fade_duration_ms",
            self.fade_duration_ms <= effects::MAX_FADE_DURATION_MS,
            self.fade_duration_ms.to_string(),
            "0..60000",
        );
        range(
            "fade_steps",
            (1..=effects::MAX_FADE_STEPS).contains(&self.fade_steps),
            self.fade_steps.to_string(),
            "1..300",
        );
        range(
            "effect_speed",
            (1..=100).contains(&self.effect_speed),
            self.effect_speed.to_string(),
            "1..100",
        );
        range(
            "sync.monitor",
            self.sync.monitor >= 1,
            self.sync.monitor.to_string(),
            ">= 1",
        );
        range(
            "sync.fps",
            (1..=120).contains(&self.sync.fps),
            self.sync.fps.to_string(),
            "1..120",
        );
        range(
            "sync.thickness",
            (1..=1000).contains(&self.sync.thickness),
            self.sync.thickness.to_string(),
            "1..1000",
        );
        range(
            "sync.downscale",
            (1..=16).contains(&self.sync.downscale),
            self.sync.downscale.to_string(),
            "1..16",
        );
        range(
            "sync.alpha",
            (0.01..=1.0).contains(&self.sync.alpha),
            self.sync.alpha.to_string(),
            "0.01..1.0",
        );
        range(
            "sync.threshold",
            self.sync.threshold <= 765,
            self.sync.threshold.to_string(),
            "0..765",
        );

        if let Some(p) = self.device_path()
            && !p.exists()
        {
            errors.push(ConfigError::InvalidDevicePath(p.display().to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
