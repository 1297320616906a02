use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TOOLTIP_PROJECT_LIMIT;
use crate::navigation::Level;

pub const DEFAULT_COLOR: &str = "#ff4500";
const WHITE: Rgb = Rgb(255, 255, 255);
/// The scale starts this fraction of the max below zero so small values stay visible.
const SCALE_FLOOR: f64 = 0.15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dataset is empty; nothing to draw")]
    EmptyDataset,
    #[error("invalid color `{0}` (expected #rgb or #rrggbb)")]
    InvalidColor(String),
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings TOML: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to encode settings TOML: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub overview: Level,
    pub color: String,
    pub transition_ms: u64,
    pub tick_ms: u64,
    pub tooltip_projects: usize,
    /// Project name to a color name (`light_blue`) or hex value.
    pub projects: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overview: Level::Year,
            color: DEFAULT_COLOR.to_string(),
            transition_ms: 500,
            tick_ms: 33,
            tooltip_projects: TOOLTIP_PROJECT_LIMIT,
            projects: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn base_color(&self) -> Result<Rgb, ConfigError> {
        parse_hex_color(&self.color)
    }
}

/// Missing or blank files fall back to defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
        Err(err) => return Err(ConfigError::Io(err)),
    };

    if raw.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings = toml::from_str(&raw)?;
    settings.base_color()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn blend(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |from: u8, to: u8| (from as f64 + (to as f64 - from as f64) * t).round() as u8;
        Rgb(mix(self.0, other.0), mix(self.1, other.1), mix(self.2, other.2))
    }
}

pub fn parse_hex_color(raw: &str) -> Result<Rgb, ConfigError> {
    let invalid = || ConfigError::InvalidColor(raw.to_string());
    let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let expand = |index: usize| channel(hex[index..index + 1].repeat(2).as_str());
            Ok(Rgb(expand(0)?, expand(1)?, expand(2)?))
        }
        6 => Ok(Rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        _ => Err(invalid()),
    }
}

/// Linear value-to-color scale from white to the base color over `[-0.15 * max, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    base: Rgb,
    max: u64,
}

impl ColorScale {
    pub fn new(base: Rgb, max: u64) -> Self {
        Self { base, max }
    }

    pub fn color_for(&self, value: u64) -> Rgb {
        if self.max == 0 {
            return self.base;
        }
        let max = self.max as f64;
        let floor = -SCALE_FLOOR * max;
        let t = (value as f64 - floor) / (max - floor);
        WHITE.blend(self.base, t)
    }
}
