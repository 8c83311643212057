//! Configuration module.
//!
//! Handles loading and validating `config.toml`. Stock defaults are
//! overridden by whatever the user file specifies; everything else keeps
//! its default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [cache]
//! shared = true             # Use the process-wide cache
//! max_memory_mb = 2048.0    # Cache memory budget
//! max_open_files = 100      # Open file handle limit
//! autotile = 0              # Tile size for untiled files (0 = off)
//!
//! [write]
//! # format = "png"          # Output format (default: from the file extension)
//! # data_format = "uint16"  # Pixel data type (default: keep the source's)
//! # tiles = [64, 64]        # Request tiled output
//!
//! [write.attributes]
//! # Software = "imageio"    # Stored in PNG text chunks and TIFF tags
//!
//! [processing]
//! # max_processes = 4       # Parallel readers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::attribute::AttrValue;
use crate::imagespec::ImageSpec;
use crate::native::codec;
use crate::typedesc::TypeDesc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Image cache attributes.
    pub cache: CacheConfig,
    /// Defaults applied when writing files.
    pub write: WriteConfig,
    /// Parallel reading settings.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.write.validate()
    }
}

/// Image cache attributes, applied through the cache's option setter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub shared: bool,
    pub max_memory_mb: f32,
    pub max_open_files: i32,
    pub autotile: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared: true,
            max_memory_mb: 2048.0,
            max_open_files: 100,
            autotile: 0,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_memory_mb.is_nan() || self.max_memory_mb <= 0.0 {
            return Err(ConfigError::Validation(
                "cache.max_memory_mb must be positive".into(),
            ));
        }
        if self.max_open_files < 1 {
            return Err(ConfigError::Validation(
                "cache.max_open_files must be at least 1".into(),
            ));
        }
        if self.autotile < 0 {
            return Err(ConfigError::Validation(
                "cache.autotile must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Write defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteConfig {
    /// Output format name; inferred from the file extension when absent.
    pub format: Option<String>,
    /// Pixel data type name, e.g. `"uint8"`, `"uint16"`, `"float"`.
    pub data_format: Option<String>,
    /// Tile size as `[width, height]`.
    pub tiles: Option<[i32; 2]>,
    /// Attributes set on the spec of every written image. Which of them
    /// reach the file depends on the output format.
    pub attributes: BTreeMap<String, toml::Value>,
}

impl WriteConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(format) = &self.format {
            codec::output_format(Path::new(""), format)
                .map_err(|e| ConfigError::Validation(format!("write.format: {e}")))?;
        }
        if let Some(name) = &self.data_format {
            match name.parse::<TypeDesc>() {
                Ok(TypeDesc::String | TypeDesc::Unknown) => {
                    return Err(ConfigError::Validation(format!(
                        "write.data_format: '{name}' is not a pixel data type"
                    )));
                }
                Ok(_) => {}
                Err(e) => return Err(ConfigError::Validation(format!("write.data_format: {e}"))),
            }
        }
        if let Some([w, h]) = self.tiles
            && (w < 0 || h < 0)
        {
            return Err(ConfigError::Validation(
                "write.tiles values must not be negative".into(),
            ));
        }
        for (name, value) in &self.attributes {
            AttrValue::try_from(value)
                .map_err(|e| ConfigError::Validation(format!("write.attributes.{name}: {e}")))?;
        }
        Ok(())
    }

    /// The configured data format, or `Unknown` to keep the source's.
    pub fn data_format(&self) -> TypeDesc {
        self.data_format
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or_default()
    }

    /// Stamp the configured attributes onto `spec`.
    pub fn apply_attributes(&self, spec: &mut ImageSpec) -> crate::Result<()> {
        for (name, value) in &self.attributes {
            spec.set_attribute_toml(name, value)?;
        }
        Ok(())
    }
}

/// Parallel reading settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel readers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Stock defaults as a TOML value, the base user files are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load and validate the config file at `path`, falling back to stock
/// defaults for everything it does not set (or entirely, if it is absent).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(stock_defaults_value()?, overlay),
        None => stock_defaults_value()?,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imageio configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Image cache
# ---------------------------------------------------------------------------
[cache]
# Read through the process-wide cache shared by every buffer.
# Set to false to give this run a private cache.
shared = true

# Memory budget for cached pixels, in megabytes.
max_memory_mb = 2048.0

# Maximum number of files held open at once.
max_open_files = 100

# Present untiled files to readers as tiles of this size (0 = off).
autotile = 0

# ---------------------------------------------------------------------------
# Writing
# ---------------------------------------------------------------------------
[write]
# Output format. When unset, chosen from the output file's extension.
# One of: png, jpeg, tiff, webp.
# format = "png"

# Pixel data type to write. When unset, the source's data type is kept.
# One of: uint8, int8, uint16, int16, uint32, int32, half, float, double.
# data_format = "uint16"

# Request tiled output as [width, height]. Formats without tiling ignore it.
# tiles = [64, 64]

# Metadata attributes set on every written image. Values must be strings,
# integers or floats. PNG stores them all as text chunks (Orientation
# excepted). TIFF stores Artist, Copyright, DateTime, HostComputer,
# ImageDescription, Make, Model, Software and Orientation. JPEG and WebP
# store none.
[write.attributes]
# Software = "imageio"
# Copyright = "CC-BY 4.0"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of files read in parallel by `imageio stats`.
# When unset, uses all CPU cores. Values above the core count are clamped.
# max_processes = 4
"##
}
