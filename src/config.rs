//! Config-file support.
//!
//! The YAML file mirrors the CLI flags; explicit CLI values win per field.  The file is found
//! via `--config`, the `LIFX_EMULATOR_CONFIG` environment variable, or auto-detection of
//! `lifx-emulator.yaml` / `lifx-emulator.yml` in the working directory.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_VAR: &str = "LIFX_EMULATOR_CONFIG";
const AUTO_DETECT: [&str; 2] = ["lifx-emulator.yaml", "lifx-emulator.yml"];

/// One explicit device definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDefinition {
    pub product_id: u32,
    pub label: Option<String>,
    pub zone_count: Option<u16>,
    pub tile_count: Option<u8>,
    pub tile_width: Option<u8>,
    pub tile_height: Option<u8>,
}

/// The config file schema.  Every field is optional; unset fields fall back to the CLI value
/// or the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    // Server
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub verbose: Option<bool>,

    // Persistence
    pub persistent: Option<bool>,
    pub persistent_scenarios: Option<bool>,
    pub state_dir: Option<PathBuf>,

    // Fleet, by count per device class
    pub products: Option<Vec<u32>>,
    pub color: Option<u32>,
    pub color_temperature: Option<u32>,
    pub infrared: Option<u32>,
    pub hev: Option<u32>,
    pub multizone: Option<u32>,
    pub tile: Option<u32>,
    pub switch: Option<u32>,

    // Multizone options
    pub multizone_zones: Option<u16>,
    pub multizone_extended: Option<bool>,

    // Tile options
    pub tile_count: Option<u8>,
    pub tile_width: Option<u8>,
    pub tile_height: Option<u8>,

    // Serial assignment
    pub serial_prefix: Option<String>,
    pub serial_start: Option<u32>,

    // Per-device definitions
    pub devices: Option<Vec<DeviceDefinition>>,
}

/// Resolves which config file to use, if any.
pub fn resolve_config_path(flag: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = flag {
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }
        return Ok(Some(path.to_owned()));
    }

    if let Ok(env_path) = std::env::var(ENV_VAR) {
        let path = PathBuf::from(env_path);
        if !path.is_file() {
            bail!("config file from {} not found: {}", ENV_VAR, path.display());
        }
        return Ok(Some(path));
    }

    for name in AUTO_DETECT {
        let path = PathBuf::from(name);
        if path.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

pub fn load(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}

/// Parses a 6-hex-character serial prefix into its 3 bytes.
pub fn parse_serial_prefix(prefix: &str) -> anyhow::Result<[u8; 3]> {
    if prefix.len() != 6 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("serial prefix must be exactly 6 hex characters, got {:?}", prefix);
    }
    let mut out = [0u8; 3];
    for (i, chunk) in prefix.as_bytes().chunks(2).enumerate() {
        out[i] = u8::from_str_radix(std::str::from_utf8(chunk).unwrap(), 16).unwrap();
    }
    Ok(out)
}
