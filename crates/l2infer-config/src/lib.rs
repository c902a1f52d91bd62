//! Configuration loading: parses `l2infer.toml` (or an override path) for
//! the handful of ambient, non-pipeline-contract knobs this tool exposes —
//! see spec.md §6 for the closed list of fixed pipeline thresholds this
//! deliberately does *not* let the user touch.
//!
//! Discovery mirrors this workspace's existing config layer: the working
//! directory is checked first, then the platform config directory via
//! `dirs::config_dir()`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "l2infer.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct PayloadConfig {
    /// `msgsToTest` in `PayloadFinder._testOffsets`: how many messages the
    /// payload stripper probes per trace before giving up.
    #[serde(default = "default_payload_sample_size")]
    pub candidate_sample_size: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            candidate_sample_size: default_payload_sample_size(),
        }
    }
}

fn default_payload_sample_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    /// Default directory exporters write into when a CLI flag enables one
    /// without overriding its output path.
    #[serde(default = "default_export_dir")]
    pub default_dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("reports")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
    /// The file this config was actually loaded from, if any (absent when
    /// no `l2infer.toml` was found anywhere and defaults were used).
    pub source_path: Option<PathBuf>,
}

impl Config {
    pub fn payload(&self) -> &PayloadConfig {
        &self.file.payload
    }

    pub fn export(&self) -> &ExportConfig {
        &self.file.export
    }
}

/// Loads configuration, preferring `override_path` if given, else searching
/// the current working directory, then the platform config directory.
/// Returns built-in defaults (not an error) when no file is found anywhere.
pub fn load(override_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = override_path {
        return load_from(path).with_context(|| format!("loading config from {}", path.display()));
    }

    if let Some(path) = discover() {
        return load_from(&path).with_context(|| format!("loading config from {}", path.display()));
    }

    debug!("no l2infer.toml found, using built-in defaults");
    Ok(Config::default())
}

fn discover() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let platform = dirs::config_dir()?.join("l2infer").join(CONFIG_FILE_NAME);
    if platform.is_file() {
        return Some(platform);
    }
    None
}

fn load_from(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: ConfigFile =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), "loaded configuration");
    Ok(Config {
        file,
        source_path: Some(path.to_path_buf()),
    })
}
