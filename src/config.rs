use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration for the framehist agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// Sampling cadence and window configuration.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Frame source configuration.
    #[serde(default)]
    pub source: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sampling: SamplingConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

/// Sampling cadence and window configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Time between frame captures. Default: 100ms.
    #[serde(default = "default_sample_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum number of frames retained in the window. Default: 600
    /// (one minute at the default cadence).
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: default_sample_interval(),
            ring_capacity: default_ring_capacity(),
        }
    }
}

/// Frame source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Source backend. Default: synthetic.
    #[serde(default)]
    pub kind: SourceKind,

    /// Counts per synthetic frame. Default: 2073600 (a 1080p pixel count).
    #[serde(default = "default_synthetic_pixels")]
    pub synthetic_pixels: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            synthetic_pixels: default_synthetic_pixels(),
        }
    }
}

/// Available frame source backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Deterministic generated frames; no hardware required.
    #[default]
    Synthetic,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;

        let cfg: Config =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

        Ok(cfg)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_ring_capacity() -> usize {
    600
}

fn default_synthetic_pixels() -> u32 {
    1920 * 1080
}
