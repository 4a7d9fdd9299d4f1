// src/config.rs
// 应用配置：JSON 文件，所有字段均有默认值
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::calibration::AxisSettings;
use crate::error::ConfigError;
use crate::library::{SearchOptions, DEFAULT_LIBRARY_FILE};
use crate::processing::{PeakSettings, PreprocessingConfig};
use crate::protocol::{BaudRate, SessionConfig};

pub const DEFAULT_CALIBRATION_FILE: &str = "calibration_cur.csv";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port name; empty means "ask or simulate".
    pub port: String,
    pub baud: BaudRate,
    #[serde(flatten)]
    pub session: SessionConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: PeakSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub library: PathBuf,
    pub calibration: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::from(DEFAULT_LIBRARY_FILE),
            calibration: PathBuf::from(DEFAULT_CALIBRATION_FILE),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub axis: AxisSettings,
    pub processing: PreprocessingConfig,
    pub peaks: PeakConfig,
    pub search: SearchOptions,
    pub paths: PathsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.axis.validate()?;
        self.processing.validate()?;
        self.search.validate()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text).context("malformed configuration")?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Reads a configuration file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("loading configuration {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("writing configuration {}", path.display()))?;
        Ok(())
    }
}
