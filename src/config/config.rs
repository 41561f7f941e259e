//! Config file handling

use std::path::{Path, PathBuf};

use crate::errors::PipelineError;

/// pipetest configuration (`<config dir>/pipetest/config.toml`, or
/// `$PIPETEST_CONFIG_DIR/config.toml`)
///
/// ```toml
/// [defaults]
/// options = ["--workers", "4", "--no-color"]
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    /// Flags prepended to every invocation's arguments
    pub default_options: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: Self::default_config_dir(),
            default_options: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the config file (TOML format)
    pub fn load() -> Result<Self, PipelineError> {
        let config_dir = Self::default_config_dir();
        let config_file = config_dir.join("config.toml");
        Self::load_from(&config_file, config_dir)
    }

    /// Load from an explicit file; a missing file yields the defaults
    pub fn load_from(config_file: &Path, config_dir: PathBuf) -> Result<Self, PipelineError> {
        if !config_file.exists() {
            return Ok(Self {
                config_dir,
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(config_file)
            .map_err(|e| PipelineError::Config(format!("Failed to read config: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Invalid config TOML: {}", e)))?;

        let default_options = toml_value
            .get("defaults")
            .and_then(|d| d.get("options"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            config_dir,
            default_options,
        })
    }

    /// `$PIPETEST_CONFIG_DIR`, else the platform config directory
    fn default_config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("PIPETEST_CONFIG_DIR").filter(|d| !d.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .map(|p| p.join("pipetest"))
            .unwrap_or_else(|| PathBuf::from(".pipetest"))
    }
}
