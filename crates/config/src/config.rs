//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Default encoder executable; resolved on `PATH` when given as a bare name.
pub const DEFAULT_ENCODER: &str = "HandBrakeCLI";

/// External encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Encoder executable, either a bare program name or a path
    #[serde(default = "default_encoder_path")]
    pub path: String,
    /// Preset identifier passed to the encoder
    #[serde(default)]
    pub preset: Option<String>,
    /// Presets file imported by the encoder before selecting the preset
    #[serde(default)]
    pub presets_file: Option<PathBuf>,
}

fn default_encoder_path() -> String {
    DEFAULT_ENCODER.to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            path: default_encoder_path(),
            preset: None,
            presets_file: None,
        }
    }
}

/// Output naming configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Extension of transcoded files (a leading `.` is tolerated)
    #[serde(default = "default_output_extension")]
    pub extension: String,
}

fn default_output_extension() -> String {
    "mp4".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: default_output_extension(),
        }
    }
}

impl OutputConfig {
    /// Extension with any leading dots removed
    pub fn normalized_extension(&self) -> &str {
        self.extension.trim().trim_start_matches('.')
    }
}

/// Front-end configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    /// Interval between event-queue drains, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set and non-empty:
    /// - TRANSCODER_ENCODER_PATH -> encoder.path
    /// - TRANSCODER_PRESET -> encoder.preset
    /// - TRANSCODER_PRESETS_FILE -> encoder.presets_file
    /// - TRANSCODER_OUTPUT_EXTENSION -> output.extension
    /// - TRANSCODER_POLL_INTERVAL_MS -> ui.poll_interval_ms
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = non_empty_var("TRANSCODER_ENCODER_PATH") {
            self.encoder.path = val;
        }

        if let Some(val) = non_empty_var("TRANSCODER_PRESET") {
            self.encoder.preset = Some(val);
        }

        if let Some(val) = non_empty_var("TRANSCODER_PRESETS_FILE") {
            self.encoder.presets_file = Some(PathBuf::from(val));
        }

        if let Some(val) = non_empty_var("TRANSCODER_OUTPUT_EXTENSION") {
            self.output.extension = val;
        }

        if let Some(val) = non_empty_var("TRANSCODER_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.ui.poll_interval_ms = ms;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    /// (still subject to environment overrides).
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
