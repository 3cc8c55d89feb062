//! Batch job requests submitted by a front-end.

use crate::config::Config;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a request is rejected before any work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Source folder missing or not a directory
    #[error("Please select a valid folder: {} is not a directory", .0.display())]
    InvalidDirectory(PathBuf),

    /// No preset identifier given
    #[error("A preset name is required")]
    EmptyPreset,

    /// No output extension given
    #[error("An output extension is required")]
    EmptyExtension,
}

/// Everything a batch run needs; immutable once submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJobRequest {
    /// Folder whose direct children are transcoded
    pub directory: PathBuf,
    /// Encoder executable (bare name or path)
    pub encoder_path: PathBuf,
    /// Preset identifier passed to the encoder
    pub preset: String,
    /// Extension of transcoded files; a leading `.` is ignored
    pub output_extension: String,
    /// Presets file imported before selecting the preset
    pub presets_file: Option<PathBuf>,
}

impl BatchJobRequest {
    pub fn new(
        directory: impl Into<PathBuf>,
        encoder_path: impl Into<PathBuf>,
        preset: impl Into<String>,
        output_extension: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            encoder_path: encoder_path.into(),
            preset: preset.into(),
            output_extension: output_extension.into(),
            presets_file: None,
        }
    }

    pub fn with_presets_file(mut self, presets_file: impl Into<PathBuf>) -> Self {
        self.presets_file = Some(presets_file.into());
        self
    }

    /// Build a request for `directory` from the loaded configuration.
    ///
    /// The preset is empty when the configuration names none, which fails validation.
    pub fn from_config(directory: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            directory: directory.into(),
            encoder_path: PathBuf::from(&config.encoder.path),
            preset: config.encoder.preset.clone().unwrap_or_default(),
            output_extension: config.output.normalized_extension().to_string(),
            presets_file: config.encoder.presets_file.clone(),
        }
    }

    /// Output extension without leading dots or surrounding whitespace
    pub fn extension(&self) -> &str {
        self.output_extension.trim().trim_start_matches('.')
    }

    /// Preset identifier without surrounding whitespace
    pub fn preset(&self) -> &str {
        self.preset.trim()
    }

    /// Check the request before a run may start
    pub fn validate(&self) -> Result<(), RequestError> {
        if !self.directory.is_dir() {
            return Err(RequestError::InvalidDirectory(self.directory.clone()));
        }
        if self.preset().is_empty() {
            return Err(RequestError::EmptyPreset);
        }
        if self.extension().is_empty() {
            return Err(RequestError::EmptyExtension);
        }
        Ok(())
    }
}
