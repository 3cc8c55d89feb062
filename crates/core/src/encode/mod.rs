//! Encoding modules for the batch transcoder
//!
//! The runner only talks to the [`Encoder`] trait; [`HandBrakeCli`] is the
//! process-backed implementation and tests plug in their own.

pub mod handbrake;
pub mod process;

pub use handbrake::{build_handbrake_command, HandBrakeCli, PRESET_FLAG, PRESET_IMPORT_FLAG};
pub use process::{command_line, run_with_merged_output, ProcessOutput};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder executable could not be located or started
    #[error("Encoder executable not found: {}: {source}", executable.display())]
    EncoderNotFound {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The encoder ran but did not exit with status zero
    #[error("Encoder failed ({})", describe_exit(*exit_code))]
    EncodeFailed {
        exit_code: Option<i32>,
        /// Combined stdout/stderr of the failed process
        output: String,
    },
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Parameters for encoding one source file into one destination
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    /// Encoder executable (bare name or path)
    pub executable: PathBuf,
    /// Preset identifier; no preset selection is passed when empty
    pub preset: String,
    /// Presets file imported before the preset is selected
    pub presets_file: Option<PathBuf>,
    /// Source video
    pub input: PathBuf,
    /// Destination allocated for this attempt
    pub output: PathBuf,
}

/// Result of an encoder process that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutcome {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr text
    pub output: String,
    /// Wall-clock time of the invocation
    pub elapsed: Duration,
}

impl EncodeOutcome {
    /// Success means exactly exit status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One external encoder invocation per input/output pair.
///
/// Implementations run to completion without a timeout. They return `Ok` whenever
/// the process ran, whatever its exit status, and `EncoderNotFound` when it could
/// not be started.
pub trait Encoder: Send + Sync {
    fn encode(&self, params: &EncodeParams) -> Result<EncodeOutcome, EncodeError>;

    /// Printable command line for `params`, used for debug logging.
    fn describe(&self, params: &EncodeParams) -> String {
        format!(
            "{} -i {} -o {}",
            params.executable.display(),
            params.input.display(),
            params.output.display()
        )
    }
}

impl<E: Encoder + ?Sized> Encoder for std::sync::Arc<E> {
    fn encode(&self, params: &EncodeParams) -> Result<EncodeOutcome, EncodeError> {
        (**self).encode(params)
    }

    fn describe(&self, params: &EncodeParams) -> String {
        (**self).describe(params)
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode(&self, params: &EncodeParams) -> Result<EncodeOutcome, EncodeError> {
        (**self).encode(params)
    }

    fn describe(&self, params: &EncodeParams) -> String {
        (**self).describe(params)
    }
}

/// Run an encoder and map a non-zero exit to [`EncodeError::EncodeFailed`]
///
/// # Returns
/// * `Ok(EncodeOutcome)` - The process exited with status zero
/// * `Err(EncodeError)` - The process could not start or exited non-zero
pub fn run_encoder<E: Encoder + ?Sized>(
    encoder: &E,
    params: &EncodeParams,
) -> Result<EncodeOutcome, EncodeError> {
    let outcome = encoder.encode(params)?;
    if outcome.success() {
        Ok(outcome)
    } else {
        Err(EncodeError::EncodeFailed {
            exit_code: outcome.exit_code,
            output: outcome.output,
        })
    }
}
