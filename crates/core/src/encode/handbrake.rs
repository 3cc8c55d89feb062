//! HandBrakeCLI encoder for the batch transcoder
//!
//! Builds the HandBrakeCLI invocation for one input/output pair and runs it with
//! merged output capture.

use super::process::{command_line, run_with_merged_output};
use super::{EncodeError, EncodeOutcome, EncodeParams, Encoder};
use std::process::Command;
use std::time::Instant;

/// Imports a presets file so its presets can be selected by name
pub const PRESET_IMPORT_FLAG: &str = "--preset-import-file";

/// Selects a preset by name
pub const PRESET_FLAG: &str = "-Z";

/// Lists available presets instead of encoding
pub const PRESET_LIST_FLAG: &str = "--preset-list";

/// Build a HandBrakeCLI command for one encode
///
/// Argument order:
/// - `--preset-import-file <file>` when a presets file is given
/// - `-Z <preset>` when the preset identifier is non-empty
/// - `-i <input> -o <output>`
pub fn build_handbrake_command(params: &EncodeParams) -> Command {
    let mut cmd = Command::new(&params.executable);

    if let Some(presets_file) = &params.presets_file {
        cmd.arg(PRESET_IMPORT_FLAG).arg(presets_file);
    }

    if !params.preset.trim().is_empty() {
        cmd.arg(PRESET_FLAG).arg(&params.preset);
    }

    cmd.arg("-i").arg(&params.input);
    cmd.arg("-o").arg(&params.output);

    cmd
}

/// Process-backed [`Encoder`] that runs HandBrakeCLI (or anything accepting its flags)
#[derive(Debug, Clone, Copy, Default)]
pub struct HandBrakeCli;

impl HandBrakeCli {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for HandBrakeCli {
    fn encode(&self, params: &EncodeParams) -> Result<EncodeOutcome, EncodeError> {
        let cmd = build_handbrake_command(params);
        let started = Instant::now();

        let result = run_with_merged_output(cmd).map_err(|source| EncodeError::EncoderNotFound {
            executable: params.executable.clone(),
            source,
        })?;

        Ok(EncodeOutcome {
            exit_code: result.exit_code,
            output: result.output,
            elapsed: started.elapsed(),
        })
    }

    fn describe(&self, params: &EncodeParams) -> String {
        command_line(&build_handbrake_command(params))
    }
}
