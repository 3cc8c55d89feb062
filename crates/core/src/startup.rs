//! Startup checks module for the batch transcoder
//!
//! Provides preflight checks front-ends run before submitting a batch:
//! - Encoder path resolution against `PATH`
//! - HandBrakeCLI availability (`--version`)
//! - Presets file existence

use crate::encode::run_with_merged_output;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Presets file not found: {}", .0.display())]
    PresetsFileMissing(PathBuf),
}

/// Resolve the encoder executable the user asked for
///
/// A bare program name is looked up on `PATH` and the first existing candidate
/// is returned. If nothing is found, or the input already names a path, it is
/// returned unchanged and left for the OS to resolve at spawn time.
pub fn resolve_encoder_path(input: &str) -> PathBuf {
    resolve_in_path(input, env::var_os("PATH").as_deref())
}

fn resolve_in_path(input: &str, path_var: Option<&OsStr>) -> PathBuf {
    let requested = PathBuf::from(input.trim());
    if !is_bare_name(&requested) {
        return requested;
    }

    let Some(path_var) = path_var else {
        return requested;
    };

    for dir in env::split_paths(path_var) {
        let candidate = dir.join(&requested);
        if candidate.is_file() {
            return candidate;
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return exe;
            }
        }
    }

    requested
}

fn is_bare_name(path: &Path) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// Extract the version from `HandBrakeCLI --version` output
///
/// Looks for a line like `HandBrake 1.7.2` (also `HandBrake 20240101-git`).
pub fn parse_handbrake_version(version_output: &str) -> Option<String> {
    version_output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word.eq_ignore_ascii_case("handbrake") {
                return words
                    .next()
                    .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()))
                    .map(String::from);
            }
        }
        None
    })
}

/// Check that the encoder starts and answers `--version`
///
/// Returns the reported version, or `"unknown"` if the output carries none.
pub fn check_encoder_available(executable: &Path) -> Result<String, StartupError> {
    let mut cmd = Command::new(executable);
    cmd.arg("--version");

    let result = run_with_merged_output(cmd).map_err(|e| {
        StartupError::EncoderUnavailable(format!(
            "{} --version failed; is HandBrakeCLI installed and in PATH? Error: {}",
            executable.display(),
            e
        ))
    })?;

    if result.exit_code != Some(0) {
        return Err(StartupError::EncoderUnavailable(format!(
            "{} --version exited with {:?}",
            executable.display(),
            result.exit_code
        )));
    }

    Ok(parse_handbrake_version(&result.output).unwrap_or_else(|| "unknown".to_string()))
}

/// Check that a configured presets file exists
pub fn check_presets_file(presets_file: Option<&Path>) -> Result<(), StartupError> {
    match presets_file {
        Some(path) if !path.is_file() => Err(StartupError::PresetsFileMissing(path.to_path_buf())),
        _ => Ok(()),
    }
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. Presets file existence
/// 2. Encoder availability
pub fn run_startup_checks(
    executable: &Path,
    presets_file: Option<&Path>,
) -> Result<String, StartupError> {
    check_presets_file(presets_file)?;
    let version = check_encoder_available(executable)?;
    log::info!("Using {} (HandBrake {})", executable.display(), version);
    Ok(version)
}
