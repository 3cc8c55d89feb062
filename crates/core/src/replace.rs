//! Replacer module for retiring sources after a verified encode.
//!
//! A source file is deleted if and only if its encode succeeded AND the output
//! file exists afterwards. On failure the source stays and any partial output at
//! the allocated path is removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while replacing a source with its transcoded output.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// The encoder reported success but produced no output file.
    #[error("Output file missing after encode: {}", .0.display())]
    OutputMissing(PathBuf),

    /// The source could not be deleted; the output is kept.
    #[error("Failed to delete source {}: {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A failed encode left something at the output path that could not be removed.
    #[error("Could not remove partial output {}: {source}", path.display())]
    PartialOutputNotRemoved {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Deletes `source` once `output` is verified to exist.
///
/// # Returns
///
/// * `Ok(())` if the output exists and the source was deleted
/// * `Err(ReplaceError::OutputMissing)` if there is no output; the source is untouched
/// * `Err(ReplaceError::DeleteFailed)` if deletion failed; the output is not rolled back
pub fn finalize_success(source: &Path, output: &Path) -> Result<(), ReplaceError> {
    if !output.is_file() {
        return Err(ReplaceError::OutputMissing(output.to_path_buf()));
    }

    fs::remove_file(source).map_err(|source_err| ReplaceError::DeleteFailed {
        path: source.to_path_buf(),
        source: source_err,
    })
}

/// Removes whatever a failed encode left at its allocated output path.
///
/// The path was free when it was allocated, so anything there now belongs to
/// the failed attempt. Returns `Ok(true)` if a file was removed and `Ok(false)`
/// if nothing was there. Directories are never removed recursively; one at the
/// output path is reported as an error.
pub fn discard_partial_output(output: &Path) -> Result<bool, ReplaceError> {
    match fs::remove_file(output) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReplaceError::PartialOutputNotRemoved {
            path: output.to_path_buf(),
            source: e,
        }),
    }
}
