//! Output path allocation for transcoded files.
//!
//! The destination for `name.ext` is `name_transcoded.<out>` next to the source,
//! or `name_transcoded_N.<out>` with the smallest free `N >= 1` when that exists.
//!
//! Allocation is a check against the filesystem at call time, not a reservation:
//! two runs targeting the same directory concurrently can race for one name.

use std::path::{Path, PathBuf};

/// Suffix appended to the source base name.
pub const OUTPUT_SUFFIX: &str = "_transcoded";

/// Builds the candidate file name for a given collision counter (0 = no counter).
pub fn output_file_name(base_name: &str, extension: &str, counter: u32) -> String {
    let extension = extension.trim_start_matches('.');
    if counter == 0 {
        format!("{}{}.{}", base_name, OUTPUT_SUFFIX, extension)
    } else {
        format!("{}{}_{}.{}", base_name, OUTPUT_SUFFIX, counter, extension)
    }
}

/// Derives a destination path for `source` that does not collide with any existing file.
///
/// Never returns the path of an existing entry. Calling it twice without creating
/// the returned file yields the same path both times.
pub fn allocate_output_path(source: &Path, extension: &str) -> PathBuf {
    let base_name = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut counter = 0;
    loop {
        let candidate = source.with_file_name(output_file_name(&base_name, extension, counter));
        // symlink_metadata also treats dangling symlinks as taken
        if candidate.symlink_metadata().is_err() {
            return candidate;
        }
        counter += 1;
    }
}
