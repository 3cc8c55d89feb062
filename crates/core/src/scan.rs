//! Scanner module for discovering video files in a batch folder.
//!
//! Lists the direct children of a directory, keeps files with a recognized
//! video extension and returns them sorted by name so batch order is reproducible.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Video file extensions recognized by the scanner (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".m4v", ".webm",
];

/// Errors that can occur while scanning a batch folder.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The path does not exist or is not a directory.
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
}

/// A video file discovered in the batch folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// File name without its extension.
    pub base_name: String,
    /// Extension as found on disk, without the leading dot.
    pub extension: String,
}

impl VideoFile {
    /// Builds a `VideoFile` from a path, or `None` if it has no recognized video extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        if !is_video_file(path) {
            return None;
        }
        let base_name = path.file_stem()?.to_string_lossy().into_owned();
        let extension = path.extension()?.to_string_lossy().into_owned();
        Some(Self {
            path: path.to_path_buf(),
            base_name,
            extension,
        })
    }

    /// File name including extension, for log messages.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.base_name.clone())
    }
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Scans a directory for video files.
///
/// This function:
/// - Lists only direct children (non-recursive)
/// - Keeps regular files with a recognized extension (case-insensitive)
/// - Excludes subdirectories, even ones named like videos
/// - Returns results sorted by file name ascending
///
/// Relative directories are made absolute against the current working directory.
pub fn scan_directory(dir: &Path) -> Result<Vec<VideoFile>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::DirectoryNotFound(dir.to_path_buf()));
    }

    let root = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut files = Vec::new();
    // Unreadable entries (e.g. dangling symlinks) are skipped
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(video) = VideoFile::from_path(entry.path()) {
            files.push(video);
        }
    }

    Ok(files)
}
