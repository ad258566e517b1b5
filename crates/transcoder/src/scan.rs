//! Expanding user-supplied paths into a list of video files.
//!
//! Files are accepted when their extension is a known video extension;
//! directories are walked recursively in name order, skipping hidden
//! subdirectories.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions accepted as input (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".m4v", ".wmv", ".flv", ".webm"];

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

/// Result of expanding input arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedInputs {
    /// Video files in argument order, directory contents sorted by name.
    pub accepted: Vec<PathBuf>,
    /// Arguments that are neither video files nor directories.
    pub rejected: Vec<PathBuf>,
}

fn walk_directory(root: &Path, accepted: &mut Vec<PathBuf>) {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Skip hidden directories (but allow hidden files to be filtered later)
            if entry.file_type().is_dir() && entry.depth() > 0 {
                if let Some(name) = entry.file_name().to_str() {
                    return !name.starts_with('.');
                }
            }
            true
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && is_video_file(entry.path()) {
            accepted.push(entry.path().to_path_buf());
        }
    }
}

/// Expands files and directories into video file paths.
pub fn expand_inputs<I, P>(paths: I) -> ExpandedInputs
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut expanded = ExpandedInputs::default();

    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            walk_directory(path, &mut expanded.accepted);
        } else if path.is_file() && is_video_file(path) {
            expanded.accepted.push(path.to_path_buf());
        } else {
            expanded.rejected.push(path.to_path_buf());
        }
    }

    expanded
}
