// Clip resolution within the clip folder

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions the recorder produces
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "flv", "m4v", "wmv"];

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve a clip identifier to an absolute input path.
///
/// An identifier that is already a path to an existing video file is used
/// as-is. Otherwise the clip folder is walked recursively and the first file
/// whose name or stem matches wins.
pub fn resolve_clip(clip_root: &Path, ident: &str) -> Result<PathBuf> {
    let direct = Path::new(ident);
    if direct.is_file() && is_video_file(direct) {
        return Ok(direct.to_path_buf());
    }

    for entry in WalkDir::new(clip_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_video_file(path) {
            continue;
        }
        let name_matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == ident);
        let stem_matches = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == ident);
        if name_matches || stem_matches {
            return Ok(path.to_path_buf());
        }
    }

    bail!(
        "clip '{}' not found under {}",
        ident,
        clip_root.display()
    );
}
