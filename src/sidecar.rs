//! Per-clip sidecar metadata.
//!
//! The recorder drops one JSON file per clip into a `.clip_metadata`
//! directory beside the recordings: `<clip file name>.gameinfo` with the
//! captured window title, and `<clip file name>.volume.json` when the user
//! has saved a time-ranged volume adjustment. An absent sidecar is normal,
//! not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::VolumeRange;

/// Metadata directory name, next to the clips
pub const METADATA_DIR: &str = ".clip_metadata";

/// Game/window info captured when the clip was recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub window_title: String,
    #[serde(default)]
    pub icon_file: String,
}

fn sidecar_path(clip: &Path, suffix: &str) -> Option<PathBuf> {
    let parent = clip.parent()?;
    let file_name = clip.file_name()?.to_str()?;
    Some(parent.join(METADATA_DIR).join(format!("{}.{}", file_name, suffix)))
}

fn read_sidecar<T: for<'de> Deserialize<'de>>(clip: &Path, suffix: &str) -> Result<Option<T>> {
    let Some(path) = sidecar_path(clip, suffix) else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read sidecar {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse sidecar {}", path.display()))?;
    Ok(Some(value))
}

/// Saved volume-range adjustment for a clip, if any.
pub fn volume_range_for(clip: &Path) -> Result<Option<VolumeRange>> {
    read_sidecar(clip, "volume.json")
}

/// Recorded game info for a clip, if any.
pub fn game_info_for(clip: &Path) -> Result<Option<GameInfo>> {
    read_sidecar(clip, "gameinfo")
}
