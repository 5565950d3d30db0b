//! Export activity log for analytics.
//!
//! One JSON line per terminal outcome, appended to `activity.jsonl` beside
//! the config file. Analytics never block an export: append failures are
//! logged and swallowed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

use crate::config::Config;
use crate::engine::BenchmarkRecord;

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub timestamp: String,
    pub clip: String,
    pub game: Option<String>,
    pub start_s: f64,
    pub end_s: f64,
    pub speed: f64,
    pub volume: f64,
    pub quality: String,
    pub success: bool,
    pub encoder: Option<String>,
    pub used_fallback: Option<bool>,
    pub error: Option<String>,
    pub benchmark: Option<BenchmarkRecord>,
}

fn log_path() -> Result<PathBuf> {
    let config_path = Config::config_path()?;
    let dir = config_path
        .parent()
        .context("Config path has no parent directory")?;
    Ok(dir.join("activity.jsonl"))
}

fn append(entry: &ActivityEntry) -> Result<()> {
    let path = log_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let line = serde_json::to_string(entry).context("Failed to serialize activity entry")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open activity log {}", path.display()))?;
    writeln!(file, "{}", line).context("Failed to append activity entry")?;
    Ok(())
}

/// Append an entry, swallowing failures.
pub fn record(entry: &ActivityEntry) {
    if let Err(e) = append(entry) {
        warn!("failed to record activity entry: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_serialize_to_single_json_lines() {
        let entry = ActivityEntry {
            timestamp: "2025-08-07T12:00:00+00:00".to_string(),
            clip: "match_042.mp4".to_string(),
            game: Some("Rocket Arena".to_string()),
            start_s: 10.0,
            end_s: 40.0,
            speed: 1.0,
            volume: 1.0,
            quality: "discord".to_string(),
            success: true,
            encoder: Some("h264_nvenc".to_string()),
            used_fallback: Some(false),
            error: None,
            benchmark: None,
        };
        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"match_042.mp4\""));
        assert!(line.contains("\"h264_nvenc\""));
    }
}
