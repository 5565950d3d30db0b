//! Filter planning: speed, volume, ranged volume, and the discord downscale.
//!
//! The resulting plan decides more than the filter chain itself: any
//! video-domain filter forces frames into CPU memory, which rules every
//! hardware decode path out for that export.

use serde::{Deserialize, Serialize};

use super::options::ExportQuality;

/// Materiality band for speed and volume multipliers. Values within
/// 1 ± 0.001 are treated as unchanged.
pub const MULTIPLIER_EPSILON: f64 = 0.001;

/// Resolution cap applied to discord-tier exports.
pub const DISCORD_MAX_HEIGHT: u32 = 1080;

/// Time-ranged volume adjustment, in absolute clip seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRange {
    pub start: f64,
    pub end: f64,
    pub level: f64,
}

/// Concrete filter expressions for one export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPlan {
    pub video: Vec<String>,
    pub audio: Vec<String>,
    /// True when any video-domain transform (speed scale or downscale) is
    /// present. Gates whether hardware decode may be attempted at all.
    pub needs_video_filter: bool,
}

/// Whether a speed multiplier materially changes playback rate.
pub fn has_speed_change(speed: f64) -> bool {
    (speed - 1.0).abs() > MULTIPLIER_EPSILON
}

/// Whether a volume multiplier materially changes loudness.
pub fn has_volume_change(volume: f64) -> bool {
    (volume - 1.0).abs() > MULTIPLIER_EPSILON
}

/// Build the filter plan for an export.
///
/// `trim_start`/`trim_end` are absolute source seconds; `volume_range` is
/// shifted into trim-relative coordinates and clamped to the trimmed
/// duration before use.
pub fn plan_filters(
    speed: f64,
    volume: f64,
    quality: ExportQuality,
    volume_range: Option<&VolumeRange>,
    trim_start: f64,
    trim_end: f64,
    source_height: u32,
) -> FilterPlan {
    let mut plan = FilterPlan::default();
    let duration = trim_end - trim_start;

    if has_speed_change(speed) {
        plan.video.push(format!("setpts=PTS/{}", speed));
        plan.audio.extend(atempo_chain(speed));
    }

    if quality == ExportQuality::Discord && source_height > DISCORD_MAX_HEIGHT {
        plan.video.push(format!(
            "scale=-2:{}:flags=fast_bilinear",
            DISCORD_MAX_HEIGHT
        ));
    }

    if has_volume_change(volume) {
        plan.audio.push(format!("volume={}", volume));
    }

    if let Some(range) = volume_range {
        if let Some((rel_start, rel_end)) = clamp_range(range, trim_start, duration) {
            if (range.level - 1.0).abs() > MULTIPLIER_EPSILON {
                plan.audio.push(format!(
                    "volume=enable='between(t,{},{})':volume={}",
                    rel_start, rel_end, range.level
                ));
            }
        }
    }

    plan.needs_video_filter = !plan.video.is_empty();
    plan
}

/// Shift a range into trim-relative coordinates and clamp to [0, duration).
/// Returns None when the range is empty or lies entirely outside the trim.
fn clamp_range(range: &VolumeRange, trim_start: f64, duration: f64) -> Option<(f64, f64)> {
    if range.end <= range.start {
        return None;
    }
    let rel_start = (range.start - trim_start).max(0.0);
    let rel_end = (range.end - trim_start).min(duration);
    if rel_end <= rel_start || rel_start >= duration {
        return None;
    }
    Some((rel_start, rel_end))
}

/// atempo accepts 0.5..=100 per instance; slower speeds chain instances so
/// the product reaches the requested tempo.
fn atempo_chain(speed: f64) -> Vec<String> {
    let mut parts = Vec::new();
    let mut remaining = speed;
    while remaining < 0.5 {
        parts.push("atempo=0.5".to_string());
        remaining *= 2.0;
    }
    parts.push(format!("atempo={}", remaining));
    parts
}
