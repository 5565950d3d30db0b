// Source stream probing via ffprobe

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use super::error::ExportError;

/// Facts about the first video stream of a source clip, probed once per
/// export and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Codec name, lowercased (e.g. "h264", "hevc").
    pub codec_name: String,
    pub pix_fmt: Option<String>,
    /// Container duration in seconds, when the format reports one.
    pub duration_s: Option<f64>,
}

/// Seam for source probing so pipeline tests can run without ffprobe.
pub trait SourceProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<SourceStreamInfo, ExportError>;
}

/// Default prober backed by the ffprobe executable.
pub struct FfprobeSourceProber;

impl SourceProber for FfprobeSourceProber {
    fn probe(&self, path: &Path) -> Result<SourceStreamInfo, ExportError> {
        probe_source(path)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

/// Probe the first video stream of `path` using ffprobe.
pub fn probe_source(path: &Path) -> Result<SourceStreamInfo, ExportError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .output()
        .map_err(|e| ExportError::SourceProbe {
            message: format!("failed to run ffprobe: {}", e),
        })?;

    if !output.status.success() {
        return Err(ExportError::SourceProbe {
            message: format!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_source(&json)
}

/// Parse ffprobe JSON into `SourceStreamInfo` (separate for testing).
pub fn parse_ffprobe_source(json: &str) -> Result<SourceStreamInfo, ExportError> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| ExportError::SourceProbe {
            message: format!("failed to parse ffprobe JSON: {}", e),
        })?;

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| ExportError::SourceProbe {
            message: "no video stream found".to_string(),
        })?;

    let width = stream.width.ok_or_else(|| ExportError::SourceProbe {
        message: "video stream has no width".to_string(),
    })?;
    let height = stream.height.ok_or_else(|| ExportError::SourceProbe {
        message: "video stream has no height".to_string(),
    })?;

    // r_frame_rate is more accurate; avg_frame_rate is the fallback. An
    // unparsable rational defaults to 30 fps rather than failing the export.
    let fps = stream
        .r_frame_rate
        .as_deref()
        .or(stream.avg_frame_rate.as_deref())
        .and_then(parse_fraction)
        .filter(|f| *f > 0.0)
        .unwrap_or(30.0);

    let codec_name = stream
        .codec_name
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    let duration_s = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Ok(SourceStreamInfo {
        width,
        height,
        fps,
        codec_name,
        pix_fmt: stream.pix_fmt.clone(),
        duration_s,
    })
}

/// Parse a rational string like "30000/1001" to f64.
fn parse_fraction(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let numerator: f64 = num.parse().ok()?;
    let denominator: f64 = den.parse().ok()?;
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}

/// Check if ffmpeg is available and return its version line.
pub fn ffmpeg_version() -> Result<String> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .context("Failed to execute ffmpeg. Is ffmpeg installed and in PATH?")?;

    if !output.status.success() {
        anyhow::bail!("ffmpeg command failed with status: {}", output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffprobe is available and return its version line.
pub fn ffprobe_version() -> Result<String> {
    let output = Command::new("ffprobe")
        .arg("-version")
        .output()
        .context("Failed to execute ffprobe. Is ffprobe installed and in PATH?")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe command failed with status: {}", output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}
