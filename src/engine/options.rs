//! Quality tiers and their encoder option contracts.
//!
//! Three tiers map onto both encoder backends:
//!
//! | tier     | h264_nvenc                                   | libx264                         |
//! |----------|----------------------------------------------|---------------------------------|
//! | lossless | constqp qp 0, preset p7, tune lossless       | crf 0, preset slow              |
//! | high     | vbr cq 18, 40M/80M caps, rc-lookahead 32, p5 | crf 19, preset medium           |
//! | discord  | cbr at the budget rate, tune ull, bf 0, p4   | crf 28 + budget caps, preset fast |
//!
//! The discord tier budgets its bitrate to land under Discord's upload limit:
//! a 9.5 MiB target split across audio, container overhead, and video, with
//! the video share clamped to a sane range.

use serde::{Deserialize, Serialize};

/// Target output size for the discord tier.
pub const DISCORD_TARGET_BYTES: u64 = 9_961_472; // 9.5 MiB

/// Fixed AAC bitrate budgeted for discord exports.
pub const DISCORD_AUDIO_KBPS: u32 = 96;

/// Allowance for container/mux overhead in the budget.
pub const CONTAINER_OVERHEAD_KBPS: u32 = 48;

/// Clamp range for the computed video bitrate.
pub const MIN_VIDEO_KBPS: u32 = 450;
pub const MAX_VIDEO_KBPS: u32 = 14_000;

/// AAC bitrate for non-discord tiers (and the re-encode default).
pub const DEFAULT_AUDIO_KBPS: u32 = 192;

/// Export quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Lossless,
    High,
    #[default]
    Discord,
}

impl ExportQuality {
    /// Parse a tier name. Unset or unrecognized values fall back to the
    /// discord tier rather than failing.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "lossless" => Self::Lossless,
            "high" => Self::High,
            _ => Self::Discord,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Lossless => "lossless",
            Self::High => "high",
            Self::Discord => "discord",
        }
    }
}

/// Which encoder family an export ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderBackend {
    Nvenc,
    Software,
}

impl EncoderBackend {
    /// Encoder identifier recorded in outcomes and benchmarks. The hardware
    /// path is identified by its FFmpeg encoder name; the fallback is just
    /// "software".
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Software => "software",
        }
    }
}

/// Video kbps for a discord-tier clip of the given duration.
///
/// Total budget = floor(target bytes × 8 / duration / 1000) kbps, minus the
/// fixed audio bitrate and container overhead, clamped to
/// [`MIN_VIDEO_KBPS`, `MAX_VIDEO_KBPS`].
pub fn discord_video_kbps(clip_duration_s: f64) -> u32 {
    let total_kbps = (DISCORD_TARGET_BYTES as f64 * 8.0 / clip_duration_s / 1000.0).floor();
    let video = total_kbps - DISCORD_AUDIO_KBPS as f64 - CONTAINER_OVERHEAD_KBPS as f64;
    if !video.is_finite() {
        return MAX_VIDEO_KBPS;
    }
    (video as i64).clamp(MIN_VIDEO_KBPS as i64, MAX_VIDEO_KBPS as i64) as u32
}

/// h264_nvenc option set for a tier.
pub fn nvenc_video_args(quality: ExportQuality, clip_duration_s: f64) -> Vec<String> {
    let mut args: Vec<String> = vec!["-c:v".into(), "h264_nvenc".into()];
    match quality {
        ExportQuality::Lossless => {
            args.extend(arg_strs(&[
                "-preset", "p7", "-tune", "lossless", "-rc", "constqp", "-qp", "0",
            ]));
        }
        ExportQuality::High => {
            args.extend(arg_strs(&[
                "-preset",
                "p5",
                "-rc",
                "vbr",
                "-cq",
                "18",
                "-b:v",
                "0",
                "-maxrate",
                "40M",
                "-bufsize",
                "80M",
                "-rc-lookahead",
                "32",
            ]));
        }
        ExportQuality::Discord => {
            let video_kbps = discord_video_kbps(clip_duration_s);
            args.extend(arg_strs(&["-preset", "p4", "-tune", "ull", "-rc", "cbr"]));
            args.push("-b:v".into());
            args.push(format!("{}k", video_kbps));
            args.push("-maxrate".into());
            args.push(format!("{}k", video_kbps));
            args.push("-bufsize".into());
            args.push(format!("{}k", video_kbps * 2));
            args.extend(arg_strs(&["-bf", "0"]));
        }
    }
    args
}

/// libx264 option set for a tier (the fallback path).
pub fn software_video_args(quality: ExportQuality, clip_duration_s: f64) -> Vec<String> {
    let mut args: Vec<String> = vec!["-c:v".into(), "libx264".into()];
    match quality {
        ExportQuality::Lossless => {
            args.extend(arg_strs(&["-preset", "slow", "-crf", "0"]));
        }
        ExportQuality::High => {
            args.extend(arg_strs(&["-preset", "medium", "-crf", "19"]));
        }
        ExportQuality::Discord => {
            let video_kbps = discord_video_kbps(clip_duration_s);
            args.extend(arg_strs(&["-preset", "fast", "-crf", "28"]));
            args.push("-maxrate".into());
            args.push(format!("{}k", video_kbps));
            args.push("-bufsize".into());
            args.push(format!("{}k", video_kbps * 2));
        }
    }
    args
}

/// AAC bitrate for a tier when the audio stream is re-encoded.
pub fn audio_bitrate_kbps(quality: ExportQuality) -> u32 {
    match quality {
        ExportQuality::Discord => DISCORD_AUDIO_KBPS,
        _ => DEFAULT_AUDIO_KBPS,
    }
}

/// Audio option set. The stream is copied unmodified only when no audio
/// filter is required, the tier is not discord, and the caller permits it.
pub fn audio_args(quality: ExportQuality, has_audio_filters: bool, allow_copy: bool) -> Vec<String> {
    if !has_audio_filters && quality != ExportQuality::Discord && allow_copy {
        return arg_strs(&["-c:a", "copy"]);
    }
    vec![
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", audio_bitrate_kbps(quality)),
    ]
}

fn arg_strs(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
