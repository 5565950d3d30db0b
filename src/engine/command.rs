// Encode command assembly

use std::process::Command;

use super::decode::DecodeMode;
use super::filters::FilterPlan;
use super::options::{self, EncoderBackend};
use super::pipeline::ExportRequest;

/// Build one ffmpeg encode command for a single attempt.
///
/// `-ss`/`-t` are input options so the decoder only reads the trimmed
/// segment; filters then operate in trim-relative time.
pub fn build_encode_command(
    request: &ExportRequest,
    plan: &FilterPlan,
    mode: &DecodeMode,
    backend: EncoderBackend,
) -> Command {
    let duration = request.end - request.start;

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner");

    for arg in mode.input_args() {
        cmd.arg(arg);
    }

    cmd.arg("-ss").arg(request.start.to_string());
    cmd.arg("-t").arg(duration.to_string());
    cmd.arg("-i").arg(&request.input_path);

    // Structured key=value progress to stdout
    cmd.arg("-progress").arg("-").arg("-nostats");

    if !plan.video.is_empty() {
        cmd.arg("-vf").arg(plan.video.join(","));
    }
    if !plan.audio.is_empty() {
        cmd.arg("-af").arg(plan.audio.join(","));
    }

    let video_args = match backend {
        EncoderBackend::Nvenc => options::nvenc_video_args(request.quality, duration),
        EncoderBackend::Software => options::software_video_args(request.quality, duration),
    };
    for arg in video_args {
        cmd.arg(arg);
    }

    for arg in options::audio_args(
        request.quality,
        !plan.audio.is_empty(),
        request.allow_audio_copy,
    ) {
        cmd.arg(arg);
    }

    // Clips get shared straight from disk; put the moov atom up front for mp4
    if request
        .output_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
    {
        cmd.arg("-movflags").arg("+faststart");
    }

    cmd.arg("-y");
    cmd.arg(&request.output_path);

    cmd
}

/// Format a command as a display string for logs.
pub fn stringify_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}
