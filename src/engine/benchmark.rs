//! Post-export benchmark records.
//!
//! Built once from the outcome, timing, and an output-file stat; never
//! mutated afterwards. A stat failure records a null size rather than
//! failing an export that already succeeded.

use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use super::options::{
    self, DISCORD_AUDIO_KBPS, DISCORD_TARGET_BYTES, ExportQuality,
};
use super::pipeline::{ExportOutcome, ExportRequest};

/// Bitrate-budget inputs recorded for discord-tier exports, for post-hoc
/// analysis of size overshoots.
#[derive(Debug, Clone, Serialize)]
pub struct DiscordBudget {
    pub target_bytes: u64,
    pub video_kbps: u32,
    pub audio_kbps: u32,
}

/// Diagnostic summary of one finished export.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    pub encoder: String,
    pub decode_mode: String,
    pub hardware_decode: bool,
    pub used_fallback: bool,
    pub attempted_modes: Vec<String>,
    pub video_filters: Vec<String>,
    pub audio_filters: Vec<String>,
    pub clip_duration_s: f64,
    pub elapsed_ms: u128,
    /// Clip seconds encoded per wall-clock second.
    pub realtime_factor: f64,
    pub output_size_bytes: Option<u64>,
    pub discord_budget: Option<DiscordBudget>,
    pub recorded_at: String,
}

impl BenchmarkRecord {
    pub fn build(
        outcome: &ExportOutcome,
        request: &ExportRequest,
        started_at: Instant,
        output_path: &Path,
    ) -> Self {
        let elapsed = started_at.elapsed();
        let clip_duration_s = request.end - request.start;
        let elapsed_s = elapsed.as_secs_f64().max(f64::EPSILON);

        let output_size_bytes = fs::metadata(output_path).ok().map(|m| m.len());

        let discord_budget = (request.quality == ExportQuality::Discord).then(|| DiscordBudget {
            target_bytes: DISCORD_TARGET_BYTES,
            video_kbps: options::discord_video_kbps(clip_duration_s),
            audio_kbps: DISCORD_AUDIO_KBPS,
        });

        Self {
            encoder: outcome.encoder.clone(),
            decode_mode: outcome.pipeline.decode_mode.clone(),
            hardware_decode: outcome.pipeline.hardware_decode,
            used_fallback: outcome.using_fallback,
            attempted_modes: outcome.pipeline.attempted_modes.clone(),
            video_filters: outcome.pipeline.video_filters.clone(),
            audio_filters: outcome.pipeline.audio_filters.clone(),
            clip_duration_s,
            elapsed_ms: elapsed.as_millis(),
            realtime_factor: clip_duration_s / elapsed_s,
            output_size_bytes,
            discord_budget,
            recorded_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pipeline::PipelineInfo;
    use crate::engine::probe::SourceStreamInfo;
    use std::path::PathBuf;

    fn outcome() -> ExportOutcome {
        ExportOutcome {
            using_fallback: false,
            encoder: "h264_nvenc".to_string(),
            pipeline: PipelineInfo {
                decode_mode: "h264_cuvid".to_string(),
                hardware_decode: true,
                requested_cuvid_decoder: Some("h264_cuvid".to_string()),
                attempted_modes: vec!["h264_cuvid".to_string()],
                video_filters: vec![],
                audio_filters: vec![],
                source: SourceStreamInfo {
                    width: 1920,
                    height: 1080,
                    fps: 60.0,
                    codec_name: "h264".to_string(),
                    pix_fmt: Some("yuv420p".to_string()),
                    duration_s: Some(60.0),
                },
            },
        }
    }

    fn request(quality: ExportQuality, output: PathBuf) -> ExportRequest {
        ExportRequest {
            input_path: PathBuf::from("in.mp4"),
            output_path: output,
            start: 10.0,
            end: 40.0,
            volume: 1.0,
            speed: 1.0,
            quality,
            volume_range: None,
            allow_audio_copy: true,
        }
    }

    #[test]
    fn missing_output_records_null_size() {
        let req = request(
            ExportQuality::High,
            PathBuf::from("/nonexistent/never-written.mp4"),
        );
        let record = BenchmarkRecord::build(&outcome(), &req, Instant::now(), &req.output_path);
        assert_eq!(record.output_size_bytes, None);
        assert_eq!(record.encoder, "h264_nvenc");
        assert!(record.discord_budget.is_none());
    }

    #[test]
    fn discord_exports_carry_budget_facts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.mp4");
        std::fs::write(&out, b"mp4 bytes").unwrap();

        let req = request(ExportQuality::Discord, out.clone());
        let record = BenchmarkRecord::build(&outcome(), &req, Instant::now(), &out);

        let budget = record.discord_budget.unwrap();
        assert_eq!(budget.target_bytes, DISCORD_TARGET_BYTES);
        assert_eq!(budget.video_kbps, 2512);
        assert_eq!(budget.audio_kbps, 96);
        assert_eq!(record.output_size_bytes, Some(9));
        assert_eq!(record.clip_duration_s, 30.0);
        assert!(record.realtime_factor > 0.0);
    }
}
