//! The export pipeline: probe, plan, attempt hardware encodes in decode-mode
//! order, and fall back to software encoding exactly once.
//!
//! The fallback is one-way: once the candidate list is exhausted (or
//! capability was already unavailable), hardware is never retried within the
//! same export. A hardware failure also invalidates the process-wide
//! capability cache so the *next* export re-probes instead of trusting a
//! stale verdict.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::benchmark::BenchmarkRecord;
use super::capability::CapabilityProbe;
use super::command::{build_encode_command, stringify_command};
use super::decode::{DecodeMode, decode_candidates};
use super::error::{ExportError, truncate_chars};
use super::filters::{VolumeRange, has_speed_change, plan_filters};
use super::options::{EncoderBackend, ExportQuality};
use super::probe::{FfprobeSourceProber, SourceProber, SourceStreamInfo};
use super::progress::{ProgressParser, ProgressReporter};

/// Per-mode attempt errors are capped well below the capability reason cap;
/// they only travel in log lines and terminal error messages.
const MAX_ATTEMPT_ERROR_CHARS: usize = 400;

/// One export request. `start`/`end` are absolute source seconds.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub start: f64,
    pub end: f64,
    pub volume: f64,
    pub speed: f64,
    pub quality: ExportQuality,
    pub volume_range: Option<VolumeRange>,
    pub allow_audio_copy: bool,
}

impl ExportRequest {
    fn validate(&self) -> Result<(), ExportError> {
        if !(self.end > self.start) {
            return Err(ExportError::InvalidRequest(format!(
                "end ({}) must be greater than start ({})",
                self.end, self.start
            )));
        }
        if !(self.speed > 0.0) {
            return Err(ExportError::InvalidRequest(format!(
                "speed must be positive, got {}",
                self.speed
            )));
        }
        if self.volume < 0.0 {
            return Err(ExportError::InvalidRequest(format!(
                "volume must be non-negative, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

/// Callbacks surfaced during an export.
pub trait ExportObserver: Send {
    fn on_progress(&mut self, percent: f64);

    /// One-shot notice that the export is abandoning hardware encoding.
    fn on_fallback(&mut self);
}

/// Ordered record of hardware decode attempts within one export. Internal to
/// the pipeline; discarded once the export completes.
#[derive(Debug, Default)]
struct DecodeAttemptLog {
    attempted: Vec<String>,
    errors: HashMap<String, String>,
}

/// Failure of one spawned encode process.
#[derive(Debug)]
pub struct RunFailure {
    /// Concise, single-line description (exit status or spawn error).
    pub summary: String,
    /// Full captured stderr, for logs only.
    pub stderr: String,
}

impl RunFailure {
    /// Concise message plus the first non-empty diagnostic line, truncated.
    pub fn attempt_entry(&self) -> String {
        let first_line = self
            .stderr
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        let entry = if first_line.is_empty() {
            self.summary.clone()
        } else {
            format!("{}: {}", self.summary, first_line)
        };
        truncate_chars(&entry, MAX_ATTEMPT_ERROR_CHARS)
    }
}

/// Seam around process execution so the fallback chain is testable without
/// spawning ffmpeg.
pub trait EncodeRunner: Send + Sync {
    fn run(
        &self,
        cmd: Command,
        expected_duration_s: f64,
        estimated_total_frames: f64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), RunFailure>;
}

/// Default runner: spawns ffmpeg with piped stdio, drains stderr on a side
/// thread, and feeds the `-progress` stream through the parser.
pub struct FfmpegRunner;

impl EncodeRunner for FfmpegRunner {
    fn run(
        &self,
        mut cmd: Command,
        expected_duration_s: f64,
        estimated_total_frames: f64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), RunFailure> {
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RunFailure {
            summary: format!("failed to spawn ffmpeg: {}", e),
            stderr: String::new(),
        })?;

        let stderr = child.stderr.take().ok_or_else(|| RunFailure {
            summary: "failed to capture ffmpeg stderr".to_string(),
            stderr: String::new(),
        })?;
        let stderr_thread = std::thread::spawn(move || {
            let mut output = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                output.push_str(&line);
                output.push('\n');
            }
            output
        });

        let stdout = child.stdout.take().ok_or_else(|| RunFailure {
            summary: "failed to capture ffmpeg stdout".to_string(),
            stderr: String::new(),
        })?;
        let reader = BufReader::new(stdout);
        let mut parser = ProgressParser::new();

        for line in reader.lines().map_while(Result::ok) {
            parser.parse_line(&line);
            reporter.report(parser.percent(expected_duration_s, estimated_total_frames));
        }

        let status = child.wait().map_err(|e| RunFailure {
            summary: format!("failed to wait for ffmpeg: {}", e),
            stderr: String::new(),
        })?;

        let stderr_output = stderr_thread
            .join()
            .unwrap_or_else(|_| "failed to capture stderr".to_string());
        debug!(stderr = %stderr_output, "ffmpeg process finished");

        if status.success() {
            Ok(())
        } else {
            Err(RunFailure {
                summary: format!(
                    "ffmpeg exited with status {}",
                    status.code().unwrap_or(-1)
                ),
                stderr: stderr_output,
            })
        }
    }
}

/// How the finished export actually ran.
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    /// Decode mode of the successful attempt ("none" for software decode).
    pub decode_mode: String,
    pub hardware_decode: bool,
    /// The cuvid decoder the selector asked for, when the source codec had
    /// one available.
    pub requested_cuvid_decoder: Option<String>,
    /// Decode modes attempted with hardware encoding, in order.
    pub attempted_modes: Vec<String>,
    pub video_filters: Vec<String>,
    pub audio_filters: Vec<String>,
    pub source: SourceStreamInfo,
}

/// Terminal result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// True when the software encoder produced the output.
    pub using_fallback: bool,
    /// Encoder identifier ("h264_nvenc", or "software" for the fallback).
    pub encoder: String,
    pub pipeline: PipelineInfo,
}

/// Everything a caller gets back from a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub outcome: ExportOutcome,
    pub benchmark: BenchmarkRecord,
    pub output_path: PathBuf,
}

/// The export pipeline runner. One instance serves every export in the
/// process; the capability probe it holds is the shared cache.
pub struct Exporter {
    capability: Arc<CapabilityProbe>,
    source_prober: Box<dyn SourceProber>,
    runner: Box<dyn EncodeRunner>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(CapabilityProbe::new()),
            Box::new(FfprobeSourceProber),
            Box::new(FfmpegRunner),
        )
    }

    pub fn with_parts(
        capability: Arc<CapabilityProbe>,
        source_prober: Box<dyn SourceProber>,
        runner: Box<dyn EncodeRunner>,
    ) -> Self {
        Self {
            capability,
            source_prober,
            runner,
        }
    }

    pub fn capability(&self) -> Arc<CapabilityProbe> {
        self.capability.clone()
    }

    /// Run one export to completion or terminal failure.
    pub fn export(
        &self,
        request: &ExportRequest,
        observer: &mut dyn ExportObserver,
    ) -> Result<ExportReport, ExportError> {
        request.validate()?;
        let started_at = Instant::now();
        info!(
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            start = request.start,
            end = request.end,
            quality = request.quality.label(),
            "starting export"
        );

        let source = self.source_prober.probe(&request.input_path)?;
        debug!(?source, "probed source stream");

        let plan = plan_filters(
            request.speed,
            request.volume,
            request.quality,
            request.volume_range.as_ref(),
            request.start,
            request.end,
            source.height,
        );

        let clip_duration = request.end - request.start;
        let speed_factor = if has_speed_change(request.speed) {
            request.speed
        } else {
            1.0
        };
        let expected_out_duration = clip_duration / speed_factor;
        let estimated_total_frames = clip_duration * source.fps;

        let status = self.capability.nvenc_status(false);
        let mut attempts = DecodeAttemptLog::default();
        let mut requested_cuvid = None;
        let mut hardware_mode: Option<DecodeMode> = None;

        if status.available {
            let decoder_names = self.capability.decoder_names(false);
            let candidates =
                decode_candidates(plan.needs_video_filter, &source.codec_name, &decoder_names);
            requested_cuvid = candidates.iter().find_map(|m| match m {
                DecodeMode::Cuvid(d) => Some(d.clone()),
                _ => None,
            });

            for mode in candidates {
                let cmd = build_encode_command(request, &plan, &mode, EncoderBackend::Nvenc);
                debug!(
                    decode_mode = mode.name(),
                    command = %stringify_command(&cmd),
                    "attempting hardware encode"
                );
                attempts.attempted.push(mode.name().to_string());

                let mut sink = |p: f64| observer.on_progress(p);
                let mut reporter = ProgressReporter::new(&mut sink);
                match self
                    .runner
                    .run(cmd, expected_out_duration, estimated_total_frames, &mut reporter)
                {
                    Ok(()) => {
                        hardware_mode = Some(mode);
                        break;
                    }
                    Err(failure) => {
                        let entry = failure.attempt_entry();
                        warn!(
                            decode_mode = mode.name(),
                            error = %entry,
                            "hardware encode attempt failed"
                        );
                        attempts.errors.insert(mode.name().to_string(), entry);
                        // Force a fresh probe before the next export trusts
                        // hardware again.
                        self.capability.invalidate();
                    }
                }
            }

            if hardware_mode.is_none() {
                info!(
                    attempts = attempts.attempted.len(),
                    errors = ?attempts.errors,
                    "hardware encode candidates exhausted"
                );
            }
        } else {
            info!(reason = %status.reason, "hardware encoding unavailable, using software");
        }

        let (using_fallback, backend, decode_mode) = match hardware_mode {
            Some(mode) => (false, EncoderBackend::Nvenc, mode),
            None => {
                observer.on_fallback();
                let cmd = build_encode_command(
                    request,
                    &plan,
                    &DecodeMode::None,
                    EncoderBackend::Software,
                );
                debug!(command = %stringify_command(&cmd), "software encode");

                let mut sink = |p: f64| observer.on_progress(p);
                let mut reporter = ProgressReporter::new(&mut sink);
                match self
                    .runner
                    .run(cmd, expected_out_duration, estimated_total_frames, &mut reporter)
                {
                    Ok(()) => (true, EncoderBackend::Software, DecodeMode::None),
                    Err(failure) => {
                        warn!(error = %failure.summary, "software encode failed");
                        return Err(ExportError::SoftwareEncode {
                            message: failure.attempt_entry(),
                        });
                    }
                }
            }
        };

        {
            let mut sink = |p: f64| observer.on_progress(p);
            let mut reporter = ProgressReporter::new(&mut sink);
            reporter.finish();
        }

        let outcome = ExportOutcome {
            using_fallback,
            encoder: backend.encoder_name().to_string(),
            pipeline: PipelineInfo {
                decode_mode: decode_mode.name().to_string(),
                hardware_decode: decode_mode.is_hardware(),
                requested_cuvid_decoder: requested_cuvid,
                attempted_modes: attempts.attempted.clone(),
                video_filters: plan.video.clone(),
                audio_filters: plan.audio.clone(),
                source,
            },
        };

        let benchmark =
            BenchmarkRecord::build(&outcome, request, started_at, &request.output_path);
        info!(
            encoder = %outcome.encoder,
            fallback = outcome.using_fallback,
            elapsed_ms = benchmark.elapsed_ms,
            "export complete"
        );

        Ok(ExportReport {
            outcome,
            benchmark,
            output_path: request.output_path.clone(),
        })
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}
