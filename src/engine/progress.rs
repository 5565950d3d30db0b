// Progress parsing and throttled reporting

use std::time::{Duration, Instant};

/// Minimum interval between progress emissions.
pub const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Parser for ffmpeg `-progress` output (key=value format).
///
/// `out_time_us` is the primary signal. When the engine does not report it
/// (some hwaccel paths emit `N/A`), the frame counter divided by an
/// estimated total-frame count stands in.
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub frame: Option<u64>,
    pub speed: Option<f64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output.
    pub fn parse_line(&mut self, line: &str) {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "out_time_us" => {
                    if let Ok(us) = value.trim().parse::<u64>() {
                        self.out_time_us = us;
                    }
                }
                "frame" => {
                    if let Ok(f) = value.trim().parse::<u64>() {
                        self.frame = Some(f);
                    }
                }
                "speed" => {
                    let speed_str = value.trim().trim_end_matches('x');
                    if let Ok(s) = speed_str.parse::<f64>() {
                        self.speed = Some(s);
                    }
                }
                "progress" => {
                    if value.trim() == "end" {
                        self.is_complete = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// Output time in seconds.
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Completion percentage against the expected output duration, falling
    /// back to frame counting against `estimated_total_frames` when the
    /// native time signal is absent.
    pub fn percent(&self, expected_duration_s: f64, estimated_total_frames: f64) -> f64 {
        if self.out_time_us > 0 && expected_duration_s > 0.0 {
            return (self.out_time_s() / expected_duration_s * 100.0).min(100.0);
        }
        if let Some(frame) = self.frame {
            if estimated_total_frames > 0.0 {
                return (frame as f64 / estimated_total_frames * 100.0).min(100.0);
            }
        }
        0.0
    }
}

/// Throttled percentage callback: at most one emission per 100 ms, values
/// clamped below 100 until the terminal completion signal forces it.
pub struct ProgressReporter<'a> {
    callback: &'a mut dyn FnMut(f64),
    last_emit: Option<Instant>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: &'a mut dyn FnMut(f64)) -> Self {
        Self {
            callback,
            last_emit: None,
        }
    }

    /// Report a percentage, clamped to [0, 99.9]. Drops the emission when the
    /// previous one was under 100 ms ago.
    pub fn report(&mut self, percent: f64) {
        if let Some(last) = self.last_emit {
            if last.elapsed() < REPORT_INTERVAL {
                return;
            }
        }
        self.last_emit = Some(Instant::now());
        (self.callback)(percent.clamp(0.0, 99.9));
    }

    /// Force the terminal 100% emission, bypassing the throttle.
    pub fn finish(&mut self) {
        self.last_emit = Some(Instant::now());
        (self.callback)(100.0);
    }
}
