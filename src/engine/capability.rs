//! NVENC capability probing with time-bounded caching.
//!
//! Advertised encoder support frequently does not imply a working
//! driver/runtime, so availability is established in two steps: the encoder
//! list must advertise `h264_nvenc`, and a short synthetic encode through the
//! hardware path must succeed. Both the NVENC verdict and the decoder-name
//! set are cached for five minutes; a live hardware-encode failure during an
//! export invalidates the verdict so the next export re-probes.

use std::collections::HashSet;
use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::error::truncate_chars;
use super::options::EncoderBackend;

/// How long a probe result stays fresh.
pub const CAPABILITY_TTL: Duration = Duration::from_secs(5 * 60);

/// Diagnostic reasons are capped so a driver stack trace cannot balloon the
/// cached status.
const MAX_REASON_CHARS: usize = 1200;

/// Outcome of the two-step NVENC check.
#[derive(Debug, Clone)]
pub struct NvencStatus {
    pub available: bool,
    pub backend: EncoderBackend,
    pub reason: String,
    pub checked_at: Instant,
}

impl NvencStatus {
    fn new(available: bool, reason: String) -> Self {
        Self {
            available,
            backend: if available {
                EncoderBackend::Nvenc
            } else {
                EncoderBackend::Software
            },
            reason,
            checked_at: Instant::now(),
        }
    }
}

/// Raw engine queries, separated out so cache/TTL behavior is testable
/// without ffmpeg on the machine.
pub trait EngineProber: Send + Sync {
    /// Raw stdout of the engine's encoder listing.
    fn encoder_list(&self) -> Result<String, String>;

    /// Raw stdout of the engine's decoder listing.
    fn decoder_list(&self) -> Result<String, String>;

    /// Run a minimal synthetic encode through the hardware path, discarding
    /// the output. `Err` carries the diagnostic tail.
    fn test_nvenc_encode(&self) -> Result<(), String>;
}

/// Default prober backed by the ffmpeg executable.
pub struct FfmpegProber;

impl EngineProber for FfmpegProber {
    fn encoder_list(&self) -> Result<String, String> {
        list_output("-encoders")
    }

    fn decoder_list(&self) -> Result<String, String> {
        list_output("-decoders")
    }

    fn test_nvenc_encode(&self) -> Result<(), String> {
        // A few hundred milliseconds of a generated test pattern at low
        // resolution, thrown away via the null muxer.
        let output = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=0.3:size=320x240:rate=30",
                "-c:v",
                "h264_nvenc",
                "-f",
                "null",
                "-",
            ])
            .output()
            .map_err(|e| format!("failed to spawn ffmpeg for NVENC test encode: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "NVENC test encode exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr_tail(&output.stderr)
            ))
        }
    }
}

fn list_output(flag: &str) -> Result<String, String> {
    Command::new("ffmpeg")
        .args(["-hide_banner", flag])
        .output()
        .map_err(|e| format!("failed to run ffmpeg {}: {}", flag, e))
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
}

fn stderr_tail(buf: &[u8]) -> String {
    const MAX_BYTES: usize = 1200;
    if buf.len() <= MAX_BYTES {
        return String::from_utf8_lossy(buf).to_string();
    }
    let tail = &buf[buf.len().saturating_sub(MAX_BYTES)..];
    String::from_utf8_lossy(tail).to_string()
}

struct DecoderCache {
    names: HashSet<String>,
    checked_at: Instant,
}

/// TTL-governed capability service. One instance is shared by every export a
/// process runs; it replaces ambient global caches so invalidation and clock
/// behavior stay observable.
pub struct CapabilityProbe {
    prober: Box<dyn EngineProber>,
    ttl: Duration,
    nvenc: Mutex<Option<NvencStatus>>,
    decoders: Mutex<Option<DecoderCache>>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self::with_prober(Box::new(FfmpegProber), CAPABILITY_TTL)
    }

    pub fn with_prober(prober: Box<dyn EngineProber>, ttl: Duration) -> Self {
        Self {
            prober,
            ttl,
            nvenc: Mutex::new(None),
            decoders: Mutex::new(None),
        }
    }

    /// Current NVENC verdict, re-probing when the cached value is stale or
    /// `force_refresh` is set.
    pub fn nvenc_status(&self, force_refresh: bool) -> NvencStatus {
        let mut slot = self.nvenc.lock().unwrap();
        if !force_refresh {
            if let Some(cached) = slot.as_ref() {
                if cached.checked_at.elapsed() < self.ttl {
                    return cached.clone();
                }
            }
        }

        let status = self.probe_nvenc();
        if status.available {
            info!("NVENC verified: {}", status.reason);
        } else {
            info!("NVENC unavailable: {}", status.reason);
        }
        *slot = Some(status.clone());
        status
    }

    fn probe_nvenc(&self) -> NvencStatus {
        let encoders = match self.prober.encoder_list() {
            Ok(out) => out,
            Err(e) => {
                return NvencStatus::new(false, truncate_chars(&e, MAX_REASON_CHARS));
            }
        };

        if !encoders.contains("h264_nvenc") {
            return NvencStatus::new(
                false,
                "h264_nvenc not present in encoder list".to_string(),
            );
        }

        match self.prober.test_nvenc_encode() {
            Ok(()) => NvencStatus::new(
                true,
                "h264_nvenc verified with synthetic test encode".to_string(),
            ),
            Err(diag) => NvencStatus::new(false, truncate_chars(&diag, MAX_REASON_CHARS)),
        }
    }

    /// Lowercased decoder identifier set, cached with the same TTL discipline
    /// as the NVENC verdict but in its own slot.
    pub fn decoder_names(&self, force_refresh: bool) -> HashSet<String> {
        let mut slot = self.decoders.lock().unwrap();
        if !force_refresh {
            if let Some(cached) = slot.as_ref() {
                if cached.checked_at.elapsed() < self.ttl {
                    return cached.names.clone();
                }
            }
        }

        let names = match self.prober.decoder_list() {
            Ok(out) => parse_decoder_names(&out),
            Err(e) => {
                warn!("decoder listing failed: {}", e);
                HashSet::new()
            }
        };
        debug!("decoder listing returned {} names", names.len());

        *slot = Some(DecoderCache {
            names: names.clone(),
            checked_at: Instant::now(),
        });
        names
    }

    /// Drop the cached NVENC verdict so the next export re-probes. Called
    /// after any live hardware-encode failure.
    pub fn invalidate(&self) {
        *self.nvenc.lock().unwrap() = None;
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `ffmpeg -decoders` output into a lowercase name set.
///
/// Lines look like ` V....D h264    H.264 / AVC ...` after a `------` header
/// separator; the second whitespace token is the decoder identifier.
pub fn parse_decoder_names(output: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut in_body = false;
    for line in output.lines() {
        if !in_body {
            in_body = line.trim_start().starts_with("------");
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(_flags), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        names.insert(name.to_lowercase());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProber {
        advertised: bool,
        encode_ok: bool,
        encoder_calls: Arc<AtomicUsize>,
    }

    impl FakeProber {
        fn new(advertised: bool, encode_ok: bool) -> Self {
            Self {
                advertised,
                encode_ok,
                encoder_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EngineProber for FakeProber {
        fn encoder_list(&self) -> Result<String, String> {
            self.encoder_calls.fetch_add(1, Ordering::SeqCst);
            if self.advertised {
                Ok(" V....D h264_nvenc    NVIDIA NVENC H.264 encoder".to_string())
            } else {
                Ok(" V....D libx264    H.264 software encoder".to_string())
            }
        }

        fn decoder_list(&self) -> Result<String, String> {
            Ok(" ------\n V....D h264    H.264\n V....D h264_cuvid    Nvidia CUVID H264 decoder\n".to_string())
        }

        fn test_nvenc_encode(&self) -> Result<(), String> {
            if self.encode_ok {
                Ok(())
            } else {
                Err("Cannot load libnvidia-encode.so.1".to_string())
            }
        }
    }

    #[test]
    fn advertised_and_working_is_available() {
        let probe = CapabilityProbe::with_prober(
            Box::new(FakeProber::new(true, true)),
            CAPABILITY_TTL,
        );
        let status = probe.nvenc_status(false);
        assert!(status.available);
        assert_eq!(status.backend, EncoderBackend::Nvenc);
    }

    #[test]
    fn advertised_but_broken_driver_is_unavailable() {
        let probe = CapabilityProbe::with_prober(
            Box::new(FakeProber::new(true, false)),
            CAPABILITY_TTL,
        );
        let status = probe.nvenc_status(false);
        assert!(!status.available);
        assert_eq!(status.backend, EncoderBackend::Software);
        assert!(status.reason.contains("libnvidia-encode"));
    }

    #[test]
    fn not_advertised_skips_test_encode() {
        let probe = CapabilityProbe::with_prober(
            Box::new(FakeProber::new(false, true)),
            CAPABILITY_TTL,
        );
        let status = probe.nvenc_status(false);
        assert!(!status.available);
        assert!(status.reason.contains("not present"));
    }

    #[test]
    fn fresh_result_is_cached_until_invalidated() {
        let prober = FakeProber::new(true, true);
        let calls = prober.encoder_calls.clone();
        let probe = CapabilityProbe::with_prober(Box::new(prober), CAPABILITY_TTL);

        probe.nvenc_status(false);
        probe.nvenc_status(false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        probe.invalidate();
        probe.nvenc_status(false);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_ttl_forces_reprobe() {
        let prober = FakeProber::new(true, true);
        let calls = prober.encoder_calls.clone();
        let probe = CapabilityProbe::with_prober(Box::new(prober), Duration::ZERO);

        probe.nvenc_status(false);
        probe.nvenc_status(false);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn force_refresh_bypasses_cache() {
        let prober = FakeProber::new(true, true);
        let calls = prober.encoder_calls.clone();
        let probe = CapabilityProbe::with_prober(Box::new(prober), CAPABILITY_TTL);

        probe.nvenc_status(false);
        probe.nvenc_status(true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn decoder_names_are_parsed_and_lowercased() {
        let out = " Decoders:\n ------\n V....D h264    H.264\n V....D H264_CUVID    cuvid\n A....D aac    AAC\n";
        let names = parse_decoder_names(out);
        assert!(names.contains("h264"));
        assert!(names.contains("h264_cuvid"));
        assert!(names.contains("aac"));
        assert!(!names.contains("decoders:"));
    }

    #[test]
    fn long_diagnostic_reason_is_truncated() {
        struct VerboseFailure;
        impl EngineProber for VerboseFailure {
            fn encoder_list(&self) -> Result<String, String> {
                Ok("h264_nvenc".to_string())
            }
            fn decoder_list(&self) -> Result<String, String> {
                Ok(String::new())
            }
            fn test_nvenc_encode(&self) -> Result<(), String> {
                Err("e".repeat(5000))
            }
        }

        let probe = CapabilityProbe::with_prober(Box::new(VerboseFailure), CAPABILITY_TTL);
        let status = probe.nvenc_status(false);
        assert!(!status.available);
        assert!(status.reason.chars().count() <= 1200);
    }
}
