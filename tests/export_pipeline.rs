//! Pipeline integration tests driven through fake probers and runners, so
//! the fallback chain is exercised without ffmpeg on the machine.

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex, mpsc};

use clipforge::engine::{
    CAPABILITY_TTL, CapabilityProbe, EncodeRunner, EngineProber, ExportError, ExportEventKind,
    ExportObserver, ExportQuality, ExportRequest, ExportSession, Exporter, ProgressReporter,
    RunFailure, SourceProber, SourceStreamInfo,
};

struct FixedSource(SourceStreamInfo);

impl SourceProber for FixedSource {
    fn probe(&self, _path: &std::path::Path) -> Result<SourceStreamInfo, ExportError> {
        Ok(self.0.clone())
    }
}

struct FakeProber {
    nvenc_available: bool,
    decoder_listing: &'static str,
    encoder_calls: Arc<Mutex<usize>>,
}

impl EngineProber for FakeProber {
    fn encoder_list(&self) -> Result<String, String> {
        *self.encoder_calls.lock().unwrap() += 1;
        if self.nvenc_available {
            Ok(" V....D h264_nvenc    NVIDIA NVENC H.264 encoder".to_string())
        } else {
            Ok(" V....D libx264    H.264 software encoder".to_string())
        }
    }

    fn decoder_list(&self) -> Result<String, String> {
        Ok(self.decoder_listing.to_string())
    }

    fn test_nvenc_encode(&self) -> Result<(), String> {
        Ok(())
    }
}

const DECODERS_WITH_CUVID: &str =
    " ------\n V....D h264    H.264\n V....D h264_cuvid    Nvidia CUVID H264 decoder\n";
const DECODERS_PLAIN: &str = " ------\n V....D h264    H.264\n";

/// Runner that fails its first `fail_first` invocations and records the
/// argument list of every command it was handed.
struct ScriptedRunner {
    fail_first: usize,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl EncodeRunner for ScriptedRunner {
    fn run(
        &self,
        cmd: Command,
        _expected_duration_s: f64,
        _estimated_total_frames: f64,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<(), RunFailure> {
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(args);

        if index < self.fail_first {
            Err(RunFailure {
                summary: "ffmpeg exited with status 1".to_string(),
                stderr: "No capable devices found\n".to_string(),
            })
        } else {
            reporter.report(50.0);
            Ok(())
        }
    }
}

#[derive(Default)]
struct CollectingObserver {
    progress: Vec<f64>,
    fallbacks: usize,
}

impl ExportObserver for CollectingObserver {
    fn on_progress(&mut self, percent: f64) {
        self.progress.push(percent);
    }

    fn on_fallback(&mut self) {
        self.fallbacks += 1;
    }
}

fn source_1080p_h264() -> SourceStreamInfo {
    SourceStreamInfo {
        width: 1920,
        height: 1080,
        fps: 60.0,
        codec_name: "h264".to_string(),
        pix_fmt: Some("yuv420p".to_string()),
        duration_s: Some(60.0),
    }
}

fn request(quality: ExportQuality, speed: f64) -> ExportRequest {
    ExportRequest {
        input_path: PathBuf::from("/clips/match.mp4"),
        output_path: PathBuf::from("/tmp/clipforge-test-out.mp4"),
        start: 10.0,
        end: 40.0,
        volume: 1.0,
        speed,
        quality,
        volume_range: None,
        allow_audio_copy: true,
    }
}

struct Harness {
    exporter: Exporter,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    encoder_probes: Arc<Mutex<usize>>,
}

fn harness(nvenc_available: bool, decoder_listing: &'static str, fail_first: usize) -> Harness {
    let encoder_probes = Arc::new(Mutex::new(0));
    let capability = Arc::new(CapabilityProbe::with_prober(
        Box::new(FakeProber {
            nvenc_available,
            decoder_listing,
            encoder_calls: encoder_probes.clone(),
        }),
        CAPABILITY_TTL,
    ));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let runner = ScriptedRunner {
        fail_first,
        calls: calls.clone(),
    };
    Harness {
        exporter: Exporter::with_parts(
            capability,
            Box::new(FixedSource(source_1080p_h264())),
            Box::new(runner),
        ),
        calls,
        encoder_probes,
    }
}

fn encoder_of(args: &[String]) -> Option<String> {
    // The last -c:v is the encoder; a cuvid attempt also carries a decoder
    // -c:v before -i.
    args.iter()
        .rposition(|a| a == "-c:v")
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[test]
fn capability_unavailable_skips_straight_to_software() {
    let h = harness(false, DECODERS_PLAIN, 0);
    let mut observer = CollectingObserver::default();

    let report = h
        .exporter
        .export(&request(ExportQuality::Discord, 1.0), &mut observer)
        .unwrap();

    assert!(report.outcome.using_fallback);
    assert_eq!(report.outcome.encoder, "software");
    // A known precondition, not an attempt: nothing was recorded
    assert!(report.outcome.pipeline.attempted_modes.is_empty());
    assert_eq!(observer.fallbacks, 1);

    let calls = h.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(encoder_of(&calls[0]).as_deref(), Some("libx264"));
}

#[test]
fn exhausted_candidates_fall_back_exactly_once() {
    // Five candidates (cuvid, cuda, d3d11va, dxva2, none) all fail; the
    // sixth run is the software encode.
    let h = harness(true, DECODERS_WITH_CUVID, 5);
    let mut observer = CollectingObserver::default();

    let report = h
        .exporter
        .export(&request(ExportQuality::Discord, 1.0), &mut observer)
        .unwrap();

    assert_eq!(
        report.outcome.pipeline.attempted_modes,
        vec!["h264_cuvid", "cuda", "d3d11va", "dxva2", "none"]
    );
    assert!(report.outcome.using_fallback);
    assert_eq!(report.outcome.encoder, "software");
    assert_eq!(observer.fallbacks, 1);
    assert_eq!(h.calls.lock().unwrap().len(), 6);
}

#[test]
fn specialized_decoder_attempt_comes_first_and_wins() {
    let h = harness(true, DECODERS_WITH_CUVID, 0);
    let mut observer = CollectingObserver::default();

    let report = h
        .exporter
        .export(&request(ExportQuality::Discord, 1.0), &mut observer)
        .unwrap();

    assert!(!report.outcome.using_fallback);
    assert_eq!(report.outcome.encoder, "h264_nvenc");
    assert_eq!(report.outcome.pipeline.decode_mode, "h264_cuvid");
    assert!(report.outcome.pipeline.hardware_decode);
    assert_eq!(
        report.outcome.pipeline.requested_cuvid_decoder.as_deref(),
        Some("h264_cuvid")
    );
    assert_eq!(report.outcome.pipeline.attempted_modes, vec!["h264_cuvid"]);
    assert_eq!(observer.fallbacks, 0);

    // 1080p source, no speed change: no video filters
    assert!(report.outcome.pipeline.video_filters.is_empty());

    // Discord budget for a 30 s segment lands at 2512 kbps
    let calls = h.calls.lock().unwrap();
    assert_eq!(arg_value(&calls[0], "-b:v").as_deref(), Some("2512k"));
    let budget = report.benchmark.discord_budget.unwrap();
    assert_eq!(budget.video_kbps, 2512);
    assert_eq!(budget.audio_kbps, 96);
}

#[test]
fn missing_cuvid_decoder_starts_with_generic_cuda() {
    let h = harness(true, DECODERS_PLAIN, 0);
    let mut observer = CollectingObserver::default();

    let report = h
        .exporter
        .export(&request(ExportQuality::High, 1.0), &mut observer)
        .unwrap();

    assert_eq!(report.outcome.pipeline.attempted_modes, vec!["cuda"]);
    assert_eq!(report.outcome.pipeline.requested_cuvid_decoder, None);
}

#[test]
fn speed_change_restricts_decode_to_software_regardless_of_hardware() {
    let h = harness(true, DECODERS_WITH_CUVID, 0);
    let mut observer = CollectingObserver::default();

    let report = h
        .exporter
        .export(&request(ExportQuality::Discord, 2.0), &mut observer)
        .unwrap();

    // Hardware *encoding* still happens; only the decode candidates collapse
    assert_eq!(report.outcome.pipeline.attempted_modes, vec!["none"]);
    assert_eq!(report.outcome.encoder, "h264_nvenc");
    assert!(!report.outcome.pipeline.hardware_decode);
    assert_eq!(
        report.outcome.pipeline.video_filters,
        vec!["setpts=PTS/2"]
    );
}

#[test]
fn hardware_failure_invalidates_the_capability_cache() {
    let h = harness(true, DECODERS_WITH_CUVID, 5);
    let mut observer = CollectingObserver::default();

    h.exporter
        .export(&request(ExportQuality::High, 1.0), &mut observer)
        .unwrap();
    assert_eq!(*h.encoder_probes.lock().unwrap(), 1);

    // The failed hardware attempts invalidated the verdict, so the next
    // export probes again instead of trusting the cache.
    h.exporter
        .export(&request(ExportQuality::High, 1.0), &mut observer)
        .unwrap();
    assert_eq!(*h.encoder_probes.lock().unwrap(), 2);
}

#[test]
fn progress_reaches_exactly_one_hundred() {
    let h = harness(true, DECODERS_WITH_CUVID, 0);
    let mut observer = CollectingObserver::default();

    h.exporter
        .export(&request(ExportQuality::High, 1.0), &mut observer)
        .unwrap();

    assert_eq!(observer.progress.last().copied(), Some(100.0));
    assert!(observer.progress.iter().all(|p| (0.0..=100.0).contains(p)));
}

#[test]
fn invalid_trim_never_spawns_anything() {
    let h = harness(true, DECODERS_WITH_CUVID, 0);
    let mut observer = CollectingObserver::default();

    let mut req = request(ExportQuality::High, 1.0);
    req.end = req.start;
    let err = h.exporter.export(&req, &mut observer).unwrap_err();

    assert!(matches!(err, ExportError::InvalidRequest(_)));
    assert!(h.calls.lock().unwrap().is_empty());
}

#[test]
fn concurrent_sessions_are_distinguished_by_id() {
    let h = harness(true, DECODERS_WITH_CUVID, 0);
    let exporter = Arc::new(h.exporter);
    let (tx, rx) = mpsc::channel();

    let first = ExportSession::spawn(
        exporter.clone(),
        request(ExportQuality::High, 1.0),
        tx.clone(),
    );
    let second = ExportSession::spawn(exporter, request(ExportQuality::Discord, 1.0), tx);
    assert_ne!(first.id, second.id);

    let events: Vec<_> = rx.iter().collect();
    for id in [first.id, second.id] {
        let started = events
            .iter()
            .filter(|e| e.session == id && matches!(e.kind, ExportEventKind::Started))
            .count();
        let completed = events
            .iter()
            .filter(|e| e.session == id && matches!(e.kind, ExportEventKind::Completed { .. }))
            .count();
        assert_eq!(started, 1);
        assert_eq!(completed, 1);
    }
    // Every event belongs to one of the two sessions
    assert!(
        events
            .iter()
            .all(|e| e.session == first.id || e.session == second.id)
    );

    first.join();
    second.join();
}

#[test]
fn dropped_receiver_does_not_kill_the_export() {
    let h = harness(true, DECODERS_WITH_CUVID, 0);
    let calls = h.calls.clone();
    let exporter = Arc::new(h.exporter);
    let (tx, rx) = mpsc::channel();
    drop(rx);

    let session = ExportSession::spawn(exporter, request(ExportQuality::High, 1.0), tx);
    session.join();

    // The encode still ran to completion with nobody listening
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn failed_export_surfaces_through_the_event_stream() {
    // Hardware unavailable and the software encode fails: the session
    // reports Failed rather than panicking or going silent.
    let h = harness(false, DECODERS_PLAIN, 1);
    let exporter = Arc::new(h.exporter);
    let (tx, rx) = mpsc::channel();

    let session = ExportSession::spawn(exporter, request(ExportQuality::High, 1.0), tx);
    let events: Vec<_> = rx.iter().collect();
    session.join();

    let failed = events
        .iter()
        .find_map(|e| match &e.kind {
            ExportEventKind::Failed { error } => Some(error.clone()),
            _ => None,
        })
        .expect("expected a Failed event");
    assert!(failed.contains("software encode failed"));
    assert!(
        events
            .iter()
            .any(|e| matches!(e.kind, ExportEventKind::FallingBackToSoftware))
    );
}

#[test]
fn software_failure_is_terminal() {
    // Hardware unavailable and the single software run fails too.
    let h = harness(false, DECODERS_PLAIN, 1);
    let mut observer = CollectingObserver::default();

    let err = h
        .exporter
        .export(&request(ExportQuality::High, 1.0), &mut observer)
        .unwrap_err();

    match err {
        ExportError::SoftwareEncode { message } => {
            assert!(message.contains("No capable devices found"));
        }
        other => panic!("expected SoftwareEncode, got {:?}", other),
    }
    assert_eq!(h.calls.lock().unwrap().len(), 1);
}
