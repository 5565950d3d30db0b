// Core export engine - independent of any UI surface

pub mod benchmark;
pub mod capability;
pub mod command;
pub mod decode;
pub mod error;
pub mod filters;
pub mod options;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod session;

pub use benchmark::{BenchmarkRecord, DiscordBudget};
pub use capability::{CAPABILITY_TTL, CapabilityProbe, EngineProber, FfmpegProber, NvencStatus};
pub use decode::{DecodeMode, cuvid_decoder_for, decode_candidates};
pub use error::ExportError;
pub use filters::{FilterPlan, VolumeRange, has_speed_change, has_volume_change, plan_filters};
pub use options::{EncoderBackend, ExportQuality, discord_video_kbps};
pub use pipeline::{
    EncodeRunner, ExportObserver, ExportOutcome, ExportReport, ExportRequest, Exporter,
    PipelineInfo, RunFailure,
};
pub use probe::{SourceProber, SourceStreamInfo, ffmpeg_version, ffprobe_version, probe_source};
pub use progress::{ProgressParser, ProgressReporter};
pub use session::{ExportEvent, ExportEventKind, ExportSession};
