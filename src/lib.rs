//! clipforge - clip trim/export engine with NVENC hardware acceleration and
//! graceful software fallback.
//!
//! The `engine` module holds the whole transcoding orchestration: source
//! probing, capability caching, filter planning, decode-mode selection, the
//! encode pipeline itself, and benchmarking. The surrounding modules cover
//! the application concerns the engine is driven by: settings, clip
//! resolution, sidecar metadata, clipboard handoff, and the activity log.

pub mod activity;
pub mod clipboard;
pub mod clips;
pub mod config;
pub mod engine;
pub mod sidecar;

pub use config::Config;
pub use engine::{ExportError, ExportReport, ExportRequest, Exporter};
