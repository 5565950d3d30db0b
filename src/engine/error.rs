//! Error taxonomy for the export pipeline.
//!
//! Only terminal failures surface to the caller. Per-mode hardware decode
//! failures are absorbed into the fallback chain and recorded in the
//! `DecodeAttemptLog` instead of becoming errors.

use thiserror::Error;

/// Terminal export failures visible to callers.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The request was malformed before any work started (e.g. end <= start).
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    /// The input file or its metadata could not be read. Fatal, raised before
    /// any encode attempt.
    #[error("failed to probe source: {message}")]
    SourceProbe { message: String },

    /// The final software encode failed. There is nothing left to fall back to.
    #[error("software encode failed: {message}")]
    SoftwareEncode { message: String },
}

/// Truncate a diagnostic string to at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
