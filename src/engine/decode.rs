//! Decode-mode selection for hardware-encode attempts.
//!
//! Candidates are ordered most specific first: a codec-specialized cuvid
//! decoder when the engine ships one, the generic CUDA hwaccel, then the
//! platform-generic D3D11VA/DXVA2 paths, and finally plain software decode,
//! which always terminates the list. When the filter plan requires
//! frame-domain work the frames must live in CPU memory, so software decode
//! is the only candidate.

use std::collections::HashSet;

/// Codec name → specialized cuvid decoder.
const CUVID_DECODERS: &[(&str, &str)] = &[
    ("h264", "h264_cuvid"),
    ("hevc", "hevc_cuvid"),
    ("av1", "av1_cuvid"),
    ("mpeg2video", "mpeg2_cuvid"),
    ("vp8", "vp8_cuvid"),
    ("vp9", "vp9_cuvid"),
    ("mjpeg", "mjpeg_cuvid"),
];

/// Strategy used to decode the source stream before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeMode {
    /// Software decode via the encoder's default path.
    None,
    /// Codec-specialized NVIDIA decoder (e.g. `h264_cuvid`).
    Cuvid(String),
    /// Generic CUDA hardware acceleration.
    Cuda,
    /// Direct3D 11 video acceleration.
    D3d11va,
    /// Legacy DirectX video acceleration.
    Dxva2,
}

impl DecodeMode {
    pub fn name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Cuvid(decoder) => decoder,
            Self::Cuda => "cuda",
            Self::D3d11va => "d3d11va",
            Self::Dxva2 => "dxva2",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Input-side ffmpeg arguments (placed before `-i`).
    pub fn input_args(&self) -> Vec<String> {
        match self {
            Self::None => vec![],
            Self::Cuvid(decoder) => vec![
                "-hwaccel".into(),
                "cuda".into(),
                "-c:v".into(),
                decoder.clone(),
            ],
            Self::Cuda => vec!["-hwaccel".into(), "cuda".into()],
            Self::D3d11va => vec!["-hwaccel".into(), "d3d11va".into()],
            Self::Dxva2 => vec!["-hwaccel".into(), "dxva2".into()],
        }
    }
}

/// Specialized cuvid decoder name for a source codec, if one exists.
pub fn cuvid_decoder_for(codec: &str) -> Option<&'static str> {
    CUVID_DECODERS
        .iter()
        .find(|(name, _)| *name == codec)
        .map(|(_, decoder)| *decoder)
}

/// Ordered decode-mode candidates for one export.
pub fn decode_candidates(
    needs_video_filter: bool,
    source_codec: &str,
    decoder_names: &HashSet<String>,
) -> Vec<DecodeMode> {
    if needs_video_filter {
        // Filtered frames must live in CPU memory.
        return vec![DecodeMode::None];
    }

    let mut candidates = Vec::new();
    if let Some(decoder) = cuvid_decoder_for(source_codec) {
        if decoder_names.contains(decoder) {
            candidates.push(DecodeMode::Cuvid(decoder.to_string()));
        }
    }
    candidates.push(DecodeMode::Cuda);
    candidates.push(DecodeMode::D3d11va);
    candidates.push(DecodeMode::Dxva2);
    candidates.push(DecodeMode::None);
    candidates
}
