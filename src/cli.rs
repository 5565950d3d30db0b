use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(about = "Trim and export clips with NVENC acceleration and software fallback", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a trimmed segment of a clip
    Export {
        /// Clip identifier: a file stem, file name, or path
        clip: String,

        /// Trim start in seconds
        #[arg(long)]
        start: f64,

        /// Trim end in seconds
        #[arg(long)]
        end: f64,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Volume multiplier
        #[arg(long, default_value_t = 1.0)]
        volume: f64,

        /// Quality tier: lossless, high, or discord (default from config)
        #[arg(long)]
        quality: Option<String>,

        /// Output file; without it the export lands in the clip folder's
        /// exports directory and its path is copied to the clipboard
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check ffmpeg availability and the hardware-encoding verdict
    Check,
}
