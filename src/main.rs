mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

use clipforge::activity::{self, ActivityEntry};
use clipforge::clipboard;
use clipforge::clips;
use clipforge::config::Config;
use clipforge::engine::{
    CapabilityProbe, ExportEventKind, ExportQuality, ExportReport, ExportRequest, ExportSession,
    Exporter, cuvid_decoder_for, ffmpeg_version, ffprobe_version,
};
use clipforge::sidecar;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Export {
            clip,
            start,
            end,
            speed,
            volume,
            quality,
            output,
        } => run_export(clip, start, end, speed, volume, quality, output),
        Commands::Check => run_check(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_export(
    clip: String,
    start: f64,
    end: f64,
    speed: f64,
    volume: f64,
    quality: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load()?;
    let input_path = clips::resolve_clip(&config.clip_location, &clip)?;
    let volume_range = sidecar::volume_range_for(&input_path)?;
    let game_info = sidecar::game_info_for(&input_path).unwrap_or(None);

    let quality = quality
        .as_deref()
        .map(ExportQuality::parse)
        .unwrap_or_else(|| config.preferred_quality());

    let explicit_output = output.is_some();
    let output_path = match output {
        Some(path) => path,
        None => {
            let exports_dir = config.clip_location.join("exports");
            std::fs::create_dir_all(&exports_dir)
                .context("Failed to create exports directory")?;
            let stem = input_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("clip");
            exports_dir.join(format!("{}_export.mp4", stem))
        }
    };

    let request = ExportRequest {
        input_path: input_path.clone(),
        output_path,
        start,
        end,
        volume,
        speed,
        quality,
        volume_range,
        allow_audio_copy: config.allow_audio_copy,
    };

    let exporter = Arc::new(Exporter::new());
    let (tx, rx) = mpsc::channel();
    let session = ExportSession::spawn(exporter, request, tx);

    let mut report: Option<Box<ExportReport>> = None;
    let mut failure: Option<String> = None;

    for event in rx.iter() {
        if event.session != session.id {
            continue;
        }
        match event.kind {
            ExportEventKind::Started => {}
            ExportEventKind::Progress(pct) => {
                print!("\rProgress: {:.1}%", pct);
                std::io::stdout().flush().ok();
            }
            ExportEventKind::FallingBackToSoftware => {
                println!();
                println!("Hardware encoding unavailable, continuing with software encoding");
            }
            ExportEventKind::Completed { report: r } => report = Some(r),
            ExportEventKind::Failed { error } => failure = Some(error),
        }
    }
    session.join();
    println!();

    activity::record(&ActivityEntry {
        timestamp: chrono::Local::now().to_rfc3339(),
        clip: input_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&clip)
            .to_string(),
        game: game_info.map(|g| g.window_title),
        start_s: start,
        end_s: end,
        speed,
        volume,
        quality: quality.label().to_string(),
        success: report.is_some(),
        encoder: report.as_ref().map(|r| r.outcome.encoder.clone()),
        used_fallback: report.as_ref().map(|r| r.outcome.using_fallback),
        error: failure.clone(),
        benchmark: report.as_ref().map(|r| r.benchmark.clone()),
    });

    match report {
        Some(report) => {
            println!(
                "Exported with {} in {:.1}s ({:.2}x realtime)",
                report.outcome.encoder,
                report.benchmark.elapsed_ms as f64 / 1000.0,
                report.benchmark.realtime_factor
            );
            match report.benchmark.output_size_bytes {
                Some(size) => println!(
                    "Output: {} ({:.1} MiB)",
                    report.output_path.display(),
                    size as f64 / (1024.0 * 1024.0)
                ),
                None => println!("Output: {}", report.output_path.display()),
            }
            if !explicit_output {
                match clipboard::copy_path_reference(&report.output_path) {
                    Ok(()) => println!("Export path copied to clipboard"),
                    Err(e) => eprintln!("Warning: {:#}", e),
                }
            }
            Ok(())
        }
        None => bail!(failure.unwrap_or_else(|| "export produced no result".to_string())),
    }
}

fn run_check() -> Result<()> {
    match ffmpeg_version() {
        Ok(version) => println!("ffmpeg:  {}", version),
        Err(e) => println!("ffmpeg:  not found ({:#})", e),
    }
    match ffprobe_version() {
        Ok(version) => println!("ffprobe: {}", version),
        Err(e) => println!("ffprobe: not found ({:#})", e),
    }

    let probe = CapabilityProbe::new();
    let status = probe.nvenc_status(true);
    println!(
        "NVENC:   {} ({})",
        if status.available {
            "available"
        } else {
            "unavailable"
        },
        status.reason
    );

    let decoders = probe.decoder_names(true);
    let mut cuvid: Vec<&str> = ["h264", "hevc", "av1", "mpeg2video", "vp8", "vp9", "mjpeg"]
        .iter()
        .filter_map(|codec| cuvid_decoder_for(codec))
        .filter(|d| decoders.contains(*d))
        .collect();
    cuvid.sort_unstable();
    if cuvid.is_empty() {
        println!("CUVID:   no specialized decoders found");
    } else {
        println!("CUVID:   {}", cuvid.join(", "));
    }

    Ok(())
}
