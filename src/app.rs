use crate::cli::{Cli, Commands, EncodeArgs};
use anyhow::{Context, Result};
use clipfit::config::Config;
use clipfit::engine::{
    self, FfmpegRunner, FfprobeProbe, FitOptions, FitOutcome, FitPipeline, FitRequest, MediaProbe,
    Padding, PassProgress, SegmentMode, SegmentRequest, SizeProfile, UuidIdGenerator,
    VideoCodecOptions,
};
use std::io::Write;
use std::process;

pub fn run(cli: Cli) {
    match cli.command {
        Commands::Encode(args) => handle_encode(args),
        Commands::Probe { file } => handle_probe(file),
        Commands::CheckFfmpeg => handle_check_ffmpeg(),
        Commands::InitConfig => handle_init_config(),
    }
}

/// Merge config defaults and command-line flags into a pipeline request
pub fn build_request(args: &EncodeArgs, config: &Config) -> Result<(FitRequest, FitOptions)> {
    let duration_s = match (args.end, args.duration) {
        (Some(end), _) => {
            let start = args.start.unwrap_or(0.0);
            if end <= start {
                anyhow::bail!("--end must be after --start");
            }
            Some(end - start)
        }
        (None, duration) => duration,
    };

    let request = FitRequest {
        input: args.input.clone(),
        output: args.output.clone(),
        start_s: args.start,
        duration_s,
    };

    let segments = match (&args.cut, &args.concat) {
        (Some(_), Some(_)) => {
            return Err(engine::FitError::invalid_segment(
                "--cut/--concat",
                "cut and concat are mutually exclusive",
            )
            .into());
        }
        (Some(spec), None) => Some(SegmentRequest {
            mode: SegmentMode::Cut,
            spec: spec.clone(),
            padding: Padding::default(),
        }),
        (None, Some(spec)) => Some(SegmentRequest {
            mode: SegmentMode::Concat,
            spec: spec.clone(),
            padding: Padding::from_millis(args.pad_before_ms, args.pad_after_ms),
        }),
        (None, None) => None,
    };

    let defaults = &config.defaults;
    let mut options = FitOptions {
        profile: SizeProfile {
            board: args.board.unwrap_or(defaults.board),
            size_mib: args.size,
        },
        codec: VideoCodecOptions {
            codec: args.codec.unwrap_or(defaults.codec),
            deadline: args.deadline.unwrap_or(defaults.deadline),
            fast: args.fast,
            no_row_mt: args.no_row_mt || !defaults.row_mt,
        },
        resize_mode: args.resize_mode.unwrap_or(defaults.resize_mode),
        curves: config.curves,
        bypass_resolution_table: args.bypass_resolution_table || defaults.bypass_resolution_table,
        no_resize: args.no_resize,
        resolution: args.resolution,
        fps: args.fps,
        no_audio: args.no_audio,
        audio_bitrate_kbps: args.audio_bitrate,
        music_mode: args.music,
        normalize: args.normalize || defaults.normalize,
        mixdown: args.mixdown.unwrap_or_default(),
        mixdown_thresholds: config.limits.mixdown,
        audio_track: args.audio_track,
        audio_lang: args.audio_lang.clone(),
        segments,
        first_second_every_minute: args.first_second_every_minute,
        trim_silence: args.trim_silence,
        crop: args.crop.clone(),
        auto_crop: args.auto_crop,
        subtitles: args.subtitles.clone(),
        video_filter: args.video_filter.clone(),
        audio_filter: args.audio_filter.clone(),
        extra_args: args
            .extra_args
            .clone()
            .unwrap_or_else(|| defaults.extra_args.clone()),
        max_bitrate_kbps: args.max_bitrate.unwrap_or(config.limits.max_bitrate_kbps),
        bitrate_compensation_kbps: args.bitrate_compensation.unwrap_or(0),
        duration_check: !args.no_duration_check,
        dry_run: args.dry_run,
        keep_temp_files: args.keep_temp_files || defaults.keep_temp_files,
        ..FitOptions::default()
    };
    if let Some(dir) = &args.work_dir {
        options.work_root = dir.clone();
    }

    Ok((request, options))
}

fn handle_encode(args: EncodeArgs) {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}; using built-in defaults", e);
        Config::default()
    });

    let (request, options) = match build_request(&args, &config) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    };

    let runner = FfmpegRunner::new();
    let probe = FfprobeProbe::default();
    let ids = UuidIdGenerator;
    let pipeline = FitPipeline::new(&runner, &probe, &ids);

    let mut on_progress = progress_printer();
    match pipeline.run(&request, &options, &mut on_progress) {
        Ok(outcome) => {
            eprintln!();
            if args.json {
                match serde_json::to_string_pretty(&outcome) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: could not serialize outcome: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                print_outcome(&outcome);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Single-line progress on stderr for pass 2
fn progress_printer() -> impl FnMut(&PassProgress) {
    let mut last_secs = -1i64;
    move |p: &PassProgress| {
        let secs = p.elapsed_s() as i64;
        if secs == last_secs && !p.finished {
            return;
        }
        last_secs = secs;
        eprint!("\r{}   ", progress_line(p));
        let _ = std::io::stderr().flush();
    }
}

fn progress_line(p: &PassProgress) -> String {
    let percent = p.percent().map(|pct| format!(" ({:.0}%)", pct)).unwrap_or_default();
    let speed = p.speed.map(|s| format!(" {:.2}x", s)).unwrap_or_default();
    format!(
        "encoding: {}{}{}",
        engine::format_timestamp(p.elapsed_s()),
        percent,
        speed
    )
}

fn print_outcome(outcome: &FitOutcome) {
    if outcome.output_bytes.is_none() {
        println!("Dry run, nothing encoded. Commands:");
        for cmd in &outcome.commands {
            println!("  {}", cmd);
        }
    }
    println!("Output: {}", outcome.output_path.display());
    println!(
        "Duration: {}  video: {} kbps  audio: {}",
        engine::format_timestamp(outcome.duration_s),
        outcome.video.bitrate_kbps,
        outcome
            .audio
            .as_ref()
            .map(|a| format!("{} kbps ({} KiB)", a.bitrate_kbps, a.measured_bytes / 1024))
            .unwrap_or_else(|| "none".to_string())
    );
    if let Some(bytes) = outcome.output_bytes {
        println!(
            "Size: {} KiB of {} KiB",
            bytes / 1024,
            outcome.budget.cap_bytes / 1024
        );
    }
    if let Some(over) = outcome.overshoot {
        println!(
            "Warning: output is {} bytes over the cap; retry with --bitrate-compensation",
            over.output_bytes - over.cap_bytes
        );
    }
    if let Some(dir) = &outcome.work_dir {
        println!("Working files kept in {}", dir.display());
    }
}

fn handle_probe(file: std::path::PathBuf) {
    if let Err(e) = probe_report(&FfprobeProbe::default(), &file) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn probe_report(probe: &FfprobeProbe, file: &std::path::Path) -> Result<()> {
    let duration = probe.duration(file).context("Could not read duration")?;
    println!("Duration: {:.2} seconds", duration);

    match probe.probe_input_info(file) {
        Ok(info) => {
            println!("Resolution: {}x{}", info.width, info.height);
            println!("Frame rate: {} ({:.2} fps)", info.frame_rate, info.frame_rate.as_f64());
        }
        Err(e) => println!("Video: unavailable ({})", e),
    }

    let streams = probe.audio_streams(file).context("Could not list audio streams")?;
    if streams.is_empty() {
        println!("Audio: none");
    }
    for (idx, stream) in streams.iter().enumerate() {
        println!(
            "Audio {}: {} ({} channels){}",
            idx,
            stream.channel_layout.as_deref().unwrap_or("unknown layout"),
            stream.channels.map_or("?".to_string(), |c| c.to_string()),
            stream
                .language
                .as_deref()
                .map(|l| format!(" [{}]", l))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn handle_check_ffmpeg() {
    match engine::ffmpeg_version() {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match engine::ffprobe_version() {
                Ok(probe_version) => println!("ffprobe found: {}", probe_version),
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }

    let mut missing = false;
    for encoder in ["libvpx-vp9", "libopus", "libx264", "aac", "libx265"] {
        let ok = engine::encoder_available(encoder);
        missing |= !ok;
        println!("  {:<12} {}", encoder, if ok { "OK" } else { "MISSING" });
    }
    if missing {
        process::exit(1);
    }
}

fn handle_init_config() {
    match Config::config_path() {
        Ok(path) if path.exists() => match Config::load() {
            Ok(cfg) => {
                println!("Config loaded successfully from {}", path.display());
                println!("{:#?}", cfg);
            }
            Err(e) => {
                eprintln!("Config at {} is invalid: {:#}", path.display(), e);
                process::exit(1);
            }
        },
        Ok(path) => {
            println!("Creating default config...");
            if let Err(err) = Config::ensure_default() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            }
            println!("Default config saved to {}", path.display());
        }
        Err(e) => {
            eprintln!("Config path unknown: {:#}", e);
            process::exit(1);
        }
    }
}
