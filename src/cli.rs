use clap::{Args, Parser, Subcommand};
use clipfit::engine::{
    AUDIO_BITRATE_TABLE, Board, Codec, Deadline, MixdownMode, ResizeMode, SilenceTrimMode,
    parse_timestamp,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipfit")]
#[command(
    about = "Fit video clips under a hard file-size cap with two-pass encodes",
    long_about = None
)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a clip so it fits the size cap
    Encode(EncodeArgs),

    /// Print duration, resolution, frame rate and audio layout of a file
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

#[derive(Args, Debug, Default)]
pub struct EncodeArgs {
    /// Input video
    pub input: PathBuf,

    /// Output path (default: _<n>_<name>.<ext> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Clip start, e.g. 1:23.5
    #[arg(short = 's', long, value_parser = parse_time_arg)]
    pub start: Option<f64>,

    /// Clip end, e.g. 1:53
    #[arg(short = 'e', long, value_parser = parse_time_arg, conflicts_with = "duration")]
    pub end: Option<f64>,

    /// Clip length, e.g. 30
    #[arg(short = 'd', long, value_parser = parse_time_arg)]
    pub duration: Option<f64>,

    // Size profile
    /// Size profile: wsg, gif or other
    #[arg(short, long)]
    pub board: Option<Board>,

    /// Manual size cap in MiB
    #[arg(long)]
    pub size: Option<f64>,

    /// Video bitrate ceiling in kbps
    #[arg(long)]
    pub max_bitrate: Option<u32>,

    /// Extra kbps subtracted from the video bitrate (negative adds)
    #[arg(long, allow_hyphen_values = true)]
    pub bitrate_compensation: Option<i32>,

    /// Allow clips longer than the board limit
    #[arg(long)]
    pub no_duration_check: bool,

    // Video
    /// Codec: vp9 or h264
    #[arg(short, long)]
    pub codec: Option<Codec>,

    /// libvpx deadline: good, best or realtime
    #[arg(long)]
    pub deadline: Option<Deadline>,

    /// Faster, lower-quality encode
    #[arg(long)]
    pub fast: bool,

    /// Disable VP9 row multithreading
    #[arg(long)]
    pub no_row_mt: bool,

    /// Resolution model: logarithmic, cubic or table
    #[arg(long)]
    pub resize_mode: Option<ResizeMode>,

    /// Use the raw curve value instead of snapping to the resolution table
    #[arg(long)]
    pub bypass_resolution_table: bool,

    /// Max output dimension in pixels
    #[arg(short, long, conflicts_with = "no_resize")]
    pub resolution: Option<u32>,

    /// Keep the source resolution
    #[arg(long)]
    pub no_resize: bool,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Crop filter, e.g. crop=1920:800:0:140
    #[arg(long, conflicts_with = "auto_crop")]
    pub crop: Option<String>,

    /// Detect black borders and crop them
    #[arg(long)]
    pub auto_crop: bool,

    /// Burn in subtitles from this file
    #[arg(long)]
    pub subtitles: Option<PathBuf>,

    /// Extra video filter appended to the chain
    #[arg(long = "vf")]
    pub video_filter: Option<String>,

    // Audio
    /// Encode without audio
    #[arg(long)]
    pub no_audio: bool,

    /// Audio bitrate in kbps
    #[arg(short, long, value_parser = parse_audio_bitrate)]
    pub audio_bitrate: Option<u32>,

    /// Prioritize audio quality
    #[arg(long)]
    pub music: bool,

    /// Loudness-normalize audio
    #[arg(long)]
    pub normalize: bool,

    /// Channel mixdown: auto, stereo, mono or same_as_source
    #[arg(long)]
    pub mixdown: Option<MixdownMode>,

    /// Audio track index
    #[arg(long, conflicts_with = "audio_lang")]
    pub audio_track: Option<u32>,

    /// Audio track language tag, e.g. jpn
    #[arg(long)]
    pub audio_lang: Option<String>,

    /// Extra audio filter
    #[arg(long = "af")]
    pub audio_filter: Option<String>,

    // Segments
    /// Remove ranges: "start-end;start-end"
    #[arg(long)]
    pub cut: Option<String>,

    /// Keep and join ranges: "start-end;start-end"
    #[arg(long)]
    pub concat: Option<String>,

    /// Padding before each concat range, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub pad_before_ms: u32,

    /// Padding after each concat range, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub pad_after_ms: u32,

    /// Keep the first second of every minute
    #[arg(long)]
    pub first_second_every_minute: bool,

    /// Trim silence: start, end, start_and_end or all
    #[arg(long)]
    pub trim_silence: Option<SilenceTrimMode>,

    // Run control
    /// Extra ffmpeg arguments for the final encode
    #[arg(long, allow_hyphen_values = true)]
    pub extra_args: Option<String>,

    /// Plan everything, print the encode commands, don't encode
    #[arg(long)]
    pub dry_run: bool,

    /// Keep the working directory and its debug log
    #[arg(long)]
    pub keep_temp_files: bool,

    /// Parent directory for the working directory
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn parse_time_arg(s: &str) -> Result<f64, String> {
    parse_timestamp(s).ok_or_else(|| format!("invalid timestamp '{}'", s))
}

pub fn parse_audio_bitrate(s: &str) -> Result<u32, String> {
    let kbps: u32 = s
        .trim_end_matches(['k', 'K'])
        .parse()
        .map_err(|_| format!("invalid audio bitrate '{}'", s))?;
    if AUDIO_BITRATE_TABLE.contains(&kbps) {
        Ok(kbps)
    } else {
        let allowed: Vec<String> = AUDIO_BITRATE_TABLE.iter().map(u32::to_string).collect();
        Err(format!(
            "unsupported audio bitrate {} (allowed: {})",
            kbps,
            allowed.join(", ")
        ))
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
