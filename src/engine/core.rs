mod audio;
mod budget;
mod detect;
mod encode;
mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod filters;
mod fps;
mod log;
mod pipeline;
mod resolution;
mod runner;
mod segments;
mod tables;
mod timestamp;
mod types;
mod workspace;

pub use audio::{
    AudioPlan, AudioRenderer, AudioRequest, LoudnessMeasurement, MixdownMode, MixdownThresholds,
    RenderState, find_loudness_json, is_layout_defect, remap_layout, resolve_mixdown,
    select_audio_bitrate,
};
pub use budget::{
    Board, BudgetCalculator, SizeBudget, SizeProfile, VideoBitrate, check_duration,
};
pub use detect::{
    SilenceTrim, SilenceTrimMode, parse_cropdetect, parse_silences, plan_silence_trim,
};
pub use encode::{EncodeOrchestrator, EncodeReport, SizeOvershoot, encode_commands, verify_size};
pub use error::{FitError, Result, stderr_tail};
pub use ffmpeg_cmd::{
    AudioRenderArgs, CommandSpec, apply_additional_args, build_audio_render_cmd,
    build_cropdetect_cmd, build_encode_pass_cmd, build_loudnorm_measure_cmd,
    build_segment_render_cmd, build_silencedetect_cmd, null_output_target, two_pass_log_prefix,
};
pub use ffmpeg_info::{
    encoder_available, encoder_listed, ffmpeg_version, ffprobe_version, tool_version,
};
pub use filters::{
    AudioFilter, LoudnessParams, VideoFilter, VideoFilterChain, render_audio_filters,
};
pub use fps::FpsModel;
pub use log::write_debug_log;
pub use pipeline::{
    FitOptions, FitOutcome, FitPipeline, FitRequest, derive_output_path, with_container_ext,
};
pub use resolution::{
    CurveCoefficients, ResizeMode, ResolutionChoice, ResolutionModel, ResolutionSource,
    normalize_to_calibration, scale_filter, scale_to_even, snap_to_table,
};
pub use runner::{FfmpegRunner, LoggedTranscoder, RunOutput, Transcoder};
pub use segments::{
    Padding, SegmentGraph, SegmentMode, SegmentRequest, SegmentSet, StreamKind, TimeRange,
    clamp_to_clip, first_second_every_minute, pad_and_merge, parse_segments, plan_concat, plan_cut,
};
pub use tables::{
    AUDIO_BITRATE_TABLE, DurationTable, FPS_TABLE, MAX_BITRATE_KBPS, RESOLUTION_TABLE,
    ThresholdRule,
};
pub use timestamp::{format_timestamp, parse_timestamp};
pub use types::{
    Channels, ClipWindow, Codec, Deadline, EncodeJob, JobAudio, Pass, PassProgress,
    VideoCodecOptions, VideoPlan,
};
pub use workspace::{DEBUG_LOG_NAME, IdGenerator, UuidIdGenerator, Workspace};
