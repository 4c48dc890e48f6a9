// End-to-end pipeline runs against the fake ffmpeg/ffprobe

use crate::common::{FakeProbe, FakeTranscoder, Harness, Rule, pass2, stream};
use clipfit::engine::{Board, FitError, ResolutionSource, SizeProfile};

#[test]
fn test_fits_clip_and_reports_size() {
    let h = Harness::new();
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();

    assert_eq!(outcome.output_path, h.dir.path().join("_1_clip.webm"));
    assert_eq!(outcome.output_bytes, Some(64 * 1024));
    assert_eq!(outcome.overshoot, None);

    // 6 MiB minus 64 KiB of audio over 60 s
    assert_eq!(outcome.budget.audio_bytes, 64 * 1024);
    assert_eq!(outcome.bitrate.target_kbps, 810);
    assert_eq!(outcome.bitrate.compensated_kbps, 810);
    assert_eq!(outcome.video.resolution_px, Some(1280));
    assert_eq!(outcome.video.fps, None);

    let audio = outcome.audio.as_ref().unwrap();
    assert_eq!(audio.bitrate_kbps, 96);
    assert_eq!(audio.measured_bytes, 64 * 1024);

    // audio render, pass 1, pass 2 in that order
    let cmds = fake.rendered();
    assert_eq!(cmds.len(), 3);
    assert!(cmds[0].contains("-vn"));
    assert!(cmds[1].contains("-pass 1") && cmds[1].contains("-an"));
    assert!(cmds[2].contains("-pass 2"));
    assert!(cmds[2].contains("-b:v 810k"));
    assert!(cmds[2].contains("-c:a libopus -b:a 96k"));
    assert!(cmds[2].contains("-progress - -nostats"));
}

#[test]
fn test_working_dir_removed_unless_kept() {
    let mut h = Harness::new();
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.work_dir, None);
    assert!(outcome.artifacts.is_empty());
    assert_eq!(h.leftover_work_dirs(), 0);

    h.opts.keep_temp_files = true;
    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    let dir = outcome.work_dir.unwrap();
    assert!(dir.join("audio.opus").is_file());
    assert!(!outcome.artifacts.is_empty());
    assert!(outcome.artifacts.iter().all(|p| p.starts_with(&dir)));
    let transcript = std::fs::read_to_string(dir.join("clipfit.log")).unwrap();
    assert!(transcript.contains("-pass 2"));
}

#[test]
fn test_overshoot_is_a_warning_not_an_error() {
    let h = Harness::new();
    let cap = Board::Wsg.cap_bytes();
    let fake = FakeTranscoder::new().rule(Rule::on("-pass 2").writes(cap + 1));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    let over = outcome.overshoot.unwrap();
    assert_eq!(over.output_bytes, cap + 1);
    assert_eq!(over.cap_bytes, cap);
    assert!(outcome.output_path.is_file());
}

#[test]
fn test_dry_run_plans_without_encoding() {
    let mut h = Harness::new();
    h.opts.dry_run = true;
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.output_bytes, None);
    assert_eq!(outcome.commands.len(), 2);
    assert!(outcome.commands[0].contains("-pass 1"));
    assert!(outcome.commands[1].contains("-pass 2"));
    assert_eq!(fake.count_matching("-pass"), 0);
    // audio still rendered to size the budget
    assert_eq!(fake.count_matching("-vn"), 1);
    assert!(!outcome.output_path.exists());
}

#[test]
fn test_duration_limit_stops_before_any_encode() {
    let h = Harness::new();
    let fake = FakeTranscoder::new();
    let err = h.run(&fake, &FakeProbe::hd(500.0)).unwrap_err();
    assert!(matches!(err, FitError::DurationExceeded { limit_s, .. } if limit_s == 400.0));
    assert!(fake.rendered().is_empty());
    assert_eq!(h.leftover_work_dirs(), 0);
}

#[test]
fn test_duration_check_can_be_disabled() {
    let mut h = Harness::new();
    h.opts.duration_check = false;
    let outcome = h.run(&FakeTranscoder::new(), &FakeProbe::hd(500.0)).unwrap();
    assert_eq!(outcome.duration_s, 500.0);
}

#[test]
fn test_audio_larger_than_cap_is_budget_exceeded() {
    let h = Harness::new();
    let fake = FakeTranscoder::new().rule(Rule::on("-vn").writes(7 * 1024 * 1024));
    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::BudgetExceeded { .. }));
    assert_eq!(fake.count_matching("-pass"), 0);
}

#[test]
fn test_missing_duration_has_no_fallback() {
    let h = Harness::new();
    let probe = FakeProbe {
        duration: None,
        ..FakeProbe::hd(60.0)
    };
    let err = h.run(&FakeTranscoder::new(), &probe).unwrap_err();
    assert!(err.is_probe_failure());
}

#[test]
fn test_explicit_window_skips_duration_probe() {
    let h = Harness::new();
    let probe = FakeProbe {
        duration: None,
        ..FakeProbe::hd(60.0)
    };
    let mut request = h.request();
    request.start_s = Some(30.0);
    request.duration_s = Some(20.0);

    let fake = FakeTranscoder::new();
    let outcome = h.run_request(&fake, &probe, &request).unwrap();
    assert_eq!(outcome.duration_s, 20.0);
    assert!(pass2(&fake).contains("-ss 00:00:30.000 -t 00:00:20.000 -i"));
}

#[test]
fn test_probe_failures_fall_back_to_tables() {
    let h = Harness::new();
    let probe = FakeProbe {
        dimensions: None,
        frame_rate: None,
        ..FakeProbe::hd(60.0)
    };
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &probe).unwrap();

    // duration table at 60 s, fps cap applied blind
    assert_eq!(outcome.video.resolution_px, Some(1280));
    assert_eq!(outcome.video.fps, Some(60.0));
    let pass = pass2(&fake);
    assert!(pass.contains("scale='min(1280,iw)'"));
    assert!(pass.contains("fps=60"));
}

#[test]
fn test_small_source_is_not_upscaled() {
    let h = Harness::new();
    let probe = FakeProbe {
        dimensions: Some((640, 360)),
        ..FakeProbe::hd(30.0)
    };
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &probe).unwrap();
    assert_eq!(outcome.video.resolution_px, None);
    assert!(!pass2(&fake).contains("scale="));
}

#[test]
fn test_table_mode_never_needs_dimensions() {
    let mut h = Harness::new();
    h.opts.resize_mode = clipfit::engine::ResizeMode::Table;
    let probe = FakeProbe {
        dimensions: None,
        ..FakeProbe::hd(10.0)
    };
    let outcome = h.run(&FakeTranscoder::new(), &probe).unwrap();
    assert_eq!(outcome.video.resolution_px, Some(1920));
    let model = clipfit::engine::ResolutionModel::default();
    assert_eq!(model.choose(500, 10.0, None).source, ResolutionSource::Fallback);
}

#[test]
fn test_board_without_audio_skips_audio_render() {
    let mut h = Harness::new();
    h.opts.profile = SizeProfile {
        board: Board::Other,
        size_mib: None,
    };
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();

    assert!(outcome.audio.is_none());
    assert_eq!(outcome.budget.audio_bytes, 0);
    assert_eq!(fake.count_matching("-vn"), 0);
    assert!(pass2(&fake).contains(" -an "));
}

#[test]
fn test_source_without_audio_streams() {
    let h = Harness::new();
    let probe = FakeProbe {
        audio: Some(Vec::new()),
        ..FakeProbe::hd(60.0)
    };
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &probe).unwrap();
    assert!(outcome.audio.is_none());
    assert_eq!(fake.count_matching("-vn"), 0);
}

#[test]
fn test_manual_size_overrides_board_cap() {
    let mut h = Harness::new();
    h.opts.profile = SizeProfile {
        board: Board::Wsg,
        size_mib: Some(2.0),
    };
    let outcome = h.run(&FakeTranscoder::new(), &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.budget.cap_bytes, 2 * 1024 * 1024);
    assert!(outcome.bitrate.target_kbps < 810);
}

#[test]
fn test_multiple_tracks_map_explicitly() {
    let mut h = Harness::new();
    h.opts.audio_lang = Some("jpn".to_string());
    let probe = FakeProbe {
        audio: Some(vec![
            stream(Some("stereo"), Some("eng")),
            stream(Some("stereo"), Some("jpn")),
        ]),
        ..FakeProbe::hd(60.0)
    };
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &probe).unwrap();

    assert_eq!(outcome.audio.unwrap().track, Some(1));
    assert!(fake.rendered()[0].contains("-map 0:a:1"));
    assert!(pass2(&fake).contains("-map 0:v:0 -map 0:a:1"));
}

#[test]
fn test_low_bitrate_mixes_down_to_mono() {
    let mut h = Harness::new();
    h.opts.audio_bitrate_kbps = Some(48);
    let fake = FakeTranscoder::new();
    h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert!(fake.rendered()[0].contains("-ac 1"));
    assert!(pass2(&fake).contains("-ac 1"));
}

#[test]
fn test_failed_pass_one_aborts_pass_two() {
    let h = Harness::new();
    let fake = FakeTranscoder::new().rule(Rule::on("-pass 1").fail("Error initializing encoder"));
    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    match err {
        FitError::EncodeFailure { stage, stderr, .. } => {
            assert_eq!(stage, "pass 1");
            assert!(stderr.contains("Error initializing encoder"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.count_matching("-pass 2"), 0);
}

#[test]
fn test_extra_args_and_custom_filters_reach_pass_two() {
    let mut h = Harness::new();
    h.opts.extra_args = "-metadata title=\"My Clip\"".to_string();
    h.opts.video_filter = Some("hflip".to_string());
    h.opts.audio_filter = Some("volume=2".to_string());
    let fake = FakeTranscoder::new();
    h.run(&fake, &FakeProbe::hd(60.0)).unwrap();

    let last = fake.commands.borrow().last().cloned().unwrap();
    assert_eq!(last.value_of("-metadata").as_deref(), Some("title=My Clip"));
    assert!(last.value_of("-vf").unwrap().ends_with(",hflip"));
    assert_eq!(last.value_of("-af").as_deref(), Some("volume=2"));
}

#[test]
fn test_h264_uses_mp4_and_aac() {
    let mut h = Harness::new();
    h.opts.codec.codec = clipfit::engine::Codec::H264;
    let fake = FakeTranscoder::new();
    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.output_path, h.dir.path().join("_1_clip.mp4"));
    assert!(fake.rendered()[0].contains("audio.m4a"));
    assert!(pass2(&fake).contains("-c:v libx264 -preset slower"));
    assert!(pass2(&fake).contains("-c:a aac"));
}
