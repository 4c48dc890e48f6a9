// silencedetect and cropdetect analysis passes

use crate::common::{FakeProbe, FakeTranscoder, Harness, Rule, pass2};
use clipfit::engine::{FitError, SilenceTrimMode};

const SILENCES: &str = "\
[silencedetect @ 0x7f] silence_start: 0
[silencedetect @ 0x7f] silence_end: 2.5 | silence_duration: 2.5
size=N/A time=00:00:20.00 bitrate=N/A speed=410x
[silencedetect @ 0x7f] silence_start: 20.25
[silencedetect @ 0x7f] silence_end: 22.75 | silence_duration: 2.5
[silencedetect @ 0x7f] silence_start: 57.5";

#[test]
fn test_edge_silence_moves_the_window() {
    let mut h = Harness::new();
    h.opts.trim_silence = Some(SilenceTrimMode::StartAndEnd);
    let fake = FakeTranscoder::new().rule(Rule::on("silencedetect").stderr(SILENCES));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 55.0);
    assert!(pass2(&fake).contains("-ss 00:00:02.500 -t 00:00:55.000 -i"));
    assert_eq!(fake.count_matching("-filter_complex"), 0);
}

#[test]
fn test_start_only_keeps_trailing_silence() {
    let mut h = Harness::new();
    h.opts.trim_silence = Some(SilenceTrimMode::Start);
    let fake = FakeTranscoder::new().rule(Rule::on("silencedetect").stderr(SILENCES));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 57.5);
}

#[test]
fn test_interior_silence_is_cut() {
    let mut h = Harness::new();
    h.opts.trim_silence = Some(SilenceTrimMode::All);
    let fake = FakeTranscoder::new().rule(Rule::on("silencedetect").stderr(SILENCES));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    // 55 s window minus the 2.5 s gap
    assert_eq!(outcome.duration_s, 52.5);

    let render = fake
        .rendered()
        .into_iter()
        .find(|c| c.contains("-filter_complex"))
        .unwrap();
    assert!(render.contains("-ss 00:00:02.500 -t 00:00:55.000 -i"));
    assert!(render.contains("trim=start=0:end=17.75"));
    assert!(render.contains("trim=start=20.25:end=55"));
}

#[test]
fn test_no_silence_leaves_clip_alone() {
    let mut h = Harness::new();
    h.opts.trim_silence = Some(SilenceTrimMode::All);
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 60.0);
    assert!(!pass2(&fake).contains("-ss "));
}

#[test]
fn test_failed_silencedetect_is_fatal() {
    let mut h = Harness::new();
    h.opts.trim_silence = Some(SilenceTrimMode::Start);
    let fake = FakeTranscoder::new().rule(Rule::on("silencedetect").fail("boom"));

    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::EncodeFailure { ref stage, .. } if stage == "silencedetect"));
}

const CROPS: &str = "\
[Parsed_cropdetect_0 @ 0x55d] x1:0 x2:1919 y1:138 y2:941 w:1920 h:800 x:0 y:140 pts:100 t:4.171 limit:0.094 crop=1920:800:0:140
[Parsed_cropdetect_0 @ 0x55d] x1:0 x2:1919 y1:138 y2:941 w:1920 h:800 x:0 y:140 pts:200 t:8.342 limit:0.094 crop=1920:800:0:140";

#[test]
fn test_auto_crop_leads_the_filter_chain() {
    let mut h = Harness::new();
    h.opts.auto_crop = true;
    let fake = FakeTranscoder::new().rule(Rule::on("cropdetect").stderr(CROPS));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.video.crop.as_deref(), Some("crop=1920:800:0:140"));
    assert!(pass2(&fake).contains("-vf crop=1920:800:0:140,"));
}

#[test]
fn test_manual_crop_skips_detection() {
    let mut h = Harness::new();
    h.opts.crop = Some("1440:1080:240:0".to_string());
    let fake = FakeTranscoder::new();

    h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(fake.count_matching("cropdetect"), 0);
    assert!(pass2(&fake).contains("-vf crop=1440:1080:240:0,"));
}
