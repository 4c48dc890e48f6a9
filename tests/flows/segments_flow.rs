// Cut, concat and generated segment sets through the pipeline

use crate::common::{FakeProbe, FakeTranscoder, Harness, pass2};
use clipfit::engine::{FitError, Padding, SegmentMode, SegmentRequest, SilenceTrimMode};

fn segments(mode: SegmentMode, spec: &str) -> Option<SegmentRequest> {
    Some(SegmentRequest {
        mode,
        spec: spec.to_string(),
        padding: Padding::default(),
    })
}

#[test]
fn test_cut_renders_intermediate_and_uses_its_duration() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Cut, "0:10-0:20");
    h.opts.keep_temp_files = true;
    let probe = FakeProbe {
        rendered_duration: Some(49.96),
        ..FakeProbe::hd(60.0)
    };
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &probe).unwrap();
    assert_eq!(outcome.duration_s, 49.96);
    assert!(outcome.artifacts.iter().any(|p| p.ends_with("segments.mkv")));

    let render = fake
        .rendered()
        .into_iter()
        .find(|c| c.contains("-filter_complex"))
        .unwrap();
    assert!(render.contains("concat=n=2:v=1:a=0[outv]"));
    assert!(render.contains("concat=n=2:v=0:a=1[outa]"));
    assert!(render.contains("-c:v libx265 -x265-params lossless=1"));

    // everything downstream reads the intermediate, whole
    let final_pass = pass2(&fake);
    assert!(final_pass.contains("segments.mkv"));
    assert!(!final_pass.contains("-ss "));
}

#[test]
fn test_unprobeable_render_falls_back_to_planned_duration() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Cut, "0:10-0:20;0:15-0:30");
    let fake = FakeTranscoder::new();

    // cuts merge into 10..30, leaving 40 s
    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 40.0);
}

#[test]
fn test_single_concat_range_only_moves_the_window() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Concat, "0:30-0:40");
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 10.0);
    assert_eq!(fake.count_matching("-filter_complex"), 0);
    assert!(pass2(&fake).contains("-ss 00:00:30.000 -t 00:00:10.000 -i"));
}

#[test]
fn test_single_concat_range_keeps_its_padding() {
    let mut h = Harness::new();
    h.opts.segments = Some(SegmentRequest {
        mode: SegmentMode::Concat,
        spec: "0:30-0:40".to_string(),
        padding: Padding::from_millis(500, 500),
    });
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 11.0);
    assert_eq!(fake.count_matching("-filter_complex"), 0);
    assert!(pass2(&fake).contains("-ss 00:00:29.500 -t 00:00:11.000 -i"));
}

#[test]
fn test_concat_range_past_the_end_is_clamped() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Concat, "0:50-1:30");
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.duration_s, 10.0);
    assert!(pass2(&fake).contains("-ss 00:00:50.000 -t 00:00:10.000 -i"));

    h.opts.segments = segments(SegmentMode::Concat, "0:10-0:20;1:05-1:10");
    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::InvalidSegment { .. }));
}

#[test]
fn test_cut_removing_everything_is_empty() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Cut, "0:00-1:00");
    let fake = FakeTranscoder::new();

    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::EmptySegmentSet));
    assert!(fake.rendered().is_empty());
}

#[test]
fn test_overlapping_concat_is_rejected() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Concat, "0:10-0:20;0:15-0:25");
    let fake = FakeTranscoder::new();

    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::InvalidSegment { .. }));
}

#[test]
fn test_segments_before_clip_start_are_rejected() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Cut, "0:05-0:08");
    let fake = FakeTranscoder::new();
    let mut request = h.request();
    request.start_s = Some(10.0);
    request.duration_s = Some(30.0);

    let err = h.run_request(&fake, &FakeProbe::hd(60.0), &request).unwrap_err();
    assert!(matches!(err, FitError::InvalidSegment { .. }));
}

#[test]
fn test_silence_trim_cannot_combine_with_segments() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Cut, "0:10-0:20");
    h.opts.trim_silence = Some(SilenceTrimMode::All);
    let fake = FakeTranscoder::new();

    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::InvalidSegment { .. }));
    assert_eq!(fake.count_matching("silencedetect"), 0);
}

#[test]
fn test_segments_cannot_burn_subtitles() {
    let mut h = Harness::new();
    h.opts.segments = segments(SegmentMode::Cut, "0:10-0:20");
    h.opts.subtitles = Some(h.dir.path().join("subs.srt"));
    let fake = FakeTranscoder::new();

    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::InvalidSegment { .. }));
}

#[test]
fn test_first_second_every_minute() {
    let mut h = Harness::new();
    h.opts.first_second_every_minute = true;
    h.opts.duration_check = false;
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(185.0)).unwrap();
    // 0, 60, 120 and 180
    assert_eq!(outcome.duration_s, 4.0);
    let render = fake
        .rendered()
        .into_iter()
        .find(|c| c.contains("-filter_complex"))
        .unwrap();
    assert!(render.contains("concat=n=4:v=1:a=0"));
}

#[test]
fn test_first_second_every_minute_excludes_other_segments() {
    let mut h = Harness::new();
    h.opts.first_second_every_minute = true;
    h.opts.segments = segments(SegmentMode::Concat, "0:10-0:20;0:30-0:40");
    let fake = FakeTranscoder::new();

    let err = h.run(&fake, &FakeProbe::hd(60.0)).unwrap_err();
    assert!(matches!(err, FitError::InvalidSegment { .. }));
}
