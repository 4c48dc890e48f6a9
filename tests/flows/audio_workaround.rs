// Channel-layout retry policy and loudness normalization through the pipeline

use crate::common::{FakeProbe, FakeTranscoder, Harness, Rule, pass2, stream};
use clipfit::engine::{FitError, MixdownMode, RenderState};

const LAYOUT_DEFECT: &str = "[libopus @ 0x55d0c] Invalid channel layout 5.1(side) for specified mapping family -1.\n\
Error while opening encoder for output stream #0:0";

fn surround_probe() -> FakeProbe {
    FakeProbe {
        audio: Some(vec![stream(Some("5.1(side)"), None)]),
        ..FakeProbe::hd(60.0)
    }
}

fn harness() -> Harness {
    let mut h = Harness::new();
    h.opts.mixdown = MixdownMode::SameAsSource;
    h
}

#[test]
fn test_known_defect_retries_once_with_remap() {
    let h = harness();
    let fake = FakeTranscoder::new().rule(Rule::on("-vn").fail(LAYOUT_DEFECT).once());

    let outcome = h.run(&fake, &surround_probe()).unwrap();
    let audio = outcome.audio.unwrap();
    assert_eq!(audio.channel_workaround.as_deref(), Some("5.1"));
    assert_eq!(
        audio.states,
        vec![
            RenderState::Rendering,
            RenderState::FailedKnownDefect,
            RenderState::RenderingWithWorkaround,
            RenderState::Success,
        ]
    );

    let renders: Vec<String> = fake
        .rendered()
        .into_iter()
        .filter(|c| c.contains("-vn"))
        .collect();
    assert_eq!(renders.len(), 2);
    assert!(!renders[0].contains("aformat"));
    assert!(renders[1].contains("-af aformat=channel_layouts=5.1"));

    // the final encode repeats the remap so it matches the measured size
    assert!(pass2(&fake).contains("-af aformat=channel_layouts=5.1"));
}

#[test]
fn test_second_defect_is_fatal() {
    let h = harness();
    let fake = FakeTranscoder::new().rule(Rule::on("-vn").fail(LAYOUT_DEFECT));

    let err = h.run(&fake, &surround_probe()).unwrap_err();
    match err {
        FitError::EncodeFailure { stage, command, .. } => {
            assert_eq!(stage, "audio render (layout workaround)");
            assert!(command.contains("aformat=channel_layouts=5.1"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.count_matching("-vn"), 2);
    assert_eq!(fake.count_matching("-pass"), 0);
}

#[test]
fn test_other_audio_failures_are_not_retried() {
    let h = harness();
    let fake = FakeTranscoder::new().rule(Rule::on("-vn").fail("Invalid data found when processing input"));

    let err = h.run(&fake, &surround_probe()).unwrap_err();
    assert!(matches!(err, FitError::EncodeFailure { ref stage, .. } if stage == "audio render"));
    assert_eq!(fake.count_matching("-vn"), 1);
}

#[test]
fn test_unmapped_layout_is_unsupported() {
    let h = harness();
    let probe = FakeProbe {
        audio: Some(vec![stream(Some("hexagonal"), None)]),
        ..FakeProbe::hd(60.0)
    };
    let fake = FakeTranscoder::new().rule(Rule::on("-vn").fail(LAYOUT_DEFECT));

    let err = h.run(&fake, &probe).unwrap_err();
    assert!(matches!(err, FitError::UnsupportedLayout { ref layout } if layout == "hexagonal"));
    assert_eq!(fake.count_matching("-vn"), 1);
}

const LOUDNORM_OUTPUT: &str = r#"[Parsed_loudnorm_0 @ 0x5581] 
{
	"input_i" : "-27.61",
	"input_tp" : "-4.47",
	"input_lra" : "18.06",
	"input_thresh" : "-39.20",
	"output_i" : "-16.58",
	"output_tp" : "-1.50",
	"output_lra" : "14.78",
	"output_thresh" : "-27.71",
	"normalization_type" : "dynamic",
	"target_offset" : "0.58"
}"#;

#[test]
fn test_normalization_replaces_measured_size() {
    let mut h = Harness::new();
    h.opts.normalize = true;
    let fake = FakeTranscoder::new()
        .rule(Rule::on("loudnorm=print_format=json").stderr(LOUDNORM_OUTPUT))
        .rule(Rule::on("audio.normalized.opus").writes(80 * 1024));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    let audio = outcome.audio.unwrap();
    assert_eq!(audio.measured_bytes, 80 * 1024);
    assert_eq!(outcome.budget.audio_bytes, 80 * 1024);
    assert!(audio.rendered_path.ends_with("audio.normalized.opus"));
    assert_eq!(audio.normalization.unwrap().input_i, "-27.61");

    assert!(pass2(&fake).contains(
        "loudnorm=linear=true:measured_I=-27.61:measured_LRA=18.06:measured_tp=-4.47:measured_thresh=-39.20"
    ));
}

#[test]
fn test_unparseable_loudness_skips_normalization() {
    let mut h = Harness::new();
    h.opts.normalize = true;
    let fake = FakeTranscoder::new().rule(Rule::on("loudnorm=print_format=json").stderr("no json here"));

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    let audio = outcome.audio.unwrap();
    assert!(audio.normalization.is_none());
    assert_eq!(fake.count_matching("audio.normalized"), 0);
    assert!(!pass2(&fake).contains("loudnorm"));
}

#[test]
fn test_music_mode_never_normalizes() {
    let mut h = Harness::new();
    h.opts.normalize = true;
    h.opts.music_mode = true;
    let fake = FakeTranscoder::new();

    let outcome = h.run(&fake, &FakeProbe::hd(60.0)).unwrap();
    assert_eq!(outcome.audio.unwrap().bitrate_kbps, 128);
    assert_eq!(fake.count_matching("loudnorm"), 0);
}
