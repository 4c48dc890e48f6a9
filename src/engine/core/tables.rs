// Duration-keyed lookup tables and the fixed empirical constants behind them

/// How a duration is matched against a table's thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdRule {
    /// First threshold >= duration wins (thresholds are upper bounds)
    UpTo,
    /// Largest threshold <= duration wins (thresholds are lower bounds)
    From,
}

/// A table keyed by clip duration in seconds, thresholds in ascending order.
///
/// Durations past either end clamp to the nearest entry.
#[derive(Debug, Clone, Copy)]
pub struct DurationTable<T: Copy + 'static> {
    entries: &'static [(f64, T)],
    rule: ThresholdRule,
}

impl<T: Copy + 'static> DurationTable<T> {
    pub const fn new(entries: &'static [(f64, T)], rule: ThresholdRule) -> Self {
        assert!(!entries.is_empty(), "duration table must not be empty");
        Self { entries, rule }
    }

    pub fn lookup(&self, duration_s: f64) -> T {
        let hit = match self.rule {
            ThresholdRule::UpTo => self
                .entries
                .iter()
                .find(|(threshold, _)| duration_s <= *threshold)
                .unwrap_or(&self.entries[self.entries.len() - 1]),
            ThresholdRule::From => self
                .entries
                .iter()
                .rev()
                .find(|(threshold, _)| *threshold <= duration_s)
                .unwrap_or(&self.entries[0]),
        };
        hit.1
    }

    pub fn entries(&self) -> &'static [(f64, T)] {
        self.entries
    }
}

/// Cap on the video bitrate so very short clips don't get absurd rates (kbps)
pub const MAX_BITRATE_KBPS: u32 = 2800;

/// Discrete output resolutions (max dimension), ascending
pub const RESOLUTION_TABLE: [u32; 12] = [
    480, 576, 640, 736, 854, 960, 1024, 1280, 1440, 1600, 1920, 2048,
];

/// Upper bound for the raw curve value when the resolution table is bypassed
pub const MAX_RAW_RESOLUTION: u32 = 2048;

/// Height every source is normalized to before the curve is applied
pub const CALIBRATION_HEIGHT: f64 = 1080.0;

/// Discrete audio bitrates accepted as a manual override (kbps)
pub const AUDIO_BITRATE_TABLE: [u32; 19] = [
    12, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512,
];

/// Resolution by duration, used when the source can't be probed
pub const RESOLUTION_FALLBACK: DurationTable<u32> = DurationTable::new(
    &[
        (15.0, 1920),
        (30.0, 1600),
        (45.0, 1440),
        (75.0, 1280),
        (115.0, 1024),
        (145.0, 960),
        (185.0, 854),
        (245.0, 736),
        (285.0, 640),
        (330.0, 576),
        (400.0, 480),
    ],
    ThresholdRule::UpTo,
);

/// Max output fps by duration
pub const FPS_TABLE: DurationTable<f64> = DurationTable::new(
    &[(150.0, 60.0), (200.0, 30.0), (400.0, 24.0)],
    ThresholdRule::UpTo,
);

/// Audio bitrate by duration (kbps). Long clips trade audio for video.
pub const AUDIO_TABLE: DurationTable<u32> = DurationTable::new(
    &[
        (60.0, 96),
        (120.0, 80),
        (240.0, 64),
        (300.0, 56),
        (360.0, 48),
        (400.0, 32),
    ],
    ThresholdRule::UpTo,
);

/// Audio bitrate for the smaller gif board
pub const AUDIO_TABLE_GIF: DurationTable<u32> = DurationTable::new(
    &[(10.0, 96), (20.0, 64), (40.0, 56), (60.0, 48), (120.0, 32)],
    ThresholdRule::UpTo,
);

/// Audio bitrate when audio quality is prioritized over video
pub const AUDIO_TABLE_MUSIC: DurationTable<u32> = DurationTable::new(
    &[(285.0, 128), (330.0, 112), (400.0, 96)],
    ThresholdRule::UpTo,
);

/// Automatic bitrate subtraction (kbps); longer encodes overshoot more.
///
/// Thresholds are lower bounds: a clip of exactly 300 s already gets 2 kbps,
/// and anything past 360 s (including past the 400 s board limit) keeps 4.
pub const COMPENSATION_TABLE: DurationTable<u32> = DurationTable::new(
    &[(0.0, 0), (300.0, 2), (360.0, 4)],
    ThresholdRule::From,
);
