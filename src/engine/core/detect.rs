// Parsing for the cropdetect and silencedetect analysis passes

use super::segments::TimeRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Silence closer than this to a clip edge counts as touching it (seconds)
const EDGE_TOLERANCE_S: f64 = 0.1;

/// Last `crop=` value reported by cropdetect
pub fn parse_cropdetect(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .filter(|line| line.contains("cropdetect") && line.contains("crop="))
        .filter_map(|line| line.split_whitespace().last())
        .filter(|tok| tok.starts_with("crop="))
        .last()
        .map(str::to_string)
}

/// Silent spans reported by silencedetect, relative to the analysed window.
/// A start with no matching end runs to `duration_s`.
pub fn parse_silences(stderr: &str, duration_s: f64) -> Vec<TimeRange> {
    let mut silences = Vec::new();
    let mut open: Option<f64> = None;

    for line in stderr.lines().filter(|l| l.contains("silencedetect")) {
        let toks: Vec<&str> = line.split_whitespace().collect();
        if let Some(start) = value_after(&toks, "silence_start:") {
            open = Some(start);
        }
        if let Some(end) = value_after(&toks, "silence_end:") {
            let start = open.take().unwrap_or(0.0);
            if let Some(range) = TimeRange::new(start.max(0.0), end.min(duration_s)) {
                silences.push(range);
            }
        }
    }

    if let Some(start) = open {
        if let Some(range) = TimeRange::new(start.max(0.0), duration_s) {
            silences.push(range);
        }
    }
    silences
}

fn value_after(toks: &[&str], key: &str) -> Option<f64> {
    let idx = toks.iter().position(|t| *t == key)?;
    toks.get(idx + 1)?.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilenceTrimMode {
    Start,
    End,
    StartAndEnd,
    /// Edges plus every interior silence
    All,
}

impl SilenceTrimMode {
    fn trims_start(self) -> bool {
        !matches!(self, SilenceTrimMode::End)
    }

    fn trims_end(self) -> bool {
        !matches!(self, SilenceTrimMode::Start)
    }
}

impl fmt::Display for SilenceTrimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SilenceTrimMode::Start => "start",
            SilenceTrimMode::End => "end",
            SilenceTrimMode::StartAndEnd => "start_and_end",
            SilenceTrimMode::All => "all",
        })
    }
}

impl FromStr for SilenceTrimMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(SilenceTrimMode::Start),
            "end" => Ok(SilenceTrimMode::End),
            "start_and_end" => Ok(SilenceTrimMode::StartAndEnd),
            "all" => Ok(SilenceTrimMode::All),
            other => Err(format!(
                "unknown silence trim mode '{}' (expected start, end, start_and_end or all)",
                other
            )),
        }
    }
}

/// Window adjustment derived from detected silences
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SilenceTrim {
    /// Seconds to move the clip start forward
    pub start_shift_s: f64,
    /// New clip duration
    pub duration_s: f64,
    /// Interior silences to cut, relative to the shifted start
    pub cuts: Vec<TimeRange>,
}

/// Work out how `silences` (relative to a window of `duration_s`) trim the clip
pub fn plan_silence_trim(
    silences: &[TimeRange],
    duration_s: f64,
    mode: SilenceTrimMode,
) -> SilenceTrim {
    let mut trim = SilenceTrim {
        start_shift_s: 0.0,
        duration_s,
        cuts: Vec::new(),
    };
    let mut interior = silences;

    if mode.trims_start() {
        if let Some((first, rest)) = interior.split_first() {
            if first.start < EDGE_TOLERANCE_S {
                trim.start_shift_s = first.end;
                trim.duration_s -= first.end;
                interior = rest;
            }
        }
    }

    if mode.trims_end() {
        if let Some((last, rest)) = interior.split_last() {
            if duration_s - last.end < EDGE_TOLERANCE_S {
                trim.duration_s -= duration_s - last.start;
                interior = rest;
            }
        }
    }

    if mode == SilenceTrimMode::All {
        trim.cuts = interior
            .iter()
            .filter_map(|s| TimeRange::new(s.start - trim.start_shift_s, s.end - trim.start_shift_s))
            .collect();
    }
    trim
}
