// Size budgeting: splits the byte cap between audio and video and turns the
// video share into a target bitrate.

use super::error::{FitError, Result};
use super::tables::{
    AUDIO_TABLE, AUDIO_TABLE_GIF, COMPENSATION_TABLE, DurationTable, MAX_BITRATE_KBPS,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery target with its own size cap, audio policy and duration limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    /// 6 MiB with sound
    #[default]
    Wsg,
    /// 4 MiB with sound
    Gif,
    /// 4 MiB, no sound
    Other,
}

impl Board {
    pub fn cap_bytes(self) -> u64 {
        match self {
            Board::Wsg => 6144 * 1024,
            Board::Gif | Board::Other => 4096 * 1024,
        }
    }

    pub fn allows_audio(self) -> bool {
        !matches!(self, Board::Other)
    }

    pub fn max_duration_s(self) -> f64 {
        match self {
            Board::Wsg => 400.0,
            Board::Gif => 300.0,
            Board::Other => 120.0,
        }
    }

    pub fn audio_table(self) -> DurationTable<u32> {
        match self {
            Board::Gif => AUDIO_TABLE_GIF,
            _ => AUDIO_TABLE,
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Board::Wsg => "wsg",
            Board::Gif => "gif",
            Board::Other => "other",
        })
    }
}

impl FromStr for Board {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wsg" => Ok(Board::Wsg),
            "gif" => Ok(Board::Gif),
            "other" => Ok(Board::Other),
            other => Err(format!("unknown board '{}' (expected wsg, gif or other)", other)),
        }
    }
}

/// Named size profile: a board, optionally with a manual cap in MiB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeProfile {
    pub board: Board,
    #[serde(default)]
    pub size_mib: Option<f64>,
}

impl SizeProfile {
    pub fn cap_bytes(&self) -> u64 {
        match self.size_mib {
            Some(mib) => (mib * 1024.0 * 1024.0) as u64,
            None => self.board.cap_bytes(),
        }
    }
}

/// Reject clips longer than the board allows
pub fn check_duration(board: Board, duration_s: f64) -> Result<()> {
    let limit_s = board.max_duration_s();
    if duration_s > limit_s {
        return Err(FitError::DurationExceeded {
            duration_s,
            limit_s,
        });
    }
    Ok(())
}

/// Byte split of the cap; audio + video never exceeds the cap
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeBudget {
    pub cap_bytes: u64,
    pub audio_bytes: u64,
    pub video_bytes: u64,
    pub duration_s: f64,
}

impl SizeBudget {
    pub fn new(cap_bytes: u64, audio_bytes: u64, duration_s: f64) -> Result<Self> {
        if !(duration_s > 0.0) {
            return Err(FitError::InvalidDuration(duration_s));
        }
        let video_bytes = cap_bytes
            .checked_sub(audio_bytes)
            .filter(|bytes| *bytes > 0)
            .ok_or(FitError::BudgetExceeded {
                cap_bytes,
                audio_bytes,
            })?;

        Ok(Self {
            cap_bytes,
            audio_bytes,
            video_bytes,
            duration_s,
        })
    }
}

/// Video bitrate derived from a budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoBitrate {
    /// Raw budget rate, capped at the ceiling
    pub target_kbps: u32,
    /// Automatic (table) plus manual subtraction
    pub compensation_kbps: i64,
    /// Rate actually handed to the encoder
    pub compensated_kbps: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetCalculator {
    pub ceiling_kbps: u32,
    pub compensation: DurationTable<u32>,
    /// Extra subtraction supplied by the user (kbps, may be negative)
    pub manual_compensation_kbps: i32,
}

impl Default for BudgetCalculator {
    fn default() -> Self {
        Self {
            ceiling_kbps: MAX_BITRATE_KBPS,
            compensation: COMPENSATION_TABLE,
            manual_compensation_kbps: 0,
        }
    }
}

impl BudgetCalculator {
    pub fn with_manual_compensation(mut self, kbps: i32) -> Self {
        self.manual_compensation_kbps = kbps;
        self
    }

    pub fn with_ceiling(mut self, kbps: u32) -> Self {
        self.ceiling_kbps = kbps;
        self
    }

    /// Uncompensated rate: video bytes spread over the duration, capped
    pub fn target_kbps(&self, budget: &SizeBudget) -> u32 {
        let kbits = budget.video_bytes as f64 * 8.0 / 1024.0;
        let rate = (kbits / budget.duration_s).floor();
        (rate.min(self.ceiling_kbps as f64)).max(0.0) as u32
    }

    /// Compensated rate. This only nudges the encoder; the real size is
    /// checked after the encode.
    pub fn video_bitrate(&self, budget: &SizeBudget) -> Result<VideoBitrate> {
        let target_kbps = self.target_kbps(budget);
        let compensation_kbps = self.compensation.lookup(budget.duration_s) as i64
            + self.manual_compensation_kbps as i64;
        let compensated = target_kbps as i64 - compensation_kbps;

        if compensated <= 0 {
            return Err(FitError::BudgetExceeded {
                cap_bytes: budget.cap_bytes,
                audio_bytes: budget.audio_bytes,
            });
        }

        Ok(VideoBitrate {
            target_kbps,
            compensation_kbps,
            compensated_kbps: compensated as u32,
        })
    }
}
