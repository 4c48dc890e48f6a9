use super::tables::{DurationTable, FPS_TABLE};
use crate::engine::probe::FrameRate;

/// Caps the output frame rate by clip duration
#[derive(Debug, Clone, Copy)]
pub struct FpsModel {
    pub table: DurationTable<f64>,
}

impl Default for FpsModel {
    fn default() -> Self {
        Self { table: FPS_TABLE }
    }
}

impl FpsModel {
    pub fn max_fps(&self, duration_s: f64) -> f64 {
        self.table.lookup(duration_s)
    }

    /// Target fps for the `fps` filter, or `None` when the source already
    /// runs at or below the cap. An unknown source rate gets the cap.
    pub fn target_fps(&self, duration_s: f64, source: Option<FrameRate>) -> Option<f64> {
        let cap = self.max_fps(duration_s);
        match source {
            Some(rate) if round_fps(rate.as_f64()) <= cap => None,
            _ => Some(cap),
        }
    }
}

/// Source rates are compared at two decimals (29.97, 59.94)
fn round_fps(fps: f64) -> f64 {
    (fps * 100.0).round() / 100.0
}
