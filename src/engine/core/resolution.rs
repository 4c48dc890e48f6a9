// Output resolution from target bitrate: calibrated curves, table snapping
// and the even-dimension search.

use super::tables::{
    CALIBRATION_HEIGHT, DurationTable, MAX_RAW_RESOLUTION, RESOLUTION_FALLBACK, RESOLUTION_TABLE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// `scale = a * ln(bitrate / b)`
    #[default]
    Logarithmic,
    /// `scale = a*x^3 + b*x^2 + c*x + d`
    Cubic,
    /// Duration table only, source is never probed
    Table,
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeMode::Logarithmic => "logarithmic",
            ResizeMode::Cubic => "cubic",
            ResizeMode::Table => "table",
        })
    }
}

impl FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logarithmic" | "log" => Ok(ResizeMode::Logarithmic),
            "cubic" => Ok(ResizeMode::Cubic),
            "table" => Ok(ResizeMode::Table),
            other => Err(format!(
                "unknown resize mode '{}' (expected logarithmic, cubic or table)",
                other
            )),
        }
    }
}

/// Empirical curve-fit constants. Fitted against the duration fallback table
/// at 1080p; overridable through the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveCoefficients {
    #[serde(default = "default_log_a")]
    pub log_a: f64,
    #[serde(default = "default_log_b")]
    pub log_b: f64,
    #[serde(default = "default_cubic_a")]
    pub cubic_a: f64,
    #[serde(default = "default_cubic_b")]
    pub cubic_b: f64,
    #[serde(default = "default_cubic_c")]
    pub cubic_c: f64,
    #[serde(default = "default_cubic_d")]
    pub cubic_d: f64,
}

fn default_log_a() -> f64 {
    2.311e-01
}
fn default_log_b() -> f64 {
    3.547e+01
}
fn default_cubic_a() -> f64 {
    1.318e-10
}
fn default_cubic_b() -> f64 {
    -6.532e-07
}
fn default_cubic_c() -> f64 {
    1.110e-03
}
fn default_cubic_d() -> f64 {
    1.977e-01
}

impl Default for CurveCoefficients {
    fn default() -> Self {
        Self {
            log_a: default_log_a(),
            log_b: default_log_b(),
            cubic_a: default_cubic_a(),
            cubic_b: default_cubic_b(),
            cubic_c: default_cubic_c(),
            cubic_d: default_cubic_d(),
        }
    }
}

impl CurveCoefficients {
    pub fn logarithmic(&self, bitrate_kbps: f64) -> f64 {
        self.log_a * (bitrate_kbps / self.log_b).ln()
    }

    pub fn cubic(&self, bitrate_kbps: f64) -> f64 {
        let x = bitrate_kbps;
        self.cubic_a * x.powi(3) + self.cubic_b * x.powi(2) + self.cubic_c * x + self.cubic_d
    }
}

/// Where the chosen resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionSource {
    Curve,
    /// Source unavailable or table mode: duration table
    Fallback,
}

/// Max output dimension; `max_dimension == None` means no resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionChoice {
    pub max_dimension: Option<u32>,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolutionModel {
    pub mode: ResizeMode,
    pub curves: CurveCoefficients,
    /// Use the raw curve value (capped) instead of snapping to the table
    pub bypass_table: bool,
    pub fallback: DurationTable<u32>,
}

impl Default for ResolutionModel {
    fn default() -> Self {
        Self {
            mode: ResizeMode::default(),
            curves: CurveCoefficients::default(),
            bypass_table: false,
            fallback: RESOLUTION_FALLBACK,
        }
    }
}

impl ResolutionModel {
    pub fn new(mode: ResizeMode, curves: CurveCoefficients, bypass_table: bool) -> Self {
        Self {
            mode,
            curves,
            bypass_table,
            fallback: RESOLUTION_FALLBACK,
        }
    }

    /// Whether [`choose`](Self::choose) wants the source dimensions at all
    pub fn needs_source(&self) -> bool {
        self.mode != ResizeMode::Table
    }

    /// Pick the output max dimension. `source` is the probed (width, height),
    /// or `None` when probing failed.
    pub fn choose(
        &self,
        bitrate_kbps: u32,
        duration_s: f64,
        source: Option<(u32, u32)>,
    ) -> ResolutionChoice {
        let curve = match (self.mode, source) {
            (ResizeMode::Table, _) | (_, None) => None,
            (_, Some((w, h))) if w == 0 || h == 0 => None,
            (_, Some(dims)) => Some(self.from_curve(bitrate_kbps, dims)),
        };

        match curve {
            Some(max_dimension) => ResolutionChoice {
                max_dimension,
                source: ResolutionSource::Curve,
            },
            None => ResolutionChoice {
                max_dimension: Some(self.fallback.lookup(duration_s)),
                source: ResolutionSource::Fallback,
            },
        }
    }

    /// Raw curve value: the normalized max dimension times the fitted scale
    pub fn curve_value(&self, bitrate_kbps: u32, (width, height): (u32, u32)) -> f64 {
        let (norm_w, norm_h) = normalize_to_calibration(width, height);
        let scale = match self.mode {
            ResizeMode::Cubic => self.curves.cubic(bitrate_kbps as f64),
            _ => self.curves.logarithmic(bitrate_kbps as f64),
        };
        // Pixel budget scaled, then turned back into a linear dimension
        let scaled_pixels = norm_w * norm_h * scale;
        (scaled_pixels / norm_w).max(scaled_pixels / norm_h)
    }

    fn from_curve(&self, bitrate_kbps: u32, (width, height): (u32, u32)) -> Option<u32> {
        let raw_max = width.max(height);
        let calculated = self.curve_value(bitrate_kbps, (width, height));

        let chosen = if self.bypass_table {
            // Floor at the smallest table entry, like the snapped path
            calculated.clamp(RESOLUTION_TABLE[0] as f64, MAX_RAW_RESOLUTION as f64) as u32
        } else {
            snap_to_table(calculated)
        };

        if raw_max <= chosen {
            return None;
        }

        let (norm_w, norm_h) = normalize_to_calibration(width, height);
        let final_scale = chosen as f64 / norm_w.max(norm_h);
        scale_to_even(width, height, norm_w * final_scale, norm_h * final_scale)
    }
}

/// Scale so the smaller dimension equals the calibration height
pub fn normalize_to_calibration(width: u32, height: u32) -> (f64, f64) {
    let factor = CALIBRATION_HEIGHT / width.min(height) as f64;
    (width as f64 * factor, height as f64 * factor)
}

/// Largest table entry at or below `value`; below the table, the smallest entry
pub fn snap_to_table(value: f64) -> u32 {
    RESOLUTION_TABLE
        .iter()
        .copied()
        .take_while(|res| value >= *res as f64)
        .last()
        .unwrap_or(RESOLUTION_TABLE[0])
}

/// Find the nearest size at or below `scaled_*` whose rounded width and
/// height are both even, stepping the height down one pixel at a time and
/// rescaling from the original aspect ratio. Returns the max dimension, or
/// `None` if the search reaches zero.
pub fn scale_to_even(
    original_width: u32,
    original_height: u32,
    scaled_width: f64,
    scaled_height: f64,
) -> Option<u32> {
    let mut width = scaled_width.round() as i64;
    let mut height = scaled_height.round() as i64;
    let mut next_height = height;

    while width % 2 != 0 || height % 2 != 0 {
        next_height -= 1;
        if next_height <= 0 || original_height == 0 {
            return None;
        }
        let scale = next_height as f64 / original_height as f64;
        width = (original_width as f64 * scale).round() as i64;
        height = (original_height as f64 * scale).round() as i64;
    }

    let max = width.max(height);
    if max <= 0 { None } else { Some(max as u32) }
}

/// ffmpeg scale filter bounding the larger side while keeping aspect
pub fn scale_filter(max_dimension: u32) -> String {
    format!(
        "scale='min({r},iw)':'min({r},ih)':force_original_aspect_ratio=decrease",
        r = max_dimension
    )
}
