//! Size-capped two-pass video encoding.
//!
//! [`engine::FitPipeline`] takes a clip and a size profile, renders the audio
//! to learn its exact size, spends the remaining bytes on video and runs a
//! two-pass ffmpeg encode, reporting (never correcting) any overshoot.

pub mod config;
pub mod engine;
