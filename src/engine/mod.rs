// Encoding engine - independent of the command line

pub mod core;
pub mod probe;

pub use core::*;
pub use probe::{AudioStreamInfo, FfprobeProbe, FrameRate, InputInfo, MediaProbe};
