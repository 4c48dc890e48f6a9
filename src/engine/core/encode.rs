// Final two-pass encode: Pass1 -> Pass2 -> Verify, strictly in order.

use super::error::{FitError, Result};
use super::ffmpeg_cmd::{CommandSpec, build_encode_pass_cmd};
use super::runner::Transcoder;
use super::types::{EncodeJob, Pass, PassProgress};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Output larger than the cap. Reported, never corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeOvershoot {
    pub output_bytes: u64,
    pub cap_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeReport {
    pub output_path: PathBuf,
    pub output_bytes: u64,
    pub overshoot: Option<SizeOvershoot>,
}

/// Pass 1 and pass 2 command lines for a job
pub fn encode_commands(job: &EncodeJob) -> [CommandSpec; 2] {
    [
        build_encode_pass_cmd(job, Pass::First),
        build_encode_pass_cmd(job, Pass::Second),
    ]
}

/// Compare the produced file against the cap. Exceeding it is a warning.
pub fn verify_size(path: &Path, cap_bytes: u64) -> Result<(u64, Option<SizeOvershoot>)> {
    let output_bytes = fs::metadata(path)?.len();
    info!(
        bytes = output_bytes,
        kib = output_bytes / 1024,
        "output written to {}",
        path.display()
    );

    if output_bytes <= cap_bytes {
        return Ok((output_bytes, None));
    }

    warn!(
        output_bytes,
        cap_bytes,
        "output exceeds the size cap; rerun with a larger bitrate compensation"
    );
    Ok((
        output_bytes,
        Some(SizeOvershoot {
            output_bytes,
            cap_bytes,
        }),
    ))
}

pub struct EncodeOrchestrator<'a> {
    transcoder: &'a dyn Transcoder,
}

impl<'a> EncodeOrchestrator<'a> {
    pub fn new(transcoder: &'a dyn Transcoder) -> Self {
        Self { transcoder }
    }

    /// Run both passes and verify the result. A failed pass aborts
    /// everything after it.
    pub fn run(
        &self,
        job: &EncodeJob,
        on_progress: &mut dyn FnMut(&PassProgress),
    ) -> Result<EncodeReport> {
        let [pass1, pass2] = encode_commands(job);

        info!(kbps = job.video.bitrate_kbps, "encoding video (1st pass)");
        let out = self.transcoder.run(&pass1)?;
        if !out.success {
            return Err(FitError::encode(
                "pass 1",
                pass1.to_string(),
                &out.status,
                &out.stderr,
            ));
        }

        info!("encoding video (2nd pass)");
        let planned_s = job.window.duration_s;
        let mut report = |p: &PassProgress| on_progress(&p.with_planned(planned_s));
        let out = self.transcoder.run_with_progress(&pass2, &mut report)?;
        if !out.success {
            return Err(FitError::encode(
                "pass 2",
                pass2.to_string(),
                &out.status,
                &out.stderr,
            ));
        }

        let (output_bytes, overshoot) = verify_size(&job.output_path, job.cap_bytes)?;
        Ok(EncodeReport {
            output_path: job.output_path.clone(),
            output_bytes,
            overshoot,
        })
    }
}
