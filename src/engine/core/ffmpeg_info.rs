use anyhow::{Context, Result};
use std::process::Command;

/// First line of `<program> -version`
pub fn tool_version(program: &str) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {}. Is it installed and in PATH?", program))?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", program, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version() -> Result<String> {
    tool_version("ffmpeg")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version() -> Result<String> {
    tool_version("ffprobe")
}

/// Check if this ffmpeg build ships the named encoder (e.g. `libvpx-vp9`)
pub fn encoder_available(encoder: &str) -> bool {
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-encoders")
        .output();

    match output {
        Ok(out) if out.status.success() => {
            encoder_listed(&String::from_utf8_lossy(&out.stdout), encoder)
        }
        _ => false,
    }
}

/// Whether `ffmpeg -encoders` output lists `encoder` by exact name
pub fn encoder_listed(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}
