//! External video encoding.
//!
//! Hands the finished frame sequence to ffmpeg. The encoder is
//! advisory: if it is missing or exits non-zero the frames stay on
//! disk and the run still succeeds.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Result, TplotError};

/// Codecs the encoder invocation accepts. Anything else is rejected
/// before a subprocess is ever built.
pub const ALLOWED_CODECS: [&str; 8] = [
    "libx264",
    "libx265",
    "libvpx",
    "libvpx-vp9",
    "h264",
    "hevc",
    "vp8",
    "vp9",
];

/// Whether a codec name is in the allowed set.
pub fn is_valid_codec(codec: &str) -> bool {
    ALLOWED_CODECS.contains(&codec)
}

/// Encode the run's frames into a video.
///
/// Invokes `ffmpeg -framerate FPS -pattern_type glob -i DIR/PREFIX_*.ppm`
/// with a fixed medium/crf-23/yuv420p profile.
///
/// # Errors
///
/// `Encoder` if the codec is not allowed, ffmpeg cannot be launched,
/// or it exits non-zero. Callers treat this as a warning and keep the
/// frames.
pub fn encode_frames(
    frames_dir: &Path,
    prefix: &str,
    codec: &str,
    fps: u32,
    output: &Path,
) -> Result<()> {
    if !is_valid_codec(codec) {
        return Err(TplotError::Encoder(format!(
            "codec '{}' not in allowed set {:?}",
            codec, ALLOWED_CODECS
        )));
    }

    let pattern = frames_dir.join(format!("{}_*.ppm", prefix));

    debug!(codec, fps, output = %output.display(), "launching ffmpeg");

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-framerate")
        .arg(fps.to_string())
        .arg("-pattern_type")
        .arg("glob")
        .arg("-i")
        .arg(&pattern)
        .arg("-c:v")
        .arg(codec)
        .arg("-preset")
        .arg("medium")
        .arg("-crf")
        .arg("23")
        .arg("-pix_fmt")
        .arg("yuv420p")
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| TplotError::Encoder(format!("failed to launch ffmpeg: {}", err)))?;

    if !status.success() {
        return Err(TplotError::Encoder(format!(
            "ffmpeg exited with {}",
            status
        )));
    }

    info!(output = %output.display(), "video created");
    Ok(())
}

/// Delete the run's frame files after a successful encode.
///
/// Only `PREFIX_*.ppm` files are touched. Returns the number removed.
pub fn cleanup_frames(frames_dir: &Path, prefix: &str) -> Result<usize> {
    let frame_prefix = format!("{}_", prefix);
    let mut removed = 0usize;

    for entry in std::fs::read_dir(frames_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.starts_with(&frame_prefix) && name.ends_with(".ppm") {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, "cleaned up frame files");
    }

    Ok(removed)
}
