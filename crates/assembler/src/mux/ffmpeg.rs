//! ffmpeg mux command for the finished audiobook.
//!
//! Joins the concat manifest into one audio stream, applies global tags and
//! chapters from the metadata manifest, optionally attaches a cover, and
//! writes an MP4 container branded as an audiobook.

use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

use crate::tool::Toolchain;

/// Major brand written to the container. The trailing space is part of it.
const AUDIOBOOK_BRAND: &str = "M4A ";

/// iTunes `stik` value for audiobooks.
const MEDIA_TYPE_AUDIOBOOK: &str = "media_type=2";

/// Error type for mux operations
#[derive(Debug, Error)]
pub enum MuxError {
    /// ffmpeg exited with non-zero status
    #[error("ffmpeg failed with exit code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    /// ffmpeg was terminated by a signal
    #[error("ffmpeg process was terminated by signal")]
    Terminated,

    /// ffmpeg reported success but wrote nothing
    #[error("ffmpeg produced no output at {0}")]
    EmptyOutput(PathBuf),

    /// IO error while starting ffmpeg
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the audio stream is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioMode {
    /// Stream-copy the concatenated audio.
    Copy,
    /// Re-encode to AAC at the given bitrate (e.g. "128k").
    Reencode { bitrate: String },
}

impl AudioMode {
    pub fn from_options(copy_audio: bool, bitrate: &str) -> Self {
        if copy_audio {
            AudioMode::Copy
        } else {
            AudioMode::Reencode {
                bitrate: bitrate.to_string(),
            }
        }
    }
}

/// Inputs of one mux run.
#[derive(Debug, Clone)]
pub struct MuxParams {
    /// Concat demuxer list, input 0
    pub concat_manifest: PathBuf,
    /// FFMETADATA file, input 1
    pub metadata_manifest: PathBuf,
    /// Staged cover image, input 2 when present
    pub cover: Option<PathBuf>,
    /// File ffmpeg writes (overwritten if it exists)
    pub output_path: PathBuf,
    pub audio_mode: AudioMode,
}

/// Build the ffmpeg mux command.
///
/// Every path and value is a separate argument; nothing passes through a
/// shell.
pub fn build_mux_command(tools: &Toolchain, params: &MuxParams) -> Command {
    let mut cmd = tools.ffmpeg_command();

    // Inputs: concat list, metadata, optional cover
    cmd.args(["-f", "concat", "-safe", "0"])
        .arg("-i")
        .arg(&params.concat_manifest);
    cmd.arg("-i").arg(&params.metadata_manifest);
    if let Some(cover) = &params.cover {
        cmd.arg("-i").arg(cover);
    }

    // Stream mapping. Global tags and chapters come from the metadata input
    // only, so per-track tags carried by the concat input are discarded.
    cmd.args(["-map", "0:a"]);
    if params.cover.is_some() {
        cmd.args(["-map", "2:v"]);
    }
    cmd.args(["-map_metadata", "1", "-map_chapters", "1"]);

    match &params.audio_mode {
        AudioMode::Copy => {
            cmd.args(["-c:a", "copy"]);
        }
        AudioMode::Reencode { bitrate } => {
            cmd.args(["-c:a", "aac", "-b:a"]).arg(bitrate);
        }
    }

    if params.cover.is_some() {
        cmd.args(["-c:v", "copy", "-disposition:v:0", "attached_pic"]);
    }

    // Audiobook container tags and layout
    cmd.args(["-metadata", MEDIA_TYPE_AUDIOBOOK, "-metadata", "track=1"]);
    cmd.args(["-brand", AUDIOBOOK_BRAND]);
    cmd.args(["-f", "mp4", "-movflags", "+faststart"]);

    cmd.arg(&params.output_path);

    cmd
}

/// Run the mux command and wait for ffmpeg to exit.
pub fn run_mux(tools: &Toolchain, params: &MuxParams) -> Result<(), MuxError> {
    let mut cmd = build_mux_command(tools, params);

    let output = tools.run(&mut cmd)?;

    if !output.success() {
        return match output.code {
            Some(code) => Err(MuxError::Failed {
                code,
                stderr: output.stderr_tail(),
            }),
            None => Err(MuxError::Terminated),
        };
    }

    match std::fs::metadata(&params.output_path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MuxError::EmptyOutput(params.output_path.clone())),
    }
}
