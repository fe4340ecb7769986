//! Single-job assembly pipeline.
//!
//! plan chapters -> write manifests -> resolve cover -> mux into a staging
//! file -> commit to the output path. Every artifact lives in one
//! [`TempArtifacts`] which is cleaned up whether the job succeeds or fails.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{TempArtifacts, CONCAT_MANIFEST_NAME, METADATA_MANIFEST_NAME};
use crate::chapters::{plan_chapters, total_ms};
use crate::config::OutputConfig;
use crate::cover::{resolve_cover, CoverError, CoverSource};
use crate::job_executor::EventSink;
use crate::jobs::Job;
use crate::manifest::{build_concat_manifest, build_metadata_manifest, ManifestError};
use crate::mux::{run_mux, AudioMode, MuxError, MuxParams};
use crate::replace::{commit_output, CommitError};
use crate::tool::{file_label, Toolchain};

/// Error type for a failed assembly
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The job has nothing to assemble
    #[error("Job has no tracks")]
    NoTracks,

    /// Creating the artifact directory or writing a manifest failed
    #[error("Failed to prepare temporary files: {0}")]
    Artifacts(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// An explicitly supplied cover could not be used
    #[error("Cover error: {0}")]
    Cover(#[from] CoverError),

    #[error("Mux failed: {0}")]
    Mux(#[from] MuxError),

    #[error("Could not write output: {0}")]
    Commit(#[from] CommitError),
}

/// Per-run transcoding options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Stream-copy the audio instead of re-encoding it.
    pub copy_audio: bool,
    /// AAC bitrate used when re-encoding.
    pub aac_bitrate: String,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            copy_audio: true,
            aac_bitrate: "128k".to_string(),
        }
    }
}

impl From<&OutputConfig> for AssembleOptions {
    fn from(output: &OutputConfig) -> Self {
        Self {
            copy_audio: output.copy_audio,
            aac_bitrate: output.aac_bitrate.clone(),
        }
    }
}

impl AssembleOptions {
    fn audio_mode(&self) -> AudioMode {
        AudioMode::from_options(self.copy_audio, &self.aac_bitrate)
    }
}

/// Summary of a successful assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembleReport {
    pub output_path: PathBuf,
    pub chapters: usize,
    pub duration_ms: u64,
    pub cover: Option<CoverSource>,
}

/// Assemble `job` into a single audiobook at `output_path`.
///
/// Blocks until ffmpeg exits. Progress messages are sent to `events` as log
/// events; the returned error carries the failure detail.
pub fn assemble_job(
    job: &Job,
    output_path: &Path,
    options: &AssembleOptions,
    tools: &Toolchain,
    events: &EventSink,
) -> Result<AssembleReport, AssembleError> {
    if job.tracks.is_empty() {
        return Err(AssembleError::NoTracks);
    }

    let mut artifacts = TempArtifacts::for_output(output_path)?;
    let result = run_pipeline(job, output_path, options, tools, events, &mut artifacts);

    let report = artifacts.cleanup();
    if !report.is_clean() {
        warn!(
            job = %job.id,
            failures = report.failures.len(),
            "some temporary files could not be removed"
        );
        events.log(
            &job.id,
            format!("Warning: {} temporary file(s) could not be removed", report.failures.len()),
        );
    }

    result
}

fn run_pipeline(
    job: &Job,
    output_path: &Path,
    options: &AssembleOptions,
    tools: &Toolchain,
    events: &EventSink,
    artifacts: &mut TempArtifacts,
) -> Result<AssembleReport, AssembleError> {
    // Recomputed from the current track order on every run.
    let chapters = plan_chapters(&job.tracks);

    events.log(&job.id, format!("Creating concat list for {} tracks", job.tracks.len()));
    let concat_manifest = artifacts.write(CONCAT_MANIFEST_NAME, build_concat_manifest(&job.tracks)?)?;

    let cover = resolve_cover(job, artifacts, tools)?;
    match &cover {
        Some(c) => events.log(&job.id, format!("Using cover from {}", describe_source(&c.source))),
        None => events.log(&job.id, "No cover found".to_string()),
    }

    events.log(&job.id, format!("Writing metadata with {} chapters", chapters.len()));
    let metadata_manifest =
        artifacts.write(METADATA_MANIFEST_NAME, build_metadata_manifest(&job.metadata, &chapters))?;

    let staged = artifacts.reserve(&format!("{}.partial", file_label(output_path)));
    let params = MuxParams {
        concat_manifest,
        metadata_manifest,
        cover: cover.as_ref().map(|c| c.path.clone()),
        output_path: staged.clone(),
        audio_mode: options.audio_mode(),
    };

    events.log(&job.id, "ffmpeg is running...".to_string());
    run_mux(tools, &params)?;

    commit_output(&staged, output_path)?;
    info!(job = %job.id, output = %output_path.display(), "audiobook written");

    Ok(AssembleReport {
        output_path: output_path.to_path_buf(),
        chapters: chapters.len(),
        duration_ms: total_ms(&chapters),
        cover: cover.map(|c| c.source),
    })
}

fn describe_source(source: &CoverSource) -> String {
    match source {
        CoverSource::Inline => "inline image data".to_string(),
        CoverSource::File(path) => file_label(path),
        CoverSource::Extracted(path) => format!("embedded art in {}", file_label(path)),
    }
}
