//! M4B Assembler
//!
//! Turns a folder of sequential audio tracks into one chaptered audiobook:
//! scanning, probing, cover resolution, chapter planning, ffmpeg manifests,
//! the mux invocation and sequential batch execution.

pub mod artifacts;
pub mod assemble;
pub mod chapters;
pub mod cover;
pub mod job_executor;
pub mod jobs;
pub mod manifest;
pub mod mux;
pub mod probe;
pub mod replace;
pub mod scan;
pub mod startup;
pub mod tool;

pub use m4b_assembler_config as config;
pub use m4b_assembler_config::Config;
pub use artifacts::{CleanupReport, TempArtifacts};
pub use assemble::{assemble_job, AssembleError, AssembleOptions, AssembleReport};
pub use chapters::{plan_chapters, ChapterEntry};
pub use cover::{extract_cover, resolve_cover, CoverError, CoverSource, ResolvedCover};
pub use job_executor::{
    BatchEvent, BatchExecutor, BatchState, BatchSummary, EventSink, JobOutcome, JobResult,
};
pub use jobs::{
    load_batch, save_batch, BatchFileError, BookMetadata, CoverArt, Job, JobBuildError,
    JobEditError, Track,
};
pub use manifest::{build_concat_manifest, build_metadata_manifest, ManifestError};
pub use mux::{build_mux_command, run_mux, AudioMode, MuxError, MuxParams};
pub use probe::{probe_track, try_probe_track, ProbeError, TrackProbe};
pub use replace::{commit_output, CommitError};
pub use scan::{is_audio_file, scan_folder};
pub use startup::{
    check_ffmpeg_available, check_ffprobe_available, parse_ffmpeg_version, run_startup_checks,
    StartupError,
};
pub use tool::{CommandRunner, SystemRunner, ToolOutput, Toolchain};
