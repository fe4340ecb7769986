//! Job model: tracks, book metadata, cover reference and output location.
//!
//! A [`Job`] is built once from a folder, edited by the caller (reorder,
//! rename, delete, metadata), and then handed read-only to the pipeline.
//! Batches of jobs can be persisted as JSON for review before running.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::probe::{probe_track, tag, TrackProbe};
use crate::scan::scan_folder;
use crate::tool::Toolchain;

/// Errors from editing a job's track list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobEditError {
    #[error("track index {index} out of range (job has {len} tracks)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors from building a job out of a folder.
#[derive(Debug, Error)]
pub enum JobBuildError {
    #[error("no audio files found in {0}")]
    NoAudioFiles(PathBuf),
}

/// Errors reading or writing a batch file.
#[derive(Debug, Error)]
pub enum BatchFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid batch file: {0}")]
    Json(#[from] serde_json::Error),
}

/// One source audio file and what probing found out about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// Source file path; identity of the track.
    pub path: PathBuf,
    /// File name shown to the user.
    pub filename: String,
    /// Duration in seconds (never negative).
    pub duration_secs: f64,
    /// Whether the file carries an embedded picture.
    #[serde(default)]
    pub has_embedded_image: bool,
    /// Format-level tags as reported by the prober.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// User-chosen chapter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

impl Track {
    /// Track with no probe information (zero length, no tags).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_probe(path, TrackProbe::default())
    }

    pub fn from_probe(path: impl Into<PathBuf>, probe: TrackProbe) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            filename,
            duration_secs: sanitize_duration(probe.duration_secs),
            has_embedded_image: probe.has_embedded_image,
            tags: probe.tags,
            custom_name: None,
        }
    }

    /// Builder-style duration setter, mostly handy for tests and callers
    /// that already know the length.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = sanitize_duration(secs);
        self
    }

    /// Chapter title: custom name, else the `title` tag, else the file name.
    ///
    /// Empty when none of those are usable.
    pub fn chapter_title(&self) -> String {
        self.custom_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| tag(&self.tags, "title").map(str::trim))
            .unwrap_or(self.filename.trim())
            .to_string()
    }
}

fn sanitize_duration(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}

/// Global tags written into the audiobook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl BookMetadata {
    /// Defaults derived from the first track's tags.
    ///
    /// The title prefers the album tag (a track title is usually a chapter
    /// name), then the track title, then the folder name.
    pub fn from_tags(tags: &BTreeMap<String, String>, folder_name: &str) -> Self {
        let get = |key: &str| tag(tags, key).map(str::to_string);
        let title = get("album")
            .or_else(|| get("title"))
            .or_else(|| Some(folder_name.to_string()).filter(|n| !n.is_empty()));

        Self {
            title,
            author: get("artist"),
            album: get("album"),
            year: get("date"),
            genre: get("genre"),
        }
    }
}

/// Where the cover art for a job comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoverArt {
    /// Nothing chosen; the resolver may still extract one from the tracks.
    #[default]
    None,
    /// Image file supplied by the user.
    File { path: PathBuf },
    /// Base64 image data, either bare or as a `data:image/...;base64,` URL.
    Inline { data: String },
}

/// One audiobook to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique job identifier (UUID).
    pub id: String,
    /// Folder the tracks were scanned from.
    pub source_dir: PathBuf,
    /// Display name, also the default output file stem.
    pub name: String,
    /// Tracks in chapter order.
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub metadata: BookMetadata,
    #[serde(default)]
    pub cover: CoverArt,
    /// Where the finished audiobook is written.
    pub output_path: PathBuf,
}

impl Job {
    /// Create a job with a fresh id.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        tracks: Vec<Track>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_dir: source_dir.into(),
            name: name.into(),
            tracks,
            metadata: BookMetadata::default(),
            cover: CoverArt::None,
            output_path: output_path.into(),
        }
    }

    /// Scan `dir`, probe every audio file and assemble a job from the result.
    ///
    /// The output goes to `<output_dir or dir>/<folder name>.<extension>`.
    pub fn from_folder(
        dir: &Path,
        recursive: bool,
        tools: &Toolchain,
        output_dir: Option<&Path>,
        extension: &str,
    ) -> Result<Self, JobBuildError> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "audiobook".to_string());
        let output_path = default_output_path(dir, output_dir, &name, extension);

        // Skip the output of an earlier run; .m4b is on the audio allow-list.
        let own_output = std::path::absolute(&output_path).unwrap_or_else(|_| output_path.clone());
        let paths: Vec<PathBuf> = scan_folder(dir, recursive)
            .into_iter()
            .filter(|p| *p != own_output)
            .collect();
        if paths.is_empty() {
            return Err(JobBuildError::NoAudioFiles(dir.to_path_buf()));
        }
        info!(folder = %dir.display(), files = paths.len(), "found audio files");

        let tracks: Vec<Track> = paths
            .into_iter()
            .map(|path| {
                let probe = probe_track(tools, &path);
                debug!(path = %path.display(), duration = probe.duration_secs, "probed track");
                Track::from_probe(path, probe)
            })
            .collect();

        let metadata = BookMetadata::from_tags(&tracks[0].tags, &name);

        let mut job = Self::new(dir, name, tracks, output_path);
        job.metadata = metadata;
        Ok(job)
    }

    /// Sum of all track durations in seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.tracks.iter().map(|t| t.duration_secs).sum()
    }

    fn check_index(&self, index: usize) -> Result<(), JobEditError> {
        if index < self.tracks.len() {
            Ok(())
        } else {
            Err(JobEditError::IndexOutOfRange {
                index,
                len: self.tracks.len(),
            })
        }
    }

    /// Move the track at `from` so it ends up at position `to`.
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), JobEditError> {
        self.check_index(from)?;
        self.check_index(to)?;
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        Ok(())
    }

    /// Swap a track with its predecessor. No-op for the first track.
    pub fn move_track_up(&mut self, index: usize) -> Result<(), JobEditError> {
        self.check_index(index)?;
        if index > 0 {
            self.tracks.swap(index, index - 1);
        }
        Ok(())
    }

    /// Swap a track with its successor. No-op for the last track.
    pub fn move_track_down(&mut self, index: usize) -> Result<(), JobEditError> {
        self.check_index(index)?;
        if index + 1 < self.tracks.len() {
            self.tracks.swap(index, index + 1);
        }
        Ok(())
    }

    pub fn remove_track(&mut self, index: usize) -> Result<Track, JobEditError> {
        self.check_index(index)?;
        Ok(self.tracks.remove(index))
    }

    /// Set a custom chapter name; a blank name clears the override.
    pub fn rename_track(&mut self, index: usize, name: &str) -> Result<(), JobEditError> {
        self.check_index(index)?;
        let name = name.trim();
        self.tracks[index].custom_name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        Ok(())
    }

    /// Apply batch-wide metadata: author, year and genre only, and only the
    /// non-empty ones. Title and album stay specific to each book.
    pub fn apply_shared_metadata(&mut self, shared: &BookMetadata) {
        fn non_empty(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        if let Some(author) = non_empty(&shared.author) {
            self.metadata.author = Some(author);
        }
        if let Some(year) = non_empty(&shared.year) {
            self.metadata.year = Some(year);
        }
        if let Some(genre) = non_empty(&shared.genre) {
            self.metadata.genre = Some(genre);
        }
    }
}

/// `<output_dir or source_dir>/<name>.<extension>`
pub fn default_output_path(
    source_dir: &Path,
    output_dir: Option<&Path>,
    name: &str,
    extension: &str,
) -> PathBuf {
    let dir = output_dir.unwrap_or(source_dir);
    let extension = extension.trim_start_matches('.');
    dir.join(format!("{}.{}", name, extension))
}

/// On-disk batch: an ordered list of jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchFile {
    pub jobs: Vec<Job>,
}

/// Write a batch to a pretty-printed JSON file.
pub fn save_batch(path: &Path, jobs: &[Job]) -> Result<(), BatchFileError> {
    let batch = BatchFile {
        jobs: jobs.to_vec(),
    };
    let json = serde_json::to_string_pretty(&batch)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a batch written by [`save_batch`] (or by hand).
pub fn load_batch(path: &Path) -> Result<Vec<Job>, BatchFileError> {
    let content = fs::read_to_string(path)?;
    let batch: BatchFile = serde_json::from_str(&content)?;
    Ok(batch.jobs)
}
