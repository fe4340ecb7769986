//! Temporary artifacts of one assembly attempt.
//!
//! Manifests, the staged cover and the staged output all live in a hidden
//! directory next to the job's output file. The directory is removed when
//! [`TempArtifacts::cleanup`] runs or, failing that, when the value is dropped,
//! so every exit path (including early returns and unwinding) cleans up.
//! Output directories created here are removed again if they are still empty
//! at cleanup time. Cleanup problems are logged and never reported as job
//! failures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Prefix of the per-job artifact directory.
pub const ARTIFACT_DIR_PREFIX: &str = ".m4b-assembler-";

pub const CONCAT_MANIFEST_NAME: &str = "concat_list.txt";
pub const METADATA_MANIFEST_NAME: &str = "metadata.txt";

/// What happened during cleanup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Artifacts that were deleted.
    pub removed: usize,
    /// Artifacts that were already gone.
    pub missing: usize,
    /// Human-readable descriptions of failed deletions.
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owner of every file the pipeline creates for one job.
#[derive(Debug)]
pub struct TempArtifacts {
    dir: Option<TempDir>,
    files: Vec<PathBuf>,
    /// Directories created by `for_output`, deepest first.
    created_dirs: Vec<PathBuf>,
}

impl TempArtifacts {
    /// Create the artifact directory next to `output_path`.
    ///
    /// Keeping it in the output's directory puts the staged output on the
    /// same filesystem as its destination, so committing it is a rename.
    pub fn for_output(output_path: &Path) -> io::Result<Self> {
        let parent = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let created_dirs = missing_ancestors(&parent);
        fs::create_dir_all(&parent)?;

        let dir = tempfile::Builder::new()
            .prefix(ARTIFACT_DIR_PREFIX)
            .tempdir_in(&parent)?;
        debug!(dir = %dir.path().display(), "created artifact directory");

        Ok(Self {
            dir: Some(dir),
            files: Vec::new(),
            created_dirs,
        })
    }

    /// Directory holding this job's artifacts.
    pub fn dir(&self) -> &Path {
        self.dir
            .as_ref()
            .map(|d| d.path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// Reserve a path inside the artifact directory for a file some other
    /// party (e.g. ffmpeg) will create. The path is tracked for cleanup.
    pub fn reserve(&mut self, name: &str) -> PathBuf {
        let path = self.dir().join(name);
        if !self.files.contains(&path) {
            self.files.push(path.clone());
        }
        path
    }

    /// Write `contents` to a tracked file in the artifact directory.
    pub fn write(&mut self, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = self.reserve(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Copy an existing file into the artifact directory under `name`.
    pub fn copy_in(&mut self, source: &Path, name: &str) -> io::Result<PathBuf> {
        let path = self.reserve(name);
        fs::copy(source, &path)?;
        Ok(path)
    }

    /// Paths of every tracked artifact, in creation order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every tracked file and the directory itself.
    pub fn cleanup(mut self) -> CleanupReport {
        self.cleanup_in_place()
    }

    fn cleanup_in_place(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for path in self.files.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove temporary artifact");
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(dir = %dir_path.display(), error = %e, "failed to remove artifact directory");
                report.failures.push(format!("{}: {}", dir_path.display(), e));
            }
        }

        // Anything still holding files, such as a committed output, stays.
        for created in self.created_dirs.drain(..) {
            if let Err(e) = fs::remove_dir(&created) {
                debug!(dir = %created.display(), error = %e, "keeping output directory");
                break;
            }
            debug!(dir = %created.display(), "removed empty output directory");
        }

        report
    }
}

/// `dir` and each of its ancestors that does not exist yet, deepest first.
fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        if self.dir.is_some() {
            let report = self.cleanup_in_place();
            debug!(removed = report.removed, "artifact directory removed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifacts_live_next_to_output() {
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("Book.m4b");

        let artifacts = TempArtifacts::for_output(&output).unwrap();

        assert_eq!(artifacts.dir().parent(), Some(out_dir.path()));
        let name = artifacts.dir().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(ARTIFACT_DIR_PREFIX));
    }

    #[test]
    fn test_cleanup_removes_everything() {
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("Book.m4b");
        let source = out_dir.path().join("art.jpg");
        fs::write(&source, b"jpeg").unwrap();

        let mut artifacts = TempArtifacts::for_output(&output).unwrap();
        let concat = artifacts.write(CONCAT_MANIFEST_NAME, "file 'a'\n").unwrap();
        let meta = artifacts.write(METADATA_MANIFEST_NAME, ";FFMETADATA1\n").unwrap();
        let cover = artifacts.copy_in(&source, "cover.jpg").unwrap();
        let dir = artifacts.dir().to_path_buf();

        assert!(concat.exists() && meta.exists() && cover.exists());
        assert_eq!(artifacts.files().len(), 3);

        let report = artifacts.cleanup();

        assert_eq!(report.removed, 3);
        assert!(report.is_clean());
        assert!(!dir.exists());
        // Only the user's own file remains in the output directory.
        assert!(source.exists());
        assert_eq!(fs::read_dir(out_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_reserved_but_never_created_counts_as_missing() {
        let out_dir = TempDir::new().unwrap();
        let mut artifacts = TempArtifacts::for_output(&out_dir.path().join("x.m4b")).unwrap();
        artifacts.reserve("cover.png");
        artifacts.reserve("cover.png"); // tracked once

        let report = artifacts.cleanup();
        assert_eq!(report.missing, 1);
        assert_eq!(report.removed, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_drop_cleans_up() {
        let out_dir = TempDir::new().unwrap();
        let dir;
        {
            let mut artifacts = TempArtifacts::for_output(&out_dir.path().join("x.m4b")).unwrap();
            artifacts.write(METADATA_MANIFEST_NAME, "x").unwrap();
            dir = artifacts.dir().to_path_buf();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_cleanup_tolerates_externally_removed_directory() {
        let out_dir = TempDir::new().unwrap();
        let mut artifacts = TempArtifacts::for_output(&out_dir.path().join("x.m4b")).unwrap();
        artifacts.write(CONCAT_MANIFEST_NAME, "x").unwrap();
        fs::remove_dir_all(artifacts.dir()).unwrap();

        let report = artifacts.cleanup();
        assert_eq!(report.missing, 1);
        // The vanished directory shows up as a logged failure, nothing more.
        assert!(report.failures.len() <= 1);
    }

    #[test]
    fn test_creates_missing_output_directory() {
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("nested").join("deeper").join("x.m4b");

        let artifacts = TempArtifacts::for_output(&output).unwrap();
        assert!(artifacts.dir().starts_with(out_dir.path().join("nested").join("deeper")));
    }

    #[test]
    fn test_cleanup_removes_created_output_directories_left_empty() {
        let out_dir = TempDir::new().unwrap();
        fs::create_dir(out_dir.path().join("existing")).unwrap();
        let output = out_dir.path().join("existing").join("a").join("b").join("x.m4b");

        let mut artifacts = TempArtifacts::for_output(&output).unwrap();
        artifacts.write(CONCAT_MANIFEST_NAME, "x").unwrap();
        assert!(output.parent().unwrap().is_dir());

        let report = artifacts.cleanup();

        assert!(report.is_clean());
        assert!(!out_dir.path().join("existing").join("a").exists());
        // Directories that were already there are left alone.
        assert!(out_dir.path().join("existing").is_dir());
    }

    #[test]
    fn test_cleanup_keeps_created_directories_holding_the_output() {
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("a").join("b").join("x.m4b");

        let artifacts = TempArtifacts::for_output(&output).unwrap();
        fs::write(&output, b"m4b").unwrap();

        let report = artifacts.cleanup();

        assert!(report.is_clean());
        assert!(output.exists());
        assert_eq!(fs::read_dir(output.parent().unwrap()).unwrap().count(), 1);
    }
}
