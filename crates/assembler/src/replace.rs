//! Moving a finished staging file into place at the job's output path.
//!
//! ffmpeg writes into the artifact directory; only a run that succeeded gets
//! its result moved to the declared output. An existing file at that path is
//! set aside first and put back if the move fails, so a failed job never
//! leaves a partial or missing output behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while committing an output.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Failed to set the existing output aside.
    #[error("Failed to back up existing output: {0}")]
    BackupFailed(std::io::Error),

    /// Failed to move the staged file into place.
    #[error("Failed to move staged output into place: {0}")]
    MoveFailed(std::io::Error),
}

/// Backup path for an existing output: `<name>.orig.<timestamp>`.
pub fn backup_path(original: &Path) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut backup = original.as_os_str().to_owned();
    backup.push(format!(".orig.{}", timestamp));
    PathBuf::from(backup)
}

/// Rename, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    if let Err(e) = fs::remove_file(from) {
        debug!(path = %from.display(), error = %e, "could not remove source after copy");
    }
    Ok(())
}

/// Move `staged` to `final_path`, replacing whatever is there.
///
/// On failure the previous file at `final_path` (if any) is restored and
/// `staged` is left where it was.
pub fn commit_output(staged: &Path, final_path: &Path) -> Result<(), CommitError> {
    let backup = if final_path.exists() {
        let backup = backup_path(final_path);
        move_file(final_path, &backup).map_err(CommitError::BackupFailed)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = move_file(staged, final_path) {
        // A failed copy can leave a truncated file behind.
        let _ = fs::remove_file(final_path);
        if let Some(backup) = &backup {
            if let Err(restore) = move_file(backup, final_path) {
                warn!(
                    backup = %backup.display(),
                    error = %restore,
                    "could not restore previous output"
                );
            }
        }
        return Err(CommitError::MoveFailed(e));
    }

    if let Some(backup) = backup {
        if let Err(e) = fs::remove_file(&backup) {
            warn!(backup = %backup.display(), error = %e, "failed to delete backup of previous output");
        }
    }

    Ok(())
}
