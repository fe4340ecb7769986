//! Scanner module for discovering audio tracks in a source folder.
//!
//! Walks a folder (shallow or recursive), keeps files whose extension is on the
//! audio allow-list and returns them in a deterministic order.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Audio file extensions accepted by the scanner (case-insensitive matching).
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".m4a", ".m4b", ".aac", ".ogg", ".flac", ".wav", ".wma"];

/// Checks if a file has an audio extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            AUDIO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Scans `root` for audio files.
///
/// This function:
/// - Considers only the root's immediate entries unless `recursive` is set
/// - Filters files by audio extension (case-insensitive)
/// - Follows symlinks, so linked tracks are picked up like regular files
/// - Logs and skips entries that cannot be read instead of aborting
/// - Returns absolute, deduplicated paths in ascending lexicographic order
///
/// An empty result means the folder holds no audio files.
pub fn scan_folder(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

    let mut walker = WalkDir::new(&root).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let location = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(path = %location, error = %e, "skipping unreadable entry during scan");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if is_audio_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_audio_extensions_defined() {
        for ext in [".mp3", ".m4a", ".m4b", ".aac", ".ogg", ".flac", ".wav", ".wma"] {
            assert!(AUDIO_EXTENSIONS.contains(&ext), "missing {}", ext);
        }
        assert_eq!(AUDIO_EXTENSIONS.len(), 8);
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("/books/01.mp3")));
        assert!(is_audio_file(Path::new("/books/01.MP3"))); // case-insensitive
        assert!(is_audio_file(Path::new("/books/part.M4b")));
        assert!(is_audio_file(Path::new("/books/track.flac")));
        assert!(!is_audio_file(Path::new("/books/cover.jpg")));
        assert!(!is_audio_file(Path::new("/books/notes.txt")));
        assert!(!is_audio_file(Path::new("/books/book.m4b.partial")));
        assert!(!is_audio_file(Path::new("/books/mp3"))); // no extension
    }

    #[test]
    fn test_shallow_scan_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        File::create(root.join("02 - Two.mp3")).unwrap();
        File::create(root.join("01 - One.mp3")).unwrap();
        File::create(root.join("10 - Ten.MP3")).unwrap();
        File::create(root.join("cover.jpg")).unwrap();
        fs::create_dir(root.join("extras")).unwrap();
        File::create(root.join("extras").join("bonus.mp3")).unwrap();

        let files = scan_folder(root, false);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();

        assert_eq!(names, vec!["01 - One.mp3", "02 - Two.mp3", "10 - Ten.MP3"]);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_recursive_scan_includes_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("cd1")).unwrap();
        fs::create_dir_all(root.join("cd2")).unwrap();
        File::create(root.join("cd2").join("01.ogg")).unwrap();
        File::create(root.join("cd1").join("01.ogg")).unwrap();
        File::create(root.join("intro.wav")).unwrap();

        let files = scan_folder(root, true);

        assert_eq!(
            files,
            vec![
                root.join("cd1").join("01.ogg"),
                root.join("cd2").join("01.ogg"),
                root.join("intro.wav"),
            ]
        );
    }

    #[test]
    fn test_missing_root_yields_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = scan_folder(&temp_dir.path().join("does-not-exist"), true);
        assert!(files.is_empty());
    }

    #[test]
    fn test_empty_folder_yields_empty() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("readme.txt")).unwrap();
        assert!(scan_folder(temp_dir.path(), false).is_empty());
    }

    // A path is accepted exactly when its lowercased extension is on the allow-list.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_audio_extension_filtering(
            basename in "[a-zA-Z0-9_ -]{1,20}",
            ext in prop_oneof![
                Just("mp3"), Just("MP3"), Just("Mp3"),
                Just("m4a"), Just("M4A"),
                Just("m4b"), Just("M4B"),
                Just("aac"), Just("AAC"),
                Just("ogg"), Just("Ogg"),
                Just("flac"), Just("FLAC"),
                Just("wav"), Just("WAV"),
                Just("wma"), Just("WMA"),
                Just("txt"), Just("jpg"), Just("png"), Just("cue"),
                Just("m3u"), Just("nfo"), Just("mp4"), Just("opus"),
            ],
        ) {
            let path = PathBuf::from(format!("/books/{}.{}", basename, ext));
            let expected = matches!(
                ext.to_lowercase().as_str(),
                "mp3" | "m4a" | "m4b" | "aac" | "ogg" | "flac" | "wav" | "wma"
            );

            prop_assert_eq!(
                is_audio_file(&path), expected,
                "Extension '{}' classified incorrectly", ext
            );
        }
    }
}
