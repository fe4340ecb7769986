//! Manifests consumed by ffmpeg.
//!
//! - the concat list, one `file '<path>'` directive per track
//! - the `;FFMETADATA1` file carrying global tags and the chapter timeline

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chapters::ChapterEntry;
use crate::jobs::{BookMetadata, Track};

/// Header line of an ffmpeg metadata file.
pub const FFMETADATA_HEADER: &str = ";FFMETADATA1";

/// Chapter offsets are written in milliseconds.
pub const CHAPTER_TIMEBASE: &str = "1/1000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    /// The concat demuxer reads line by line, so a line break inside a path
    /// cannot be expressed.
    #[error("path cannot be listed in a concat manifest (contains a line break): {0}")]
    UnrepresentablePath(PathBuf),
}

/// Quote a path for a concat `file` directive.
///
/// Relative paths are made absolute against the working directory, since the
/// concat demuxer resolves them against the list file's own directory.
/// Backslashes become forward slashes, and each single quote closes the
/// quoted string, emits an escaped quote and reopens it (`'\''`).
pub fn escape_concat_path(path: &Path) -> Result<String, ManifestError> {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let raw = absolute.to_string_lossy();
    if raw.contains('\n') || raw.contains('\r') {
        return Err(ManifestError::UnrepresentablePath(path.to_path_buf()));
    }

    let normalized = raw.replace('\\', "/");
    Ok(format!("'{}'", normalized.replace('\'', r"'\''")))
}

/// Build the concat list: exactly one line per track, in track order.
pub fn build_concat_manifest(tracks: &[Track]) -> Result<String, ManifestError> {
    let mut out = String::new();
    for track in tracks {
        let quoted = escape_concat_path(&track.path)?;
        let _ = writeln!(out, "file {}", quoted);
    }
    Ok(out)
}

/// Escape a value for an FFMETADATA `key=value` line.
///
/// `=`, `;`, `#`, `\` and line breaks are special in that format and get a
/// backslash in front.
pub fn escape_metadata_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' | '\n' => {
                out.push('\\');
                out.push(c);
            }
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Reduce a date to its leading year digits ("2011-05-03T00:00:00" -> "2011").
///
/// Values that do not start with a digit are passed through trimmed.
pub fn normalize_year(value: &str) -> String {
    let value = value.trim();
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        value.to_string()
    } else {
        digits
    }
}

/// Build the metadata manifest.
///
/// Global tags are written in a fixed order (title, artist, album, date,
/// genre) and only when non-empty, followed by one `[CHAPTER]` block per entry.
pub fn build_metadata_manifest(metadata: &BookMetadata, chapters: &[ChapterEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", FFMETADATA_HEADER);

    let year = metadata.year.as_deref().map(normalize_year);
    let fields = [
        ("title", metadata.title.as_deref()),
        ("artist", metadata.author.as_deref()),
        ("album", metadata.album.as_deref()),
        ("date", year.as_deref()),
        ("genre", metadata.genre.as_deref()),
    ];

    for (key, value) in fields {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            let _ = writeln!(out, "{}={}", key, escape_metadata_value(value));
        }
    }

    for chapter in chapters {
        out.push('\n');
        let _ = writeln!(out, "[CHAPTER]");
        let _ = writeln!(out, "TIMEBASE={}", CHAPTER_TIMEBASE);
        let _ = writeln!(out, "START={}", chapter.start_ms);
        let _ = writeln!(out, "END={}", chapter.end_ms);
        let _ = writeln!(out, "title={}", escape_metadata_value(&chapter.title));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::plan_chapters;

    fn tracks(paths: &[&str]) -> Vec<Track> {
        paths.iter().map(|p| Track::new(*p).with_duration(1.0)).collect()
    }

    #[test]
    fn test_concat_manifest_one_line_per_track_in_order() {
        let tracks = tracks(&["/books/b/02.mp3", "/books/b/01.mp3", "/books/b/03.mp3"]);
        let manifest = build_concat_manifest(&tracks).unwrap();

        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/books/b/02.mp3'",
                "file '/books/b/01.mp3'",
                "file '/books/b/03.mp3'",
            ]
        );
    }

    #[test]
    fn test_concat_escapes_quotes_and_backslashes() {
        let quoted = escape_concat_path(Path::new(r"/books/Tom's Diner\01.mp3")).unwrap();
        assert_eq!(quoted, r"'/books/Tom'\''s Diner/01.mp3'");
    }

    #[test]
    fn test_concat_relative_paths_are_made_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let manifest = build_concat_manifest(&tracks(&["books/b/01.mp3"])).unwrap();

        let expected = format!("file '{}'\n", cwd.join("books/b/01.mp3").display());
        assert_eq!(manifest, expected);
        assert!(manifest.starts_with("file '/"));
    }

    #[test]
    fn test_concat_rejects_line_breaks() {
        let tracks = tracks(&["/books/ok.mp3", "/books/bad\nname.mp3"]);
        let err = build_concat_manifest(&tracks).unwrap_err();
        assert_eq!(
            err,
            ManifestError::UnrepresentablePath(PathBuf::from("/books/bad\nname.mp3"))
        );
    }

    #[test]
    fn test_concat_empty() {
        assert_eq!(build_concat_manifest(&[]).unwrap(), "");
    }

    #[test]
    fn test_metadata_manifest_full() {
        let metadata = BookMetadata {
            title: Some("The Book".to_string()),
            author: Some("Jane Doe".to_string()),
            album: Some("Series".to_string()),
            year: Some("2011-05-03T00:00:00".to_string()),
            genre: Some("Fiction".to_string()),
        };
        let mut tracks = tracks(&["/b/01.mp3", "/b/02.mp3"]);
        tracks[0].custom_name = Some("Opening".to_string());
        tracks[1].duration_secs = 2.5;

        let manifest = build_metadata_manifest(&metadata, &plan_chapters(&tracks));

        let expected = "\
;FFMETADATA1
title=The Book
artist=Jane Doe
album=Series
date=2011
genre=Fiction

[CHAPTER]
TIMEBASE=1/1000
START=0
END=1000
title=Opening

[CHAPTER]
TIMEBASE=1/1000
START=1000
END=3500
title=02.mp3
";
        assert_eq!(manifest, expected);
    }

    #[test]
    fn test_metadata_manifest_skips_empty_fields() {
        let metadata = BookMetadata {
            title: Some("Only Title".to_string()),
            author: Some("   ".to_string()),
            album: None,
            year: Some(String::new()),
            genre: None,
        };

        let manifest = build_metadata_manifest(&metadata, &[]);

        assert_eq!(manifest, ";FFMETADATA1\ntitle=Only Title\n");
        assert!(!manifest.contains("artist="));
        assert!(!manifest.contains("date="));
    }

    #[test]
    fn test_metadata_values_are_escaped() {
        assert_eq!(escape_metadata_value("a=b; c#d\\e"), r"a\=b\; c\#d\\e");
        assert_eq!(escape_metadata_value("two\nlines"), "two\\\nlines");

        let metadata = BookMetadata {
            title: Some("Part 1\n[CHAPTER]".to_string()),
            ..Default::default()
        };
        let manifest = build_metadata_manifest(&metadata, &[]);
        // The injected section marker stays on an escaped continuation line.
        assert!(manifest.contains("title=Part 1\\\n[CHAPTER]"));
    }

    #[test]
    fn test_normalize_year() {
        assert_eq!(normalize_year("2011"), "2011");
        assert_eq!(normalize_year("2011-05-03"), "2011");
        assert_eq!(normalize_year(" 1999-12-31T23:59:59Z "), "1999");
        assert_eq!(normalize_year("circa 1900"), "circa 1900");
    }
}
