//! Track prober.
//!
//! Runs ffprobe on a single file and reduces its JSON output to what the
//! pipeline needs: duration, whether an embedded picture is present, and the
//! format-level tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::tool::Toolchain;

/// Codec names ffprobe reports for embedded cover art.
const IMAGE_CODECS: &[&str] = &["mjpeg", "png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command failed to execute.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the pipeline knows about one audio file after probing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackProbe {
    /// Duration in seconds, 0 when unknown.
    pub duration_secs: f64,
    /// True if any stream is a video stream or uses an image codec.
    pub has_embedded_image: bool,
    /// Format-level tags, verbatim.
    pub tags: BTreeMap<String, String>,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub tags: Option<BTreeMap<String, serde_json::Value>>,
    }
}

/// Probes a file, degrading to an empty record on any failure.
///
/// A broken or unreadable track still takes its place in the job: it simply
/// contributes zero length and no tags. The failure is logged.
pub fn probe_track(tools: &Toolchain, path: &Path) -> TrackProbe {
    match try_probe_track(tools, path) {
        Ok(probe) => probe,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "probe failed, using empty track record");
            TrackProbe::default()
        }
    }
}

/// Probes a file with ffprobe, surfacing failures to the caller.
///
/// Runs `ffprobe -v quiet -print_format json -show_format -show_streams <path>`.
pub fn try_probe_track(tools: &Toolchain, path: &Path) -> Result<TrackProbe, ProbeError> {
    let mut cmd = tools.ffprobe_command();
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path);

    let output = tools.run(&mut cmd)?;

    if !output.success() {
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {:?}: {}",
            output.code,
            output.stderr_tail()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Parses ffprobe JSON output into a TrackProbe.
pub fn parse_ffprobe_output(json_str: &str) -> Result<TrackProbe, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let has_embedded_image = ffprobe.streams.unwrap_or_default().iter().any(|stream| {
        let is_video = stream.codec_type.as_deref() == Some("video");
        let is_image = stream
            .codec_name
            .as_deref()
            .map(|c| IMAGE_CODECS.contains(&c.to_lowercase().as_str()))
            .unwrap_or(false);
        is_video || is_image
    });

    let (duration_secs, tags) = match ffprobe.format {
        Some(format) => {
            let duration = format
                .duration
                .as_deref()
                .and_then(|d| d.trim().parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(0.0);

            // ffprobe emits strings, but be lenient about numbers sneaking in.
            let tags = format
                .tags
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(key, value)| match value {
                    serde_json::Value::String(s) => Some((key, s)),
                    serde_json::Value::Number(n) => Some((key, n.to_string())),
                    _ => None,
                })
                .collect();
            (duration, tags)
        }
        None => (0.0, BTreeMap::new()),
    };

    Ok(TrackProbe {
        duration_secs,
        has_embedded_image,
        tags,
    })
}

/// Case-insensitive tag lookup; containers disagree on `title` vs `TITLE`.
pub fn tag<'a>(tags: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(key)
        .or_else(|| {
            tags.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::{failed, ok, toolchain, FakeRunner};

    const MP3_WITH_COVER: &str = r#"{
        "streams": [
            { "index": 0, "codec_name": "mp3", "codec_type": "audio" },
            { "index": 1, "codec_name": "mjpeg", "codec_type": "video" }
        ],
        "format": {
            "filename": "01.mp3",
            "duration": "600.000000",
            "tags": { "title": "Prologue", "artist": "Jane Doe", "album": "The Book", "date": "2011-05-03T00:00:00" }
        }
    }"#;

    #[test]
    fn test_parse_full_output() {
        let probe = parse_ffprobe_output(MP3_WITH_COVER).unwrap();

        assert!((probe.duration_secs - 600.0).abs() < f64::EPSILON);
        assert!(probe.has_embedded_image);
        assert_eq!(probe.tags.get("title").map(String::as_str), Some("Prologue"));
        assert_eq!(probe.tags.len(), 4);
    }

    #[test]
    fn test_parse_audio_only() {
        let json = r#"{
            "streams": [{ "codec_name": "flac", "codec_type": "audio" }],
            "format": { "duration": "725.5" }
        }"#;
        let probe = parse_ffprobe_output(json).unwrap();

        assert!((probe.duration_secs - 725.5).abs() < f64::EPSILON);
        assert!(!probe.has_embedded_image);
        assert!(probe.tags.is_empty());
    }

    #[test]
    fn test_image_codec_without_video_type_counts_as_cover() {
        let json = r#"{
            "streams": [
                { "codec_name": "vorbis", "codec_type": "audio" },
                { "codec_name": "png", "codec_type": "attachment" }
            ],
            "format": {}
        }"#;
        assert!(parse_ffprobe_output(json).unwrap().has_embedded_image);
    }

    #[test]
    fn test_unparseable_duration_is_zero() {
        let json = r#"{ "format": { "duration": "N/A" } }"#;
        let probe = parse_ffprobe_output(json).unwrap();
        assert_eq!(probe.duration_secs, 0.0);

        let json = r#"{ "format": { "duration": "-3.0" } }"#;
        assert_eq!(parse_ffprobe_output(json).unwrap().duration_secs, 0.0);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = parse_ffprobe_output("not json").unwrap_err();
        assert!(matches!(err, ProbeError::ParseError(_)));
    }

    #[test]
    fn test_tag_lookup_case_insensitive() {
        let mut tags = BTreeMap::new();
        tags.insert("TITLE".to_string(), "Chapter One".to_string());
        tags.insert("artist".to_string(), "  ".to_string());

        assert_eq!(tag(&tags, "title"), Some("Chapter One"));
        assert_eq!(tag(&tags, "artist"), None); // blank counts as absent
        assert_eq!(tag(&tags, "album"), None);
    }

    #[test]
    fn test_probe_track_runs_ffprobe_with_path() {
        let runner = FakeRunner::new(|_, _| ok(MP3_WITH_COVER));
        let tools = toolchain(runner.clone());

        let probe = probe_track(&tools, Path::new("/books/it's here/01.mp3"));

        assert!(probe.has_embedded_image);
        let calls = runner.calls_to("ffprobe");
        assert_eq!(calls.len(), 1);
        // The path travels as one untouched argument.
        assert_eq!(calls[0].last().unwrap(), "/books/it's here/01.mp3");
        assert!(calls[0].contains(&"-show_streams".to_string()));
    }

    #[test]
    fn test_probe_failure_degrades_to_empty_record() {
        let runner = FakeRunner::new(|_, _| failed(1, "Invalid data found when processing input"));
        let tools = toolchain(runner);

        let probe = probe_track(&tools, Path::new("/books/broken.mp3"));
        assert_eq!(probe, TrackProbe::default());

        let err = try_probe_track(&tools, Path::new("/books/broken.mp3")).unwrap_err();
        assert!(err.to_string().contains("Invalid data"));
    }

    #[test]
    fn test_garbage_stdout_degrades_to_empty_record() {
        let runner = FakeRunner::new(|_, _| ok("{ truncated"));
        let tools = toolchain(runner);

        assert_eq!(probe_track(&tools, Path::new("/x.mp3")), TrackProbe::default());
    }
}
