//! Cover art resolution.
//!
//! Decides which single image, if any, is embedded in the audiobook:
//! 1. inline image data on the job, decoded and staged
//! 2. a user-supplied image file, copied into the artifact directory
//! 3. the embedded picture of the first track that has one and extracts cleanly
//! 4. nothing, which is a valid outcome

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifacts::TempArtifacts;
use crate::jobs::{CoverArt, Job};
use crate::tool::{file_label, Toolchain};

/// Name (without extension) of the staged cover inside the artifact directory.
const COVER_STEM: &str = "cover";

/// Error type for cover operations.
#[derive(Debug, Error)]
pub enum CoverError {
    /// Inline image data is not valid base64.
    #[error("Inline cover data is not valid base64: {0}")]
    InvalidInline(#[from] base64::DecodeError),

    /// Inline image data decoded to nothing.
    #[error("Inline cover data is empty")]
    EmptyInline,

    /// Extraction ran but ffmpeg reported failure.
    #[error("Cover extraction failed with exit code {code:?}: {detail}")]
    ExtractionFailed { code: Option<i32>, detail: String },

    /// Extraction reported success but left no usable file behind.
    #[error("Cover extraction produced no image at {0}")]
    NoImageProduced(PathBuf),

    /// The destination extension names no image format we can write.
    #[error("Unsupported cover image format (use .png, .jpg or .bmp): {0}")]
    UnsupportedFormat(PathBuf),

    /// Staging or running a tool failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the resolved cover came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    Inline,
    File(PathBuf),
    Extracted(PathBuf),
}

/// A cover image staged for the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCover {
    pub path: PathBuf,
    pub source: CoverSource,
}

/// Image encoder matching the extension of `dest`.
fn image_codec_for(dest: &Path) -> Result<&'static str, CoverError> {
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => Ok("png"),
        Some("jpg") | Some("jpeg") => Ok("mjpeg"),
        Some("bmp") => Ok("bmp"),
        _ => Err(CoverError::UnsupportedFormat(dest.to_path_buf())),
    }
}

/// Extract the first embedded picture of `source` to `dest`.
///
/// The image format follows the extension of `dest`:
/// `ffmpeg -i <source> -an -map 0:v:0 -frames:v 1 -c:v <codec> <dest>`.
pub fn extract_cover(tools: &Toolchain, source: &Path, dest: &Path) -> Result<(), CoverError> {
    let codec = image_codec_for(dest)?;

    let mut cmd = tools.ffmpeg_command();
    cmd.args(["-v", "error"])
        .arg("-i")
        .arg(source)
        .args(["-an", "-map", "0:v:0", "-frames:v", "1", "-c:v", codec, "-f", "image2"])
        .arg(dest);

    let output = tools.run(&mut cmd)?;
    if !output.success() {
        return Err(CoverError::ExtractionFailed {
            code: output.code,
            detail: output.stderr_tail(),
        });
    }

    match std::fs::metadata(dest) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(CoverError::NoImageProduced(dest.to_path_buf())),
    }
}

/// Split an optional `data:<mime>;base64,` prefix off inline cover data.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let data = data.trim();
    if let Some(rest) = data.strip_prefix("data:") {
        if let Some((header, payload)) = rest.split_once(',') {
            let mime = header.split(';').next().filter(|m| !m.is_empty());
            return (mime, payload);
        }
    }
    (None, data)
}

/// File extension for image bytes, from the declared MIME type or magic bytes.
fn image_extension(mime: Option<&str>, bytes: &[u8]) -> &'static str {
    match mime.map(|m| m.to_ascii_lowercase()).as_deref() {
        Some("image/png") => return "png",
        Some("image/jpeg") | Some("image/jpg") => return "jpg",
        Some("image/gif") => return "gif",
        Some("image/bmp") => return "bmp",
        Some("image/webp") => return "webp",
        _ => {}
    }

    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "png"
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        "jpg"
    } else if bytes.starts_with(b"GIF8") {
        "gif"
    } else if bytes.starts_with(b"BM") {
        "bmp"
    } else {
        "png"
    }
}

/// Decode inline cover data into raw image bytes plus a file extension.
pub fn decode_inline_cover(data: &str) -> Result<(Vec<u8>, &'static str), CoverError> {
    let (mime, payload) = split_data_url(data);
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes())?;
    if bytes.is_empty() {
        return Err(CoverError::EmptyInline);
    }
    let ext = image_extension(mime, &bytes);
    Ok((bytes, ext))
}

/// Normalized staged name for a user-supplied image file.
fn staged_file_name(source: &Path) -> String {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "jpg".to_string());
    let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };
    format!("{}.{}", COVER_STEM, ext)
}

/// Resolve the job's cover into a staged file inside `artifacts`.
///
/// Returns `Ok(None)` when no cover is available. Errors are reserved for
/// hard failures with an explicitly supplied cover (undecodable inline data,
/// an I/O error while staging); extraction problems on individual tracks are
/// logged and the next candidate is tried.
pub fn resolve_cover(
    job: &Job,
    artifacts: &mut TempArtifacts,
    tools: &Toolchain,
) -> Result<Option<ResolvedCover>, CoverError> {
    match &job.cover {
        CoverArt::Inline { data } => {
            let (bytes, ext) = decode_inline_cover(data)?;
            let path = artifacts.write(&format!("{}.{}", COVER_STEM, ext), bytes)?;
            info!(job = %job.id, "using inline cover");
            return Ok(Some(ResolvedCover {
                path,
                source: CoverSource::Inline,
            }));
        }
        CoverArt::File { path: source } if source.is_file() => {
            let path = artifacts.copy_in(source, &staged_file_name(source))?;
            info!(job = %job.id, cover = %file_label(source), "using custom cover");
            return Ok(Some(ResolvedCover {
                path,
                source: CoverSource::File(source.clone()),
            }));
        }
        CoverArt::File { path: source } => {
            warn!(
                job = %job.id,
                cover = %source.display(),
                "custom cover not found, looking for embedded art instead"
            );
        }
        CoverArt::None => {}
    }

    let dest = artifacts.reserve(&format!("{}.png", COVER_STEM));
    for track in job.tracks.iter().filter(|t| t.has_embedded_image) {
        match extract_cover(tools, &track.path, &dest) {
            Ok(()) => {
                info!(job = %job.id, track = %track.filename, "cover extracted");
                return Ok(Some(ResolvedCover {
                    path: dest,
                    source: CoverSource::Extracted(track.path.clone()),
                }));
            }
            Err(e) => {
                warn!(job = %job.id, track = %track.filename, error = %e, "cover extraction failed, trying next track");
                let _ = std::fs::remove_file(&dest);
            }
        }
    }

    debug!(job = %job.id, "no cover available");
    Ok(None)
}
