//! Chapter timeline planning.
//!
//! One chapter per track, laid end to end in track order. Offsets are integer
//! milliseconds; each chapter's length is its track's duration rounded to the
//! nearest millisecond, so rounding never accumulates across chapters.

use serde::Serialize;

use crate::jobs::Track;

/// A named time range inside the finished audiobook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterEntry {
    /// Zero-based position in the timeline.
    pub index: usize,
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl ChapterEntry {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Rounded length of a track in milliseconds.
pub fn duration_ms(duration_secs: f64) -> u64 {
    if duration_secs.is_finite() && duration_secs > 0.0 {
        (duration_secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Compute the chapter plan for `tracks` in their current order.
///
/// Titles come from [`Track::chapter_title`], with `Chapter N` (1-based) used
/// when a track has nothing usable.
pub fn plan_chapters(tracks: &[Track]) -> Vec<ChapterEntry> {
    let mut cursor = 0u64;

    tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let start_ms = cursor;
            let end_ms = start_ms + duration_ms(track.duration_secs);
            cursor = end_ms;

            let title = match track.chapter_title() {
                t if t.is_empty() => format!("Chapter {}", index + 1),
                t => t,
            };

            ChapterEntry {
                index,
                title,
                start_ms,
                end_ms,
            }
        })
        .collect()
}

/// Total length of a plan in milliseconds.
pub fn total_ms(plan: &[ChapterEntry]) -> u64 {
    plan.last().map(|c| c.end_ms).unwrap_or(0)
}
