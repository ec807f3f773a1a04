use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod captions;
pub mod normalize;
pub mod video_id;

pub use normalize::{join_text, normalize, ParseError, DEFAULT_SEGMENT_DURATION};
pub use video_id::VideoId;

use crate::extractors::StrategyKind;

/// A segment exactly as a strategy produced it, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    pub text: String,

    /// Start offset in seconds
    pub start: f64,

    /// Length in seconds; several wire formats only carry start times
    #[serde(default)]
    pub duration: Option<f64>,
}

impl RawSegment {
    pub fn new(text: impl Into<String>, start: f64, duration: Option<f64>) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }
}

/// One normalized, timestamped span of transcript text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Non-empty, whitespace-collapsed text
    pub text: String,

    /// Start time in seconds
    pub start_seconds: f64,

    /// Duration in seconds
    pub duration_seconds: f64,
}

impl TranscriptSegment {
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// A resolved transcript along with where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub video_id: VideoId,

    /// Segments in source order
    pub segments: Vec<TranscriptSegment>,

    /// Strategy that produced the segments
    pub source_strategy: StrategyKind,

    pub language_code: Option<String>,

    pub is_auto_generated: bool,

    pub fetched_at: DateTime<Utc>,
}

impl Transcript {
    /// Flat transcript text used for storage and indexing
    pub fn full_text(&self) -> String {
        join_text(&self.segments)
    }

    /// End of the last segment, used as a duration hint when metadata has none
    pub fn duration_hint(&self) -> Option<f64> {
        self.segments
            .iter()
            .map(TranscriptSegment::end_seconds)
            .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))))
    }
}
