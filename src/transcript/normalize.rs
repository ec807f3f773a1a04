//! Normalization of raw strategy output into canonical segments.
//!
//! Everything here is pure: no IO, no clocks.

use serde_json::Value;

use super::{RawSegment, TranscriptSegment};

/// Duration assigned when a wire format only carries start times
pub const DEFAULT_SEGMENT_DURATION: f64 = 4.0;

/// Raised when a segment list does not have the expected shape
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("malformed segment list: {0}")]
pub struct ParseError(pub String);

/// Normalize raw segments, dropping any whose text collapses to nothing.
///
/// Source order is kept. Out-of-order start times are reported, not fixed.
pub fn normalize(raw: Vec<RawSegment>) -> Vec<TranscriptSegment> {
    let mut previous_start = f64::NEG_INFINITY;
    let mut out_of_order = 0usize;

    let segments: Vec<TranscriptSegment> = raw
        .into_iter()
        .filter_map(|segment| {
            let text = collapse_whitespace(&segment.text);
            if text.is_empty() {
                return None;
            }

            let start_seconds = if segment.start.is_finite() {
                segment.start.max(0.0)
            } else {
                0.0
            };
            let duration_seconds = segment
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .unwrap_or(DEFAULT_SEGMENT_DURATION);

            if start_seconds < previous_start {
                out_of_order += 1;
            }
            previous_start = start_seconds;

            Some(TranscriptSegment {
                text,
                start_seconds,
                duration_seconds,
            })
        })
        .collect();

    if out_of_order > 0 {
        tracing::warn!(
            "{} segment(s) start earlier than their predecessor; keeping source order",
            out_of_order
        );
    }

    segments
}

/// Read a JSON list of `{text, start, duration}` objects
pub fn raw_segments_from_json(value: &Value) -> Result<Vec<RawSegment>, ParseError> {
    let items = value
        .as_array()
        .ok_or_else(|| ParseError(format!("expected a list of segments, found {}", kind_of(value))))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let text = item["text"]
                .as_str()
                .ok_or_else(|| ParseError(format!("segment {} has no text", index)))?;
            let start = number(&item["start"])
                .ok_or_else(|| ParseError(format!("segment {} has no start time", index)))?;
            Ok(RawSegment::new(text, start, number(&item["duration"])))
        })
        .collect()
}

/// Join segment texts with single spaces
pub fn join_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace line breaks and runs of whitespace with single spaces, then trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Some producers send timings as strings ("1.25")
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
