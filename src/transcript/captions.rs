//! Caption body parser shared by the API, embedded-client and watch-page
//! strategies.
//!
//! Bodies come back either as a JSON event stream (`fmt=json3`) or as one of
//! the XML timed-text dialects:
//!
//! - `<text start="1.2" dur="3.4">` with times in seconds (srv1, the default)
//! - `<p t="1200" d="3400">` with times in milliseconds (srv3)
//! - `<p begin="00:00:01.200" end="00:00:04.600">` with clock values (TTML)
//!
//! Callers never declare the format; it is sniffed from the body.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;

use super::normalize::ParseError;
use super::RawSegment;

static TEXT_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<text\b([^>]*?)(?:/>|>(.*?)</text>)").unwrap());
static P_ELEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<p\b([^>]*?)(?:/>|>(.*?)</p>)").unwrap());
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([\w:-]+)\s*=\s*"([^"]*)""#).unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(amp|lt|gt|quot|apos|#[0-9]+|#[xX][0-9a-fA-F]+);").unwrap());
static DOCUMENT_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(transcript|timedtext|tt)\b").unwrap());

#[derive(Debug, Deserialize)]
struct EventStream {
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(default)]
    t_start_ms: Option<f64>,
    #[serde(default)]
    d_duration_ms: Option<f64>,
    #[serde(default)]
    segs: Option<Vec<EventSeg>>,
}

#[derive(Debug, Deserialize)]
struct EventSeg {
    #[serde(default)]
    utf8: String,
}

/// Parse a caption body of unknown format into raw segments.
///
/// A recognized document without any cues yields an empty list; a body that
/// matches no known format is a `ParseError`.
pub fn parse_caption_body(body: &str) -> Result<Vec<RawSegment>, ParseError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();

    if trimmed.starts_with('{') {
        return parse_json_events(trimmed);
    }

    if trimmed.starts_with('<') {
        let cues = parse_text_elements(trimmed);
        if !cues.is_empty() {
            return Ok(cues);
        }
        // Only paragraphs carrying timing attributes count, so HTML error pages don't
        let cues = parse_p_elements(trimmed);
        if !cues.is_empty() {
            return Ok(cues);
        }
        if DOCUMENT_ROOT.is_match(trimmed) {
            return Ok(Vec::new());
        }
    }

    let preview: String = trimmed.chars().take(60).collect();
    Err(ParseError(format!("unrecognized caption body: {:?}", preview)))
}

/// JSON3 event stream; events without `segs` are window/styling events
pub fn parse_json_events(body: &str) -> Result<Vec<RawSegment>, ParseError> {
    let stream: EventStream = serde_json::from_str(body)
        .map_err(|e| ParseError(format!("invalid caption event stream: {}", e)))?;

    Ok(stream
        .events
        .into_iter()
        .filter_map(|event| {
            let segs = event.segs?;
            let text: String = segs.into_iter().map(|s| s.utf8).collect();
            Some(RawSegment::new(
                text,
                event.t_start_ms.unwrap_or(0.0) / 1000.0,
                event.d_duration_ms.map(|d| d / 1000.0),
            ))
        })
        .collect())
}

fn parse_text_elements(body: &str) -> Vec<RawSegment> {
    TEXT_ELEMENT
        .captures_iter(body)
        .filter_map(|caps| {
            let attrs = attributes(caps.get(1).map_or("", |m| m.as_str()));
            let start = attrs.get("start")?.parse::<f64>().ok()?;
            let duration = attrs.get("dur").and_then(|d| d.parse::<f64>().ok());
            let text = element_text(caps.get(2).map_or("", |m| m.as_str()));
            Some(RawSegment::new(text, start, duration))
        })
        .collect()
}

fn parse_p_elements(body: &str) -> Vec<RawSegment> {
    P_ELEMENT
        .captures_iter(body)
        .filter_map(|caps| {
            let attrs = attributes(caps.get(1).map_or("", |m| m.as_str()));
            let (start, duration) = if let Some(t) = attrs.get("t") {
                let start = t.parse::<f64>().ok()? / 1000.0;
                let duration = attrs
                    .get("d")
                    .and_then(|d| d.parse::<f64>().ok())
                    .map(|d| d / 1000.0);
                (start, duration)
            } else {
                let start = parse_clock(attrs.get("begin")?)?;
                let duration = match (attrs.get("dur"), attrs.get("end")) {
                    (Some(dur), _) => parse_clock(dur),
                    (None, Some(end)) => parse_clock(end).map(|end| end - start),
                    (None, None) => None,
                };
                (start, duration)
            };
            let text = element_text(caps.get(2).map_or("", |m| m.as_str()));
            Some(RawSegment::new(text, start, duration))
        })
        .collect()
}

fn attributes(raw: &str) -> HashMap<&str, &str> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| {
            let (_, [name, value]) = caps.extract();
            (name, value)
        })
        .collect()
}

fn element_text(inner: &str) -> String {
    let inner = LINE_BREAK.replace_all(inner, " ");
    let inner = TAG.replace_all(&inner, "");
    unescape_entities(&inner)
}

/// Single-pass XML entity decoding, so `&amp;lt;` becomes `&lt;` and not `<`
pub fn unescape_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity[1..].parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// TTML time expressions: `HH:MM:SS(.fff)`, `MM:SS(.fff)`, `12.5s`, `1200ms`
fn parse_clock(value: &str) -> Option<f64> {
    let value = value.trim();

    if let Some(ms) = value.strip_suffix("ms") {
        return ms.parse::<f64>().ok().map(|v| v / 1000.0);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.parse::<f64>().ok();
    }

    let parts: Vec<&str> = value.split(':').collect();
    let numbers: Option<Vec<f64>> = parts.iter().map(|p| p.parse::<f64>().ok()).collect();
    match numbers?.as_slice() {
        [h, m, s] => Some(h * 3600.0 + m * 60.0 + s),
        [m, s] => Some(m * 60.0 + s),
        [s] => Some(*s),
        _ => None,
    }
}
