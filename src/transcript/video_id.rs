use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::TubescriptError;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Canonical 11-character YouTube video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Accept a bare id or any common YouTube URL shape
    pub fn parse(input: &str) -> Result<Self, TubescriptError> {
        let input = input.trim();

        if ID_PATTERN.is_match(input) {
            return Ok(Self(input.to_string()));
        }

        extract_from_url(input)
            .map(Self)
            .ok_or_else(|| TubescriptError::InvalidIdentifier(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch page URL
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

fn extract_from_url(input: &str) -> Option<String> {
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .or_else(|| host.strip_prefix("music."))
        .unwrap_or(&host)
        .to_string();

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let id = match host.as_str() {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "youtube-nocookie.com" => match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed" | "v" | "shorts" | "live" | "e") => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    }?;

    ID_PATTERN.is_match(&id).then_some(id)
}

impl FromStr for VideoId {
    type Err = TubescriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VideoId {
    type Error = TubescriptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(input: &str) -> Option<String> {
        VideoId::parse(input).ok().map(String::from)
    }

    #[test]
    fn test_parse_watch_url() {
        assert_eq!(id("https://youtube.com/watch?v=dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(id("m.youtube.com/watch?v=kJQP7kiw5Fk").as_deref(), Some("kJQP7kiw5Fk"));
    }

    #[test]
    fn test_parse_short_and_embed_urls() {
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(id("https://youtube.com/shorts/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(id("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn test_parse_bare_id() {
        assert_eq!(id("  dQw4w9WgXcQ ").as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(id("").is_none());
        assert!(id("not a video").is_none());
        assert!(id("dQw4w9WgXc").is_none());
        assert!(id("https://vimeo.com/watch?v=dQw4w9WgXcQ").is_none());
        assert!(id("https://youtube.com/watch?v=short").is_none());
        assert!(id("ftp://youtube.com/watch?v=dQw4w9WgXcQ").is_none());
        assert!(matches!(
            VideoId::parse("nope"),
            Err(TubescriptError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let parsed: VideoId = serde_json::from_str("\"dQw4w9WgXcQ\"").unwrap();
        assert_eq!(parsed.as_str(), "dQw4w9WgXcQ");
        assert!(serde_json::from_str::<VideoId>("\"bad\"").is_err());
    }
}
