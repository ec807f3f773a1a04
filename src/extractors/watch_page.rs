use super::{download_player_track, pick_track, HttpClient, PlayerCaptionTrack, RawTranscript, StrategyError, PROBE_VIDEO_ID};
use crate::config::WatchPageConfig;
use crate::transcript::VideoId;

const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";

/// Scrapes the public watch page for the caption tracks the player would load
pub struct WatchPageStrategy {
    http: HttpClient,
    base_url: String,
}

impl WatchPageStrategy {
    pub fn new(http: HttpClient, config: &WatchPageConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError> {
        let html = self.watch_page(video_id.as_str()).await?;

        let Some(tracks) = caption_tracks(&html)? else {
            if html.contains("\"playabilityStatus\":{\"status\":\"ERROR\"") {
                return Err(StrategyError::Unavailable("video unavailable".to_string()));
            }
            tracing::debug!("Watch page for {} lists no caption tracks", video_id);
            return Ok(RawTranscript::new(Vec::new()));
        };

        match pick_track(&tracks, |t| t.language_code.as_str()) {
            Some(track) => download_player_track(&self.http, &self.base_url, track, None).await,
            None => Ok(RawTranscript::new(Vec::new())),
        }
    }

    pub async fn probe(&self) -> Result<String, StrategyError> {
        let html = self.watch_page(PROBE_VIDEO_ID).await?;
        let count = caption_tracks(&html)?.map(|t| t.len()).unwrap_or(0);
        Ok(format!("watch page reachable, {} caption tracks", count))
    }

    async fn watch_page(&self, video_id: &str) -> Result<String, StrategyError> {
        let request = self
            .http
            .get(format!("{}/watch", self.base_url))
            .query(&[("v", video_id), ("hl", "en")]);

        let html = self.http.text(request).await?;
        if html.contains("class=\"g-recaptcha\"") || html.contains("www.google.com/recaptcha") {
            return Err(StrategyError::Unavailable("rate limited".to_string()));
        }
        Ok(html)
    }
}

/// Pull the `"captionTracks":[...]` array out of the inline player response.
///
/// `Ok(None)` when the page carries no caption tracks at all.
fn caption_tracks(html: &str) -> Result<Option<Vec<PlayerCaptionTrack>>, StrategyError> {
    let Some(pos) = html.find(CAPTION_TRACKS_KEY) else {
        return Ok(None);
    };

    let rest = &html[pos + CAPTION_TRACKS_KEY.len()..];
    let array = balanced_array(rest)
        .ok_or_else(|| StrategyError::Parse("unterminated captionTracks array".to_string()))?;

    Ok(Some(serde_json::from_str(array)?))
}

/// The JSON array at the start of `input`, matched by bracket depth
fn balanced_array(input: &str) -> Option<&str> {
    if !input.starts_with('[') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&input[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
