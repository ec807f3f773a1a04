use serde_json::{json, Value};

use super::{
    download_player_track, pick_track, HttpClient, PlayerCaptionTrack, RawTranscript, StrategyError,
    PROBE_VIDEO_ID,
};
use crate::config::InnertubeConfig;
use crate::transcript::{RawSegment, VideoId};

/// Talks to the player's internal `youtubei/v1` API the way the web client does.
///
/// The transcript panel (`next` + `get_transcript`) is tried first; when a
/// video has no panel, the caption tracks advertised by `player` are used.
pub struct InnertubeStrategy {
    http: HttpClient,
    base_url: String,
    client_name: String,
    client_version: String,
    api_key: Option<String>,
}

impl InnertubeStrategy {
    pub fn new(http: HttpClient, config: &InnertubeConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_name: config.client_name.clone(),
            client_version: config.client_version.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn fetch(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError> {
        match self.transcript_panel(video_id).await {
            Ok(Some(raw)) if !raw.segments.is_empty() => return Ok(raw),
            Ok(_) => tracing::debug!("No transcript panel for {}; trying caption tracks", video_id),
            Err(e) => tracing::debug!("Transcript panel failed for {}: {}", video_id, e),
        }

        self.caption_tracks(video_id).await
    }

    pub async fn probe(&self) -> Result<String, StrategyError> {
        let player = self.call("player", json!({ "videoId": PROBE_VIDEO_ID })).await?;
        let tracks = player_tracks(&player)?;
        Ok(format!("player reachable, {} caption tracks", tracks.len()))
    }

    async fn transcript_panel(&self, video_id: &VideoId) -> Result<Option<RawTranscript>, StrategyError> {
        let next = self.call("next", json!({ "videoId": video_id.as_str() })).await?;

        let Some(params) = find_key(&next, "getTranscriptEndpoint")
            .and_then(|endpoint| endpoint.get("params"))
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };

        let panel = self.call("get_transcript", json!({ "params": params })).await?;
        let segments = panel_segments(&panel)?;
        Ok(Some(RawTranscript::new(segments)))
    }

    async fn caption_tracks(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError> {
        let player = self.call("player", json!({ "videoId": video_id.as_str() })).await?;

        if let Some(status) = player.pointer("/playabilityStatus/status").and_then(Value::as_str) {
            if status != "OK" {
                let reason = player
                    .pointer("/playabilityStatus/reason")
                    .and_then(Value::as_str)
                    .unwrap_or(status);
                return Err(StrategyError::Unavailable(format!("video not playable: {}", reason)));
            }
        }

        let tracks = player_tracks(&player)?;
        match pick_track(&tracks, |t| t.language_code.as_str()) {
            Some(track) => download_player_track(&self.http, &self.base_url, track, Some("json3")).await,
            None => Ok(RawTranscript::new(Vec::new())),
        }
    }

    /// POST one `youtubei/v1` endpoint with the client context merged into `body`
    async fn call(&self, endpoint: &str, mut body: Value) -> Result<Value, StrategyError> {
        body["context"] = json!({
            "client": {
                "clientName": self.client_name,
                "clientVersion": self.client_version,
                "hl": "en",
                "gl": "US",
            }
        });

        let mut request = self
            .http
            .post(format!("{}/youtubei/v1/{}", self.base_url, endpoint))
            .query(&[("prettyPrint", "false")])
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let body = self.http.text(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Depth-first search for the first object member called `key`
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

fn panel_segments(panel: &Value) -> Result<Vec<RawSegment>, StrategyError> {
    let initial = find_key(panel, "initialSegments")
        .and_then(Value::as_array)
        .ok_or_else(|| StrategyError::Parse("transcript panel has no initialSegments".to_string()))?;

    let segments = initial
        .iter()
        .filter_map(|item| item.get("transcriptSegmentRenderer"))
        .filter_map(|renderer| {
            let start_ms = millis(renderer.get("startMs")?)?;
            let end_ms = renderer.get("endMs").and_then(millis);
            let text = renderer.get("snippet").map(snippet_text).unwrap_or_default();
            let duration = end_ms.map(|end| (end - start_ms) / 1000.0);
            Some(RawSegment::new(text, start_ms / 1000.0, duration))
        })
        .collect();

    Ok(segments)
}

/// `{"runs":[{"text":..}]}` or `{"simpleText":..}`
fn snippet_text(snippet: &Value) -> String {
    if let Some(text) = snippet.get("simpleText").and_then(Value::as_str) {
        return text.to_string();
    }

    snippet
        .get("runs")
        .and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|run| run.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// The API sends millisecond offsets as strings
fn millis(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn player_tracks(player: &Value) -> Result<Vec<PlayerCaptionTrack>, StrategyError> {
    match player.pointer("/captions/playerCaptionsTracklistRenderer/captionTracks") {
        Some(tracks) => Ok(serde_json::from_value(tracks.clone())?),
        None => Ok(Vec::new()),
    }
}
