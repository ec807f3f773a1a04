use reqwest::RequestBuilder;
use serde::Deserialize;
use std::sync::Arc;

use super::credentials::AccessTokenProvider;
use super::{pick_track, HttpClient, RawTranscript, StrategyError, PROBE_VIDEO_ID};
use crate::config::DataApiConfig;
use crate::transcript::captions::parse_caption_body;
use crate::transcript::VideoId;

/// How requests to the Data API are authorized
pub enum ApiAuth {
    /// Caller-held OAuth2 credential
    Bearer(Arc<dyn AccessTokenProvider>),
    /// Non-expiring API key; `None` means none was configured
    Key(Option<String>),
}

enum Credential {
    Bearer(String),
    Key(String),
}

/// Two-step list + download against the YouTube Data API v3 captions resource
pub struct DataApiStrategy {
    http: HttpClient,
    base_url: String,
    timedtext_url: String,
    auth: ApiAuth,
}

#[derive(Debug, Deserialize)]
struct CaptionList {
    #[serde(default)]
    items: Vec<CaptionTrack>,
}

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    id: String,
    snippet: CaptionSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionSnippet {
    language: String,
    #[serde(default)]
    track_kind: Option<String>,
}

impl DataApiStrategy {
    pub fn oauth(http: HttpClient, config: &DataApiConfig, credentials: Arc<dyn AccessTokenProvider>) -> Self {
        Self::new(http, config, ApiAuth::Bearer(credentials))
    }

    pub fn api_key(http: HttpClient, config: &DataApiConfig) -> Self {
        Self::new(http, config, ApiAuth::Key(config.api_key.clone()))
    }

    pub fn new(http: HttpClient, config: &DataApiConfig, auth: ApiAuth) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timedtext_url: config.timedtext_url.clone(),
            auth,
        }
    }

    pub async fn fetch(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError> {
        let credential = self.credential()?;

        let tracks = self.list_tracks(video_id, &credential).await?;
        let Some(track) = pick_track(&tracks, |t| t.snippet.language.as_str()) else {
            tracing::debug!("No caption tracks listed for {}", video_id);
            return Ok(RawTranscript::new(Vec::new()));
        };

        tracing::debug!(
            "Selected caption track {} ({}, {})",
            track.id,
            track.snippet.language,
            track.snippet.track_kind.as_deref().unwrap_or("standard")
        );

        let segments = match self.download(&track.id, &credential).await {
            Ok(body) => parse_caption_body(&body)?,
            Err(StrategyError::PermissionDenied(reason)) if matches!(credential, Credential::Bearer(_)) => {
                tracing::info!("Caption download refused ({}); trying public timed text", reason);
                match self.fetch_timedtext(video_id, &track.snippet.language).await {
                    Ok(segments) if !segments.is_empty() => segments,
                    Ok(_) => return Err(StrategyError::PermissionDenied(reason)),
                    Err(e) => {
                        tracing::debug!("Timed text fallback failed: {}", e);
                        return Err(StrategyError::PermissionDenied(reason));
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let is_auto_generated = track
            .snippet
            .track_kind
            .as_deref()
            .map(|kind| kind.eq_ignore_ascii_case("asr"));

        Ok(RawTranscript::new(segments).with_language(Some(track.snippet.language.clone()), is_auto_generated))
    }

    pub async fn probe(&self) -> Result<String, StrategyError> {
        let credential = self.credential()?;

        match credential {
            Credential::Bearer(_) => {
                let video_id = VideoId::parse(PROBE_VIDEO_ID)
                    .map_err(|e| StrategyError::Unavailable(e.to_string()))?;
                let tracks = self.list_tracks(&video_id, &credential).await?;
                Ok(format!("listed {} caption tracks", tracks.len()))
            }
            Credential::Key(_) => {
                let request = self
                    .http
                    .get(format!("{}/videos", self.base_url))
                    .query(&[("part", "snippet"), ("id", PROBE_VIDEO_ID)]);
                self.http.send(authorize(request, &credential)).await?;
                Ok("API reachable".to_string())
            }
        }
    }

    fn credential(&self) -> Result<Credential, StrategyError> {
        match &self.auth {
            ApiAuth::Bearer(provider) => provider
                .access_token()
                .map(Credential::Bearer)
                .ok_or_else(|| StrategyError::AuthRequired("no OAuth2 access token available".to_string())),
            ApiAuth::Key(key) => key
                .clone()
                .filter(|k| !k.is_empty())
                .map(Credential::Key)
                .ok_or_else(|| StrategyError::AuthRequired("no Data API key configured".to_string())),
        }
    }

    async fn list_tracks(&self, video_id: &VideoId, credential: &Credential) -> Result<Vec<CaptionTrack>, StrategyError> {
        let request = self
            .http
            .get(format!("{}/captions", self.base_url))
            .query(&[("part", "snippet"), ("videoId", video_id.as_str())]);

        let body = self.http.text(authorize(request, credential)).await?;
        let list: CaptionList = serde_json::from_str(&body)?;
        Ok(list.items)
    }

    async fn download(&self, track_id: &str, credential: &Credential) -> Result<String, StrategyError> {
        let request = self
            .http
            .get(format!("{}/captions/{}", self.base_url, urlencoding::encode(track_id)))
            .query(&[("tfmt", "ttml")])
            .header(reqwest::header::ACCEPT, "application/xml, text/xml");

        self.http.text(authorize(request, credential)).await
    }

    async fn fetch_timedtext(&self, video_id: &VideoId, language: &str) -> Result<Vec<crate::transcript::RawSegment>, StrategyError> {
        let request = self
            .http
            .get(&self.timedtext_url)
            .query(&[("lang", language), ("v", video_id.as_str()), ("fmt", "srv3")]);

        let body = self.http.text(request).await?;
        Ok(parse_caption_body(&body)?)
    }
}

fn authorize(request: RequestBuilder, credential: &Credential) -> RequestBuilder {
    match credential {
        Credential::Bearer(token) => request.bearer_auth(token),
        Credential::Key(key) => request.query(&[("key", key.as_str())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::credentials::StaticToken;
    use crate::extractors::test_support::{client, serve, Route};
    use crate::transcript::RawSegment;

    const TRACKS: &str = r#"{"items":[
        {"id":"de-track","snippet":{"language":"de","trackKind":"standard"}},
        {"id":"en-track","snippet":{"language":"en","trackKind":"asr"}}
    ]}"#;

    const TTML: &str = r#"<transcript><text start="0" dur="1.5">rock &amp; roll</text></transcript>"#;

    fn config(base: &str) -> DataApiConfig {
        DataApiConfig {
            base_url: base.to_string(),
            timedtext_url: format!("{}/api/timedtext", base),
            api_key: Some("key-123".to_string()),
            oauth_token_file: None,
        }
    }

    fn video() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    #[tokio::test]
    async fn test_missing_api_key_requires_auth() {
        let mut config = config("http://127.0.0.1:9");
        config.api_key = None;
        let strategy = DataApiStrategy::api_key(client(), &config);

        assert!(matches!(strategy.fetch(&video()).await, Err(StrategyError::AuthRequired(_))));
    }

    #[tokio::test]
    async fn test_lists_then_downloads_english_track() {
        let base = serve(vec![
            Route::get("/captions?", 200, TRACKS),
            Route::get("/captions/en-track", 200, TTML),
        ])
        .await;
        let strategy = DataApiStrategy::api_key(client(), &config(&base));

        let raw = strategy.fetch(&video()).await.unwrap();
        assert_eq!(raw.segments, vec![RawSegment::new("rock & roll", 0.0, Some(1.5))]);
        assert_eq!(raw.language_code.as_deref(), Some("en"));
        assert_eq!(raw.is_auto_generated, Some(true));
    }

    #[tokio::test]
    async fn test_download_forbidden_for_api_key() {
        let base = serve(vec![
            Route::get("/captions?", 200, TRACKS),
            Route::get("/captions/en-track", 403, "forbidden"),
        ])
        .await;
        let strategy = DataApiStrategy::api_key(client(), &config(&base));

        assert!(matches!(strategy.fetch(&video()).await, Err(StrategyError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_oauth_falls_back_to_timedtext_when_forbidden() {
        let base = serve(vec![
            Route::get("/captions?", 200, TRACKS),
            Route::get("/captions/en-track", 403, "forbidden"),
            Route::get("/api/timedtext", 200, r#"<timedtext><body><p t="500" d="1000">public</p></body></timedtext>"#),
        ])
        .await;
        let strategy = DataApiStrategy::oauth(client(), &config(&base), Arc::new(StaticToken::new("token")));

        let raw = strategy.fetch(&video()).await.unwrap();
        assert_eq!(raw.segments, vec![RawSegment::new("public", 0.5, Some(1.0))]);
    }

    #[tokio::test]
    async fn test_oauth_unauthorized_listing() {
        let base = serve(vec![Route::get("/captions?", 401, "{}")]).await;
        let strategy = DataApiStrategy::oauth(client(), &config(&base), Arc::new(StaticToken::new("stale")));

        assert!(matches!(strategy.fetch(&video()).await, Err(StrategyError::AuthRequired(_))));
    }

    #[tokio::test]
    async fn test_no_tracks_is_empty_success() {
        let base = serve(vec![Route::get("/captions?", 200, r#"{"items":[]}"#)]).await;
        let strategy = DataApiStrategy::api_key(client(), &config(&base));

        assert!(strategy.fetch(&video()).await.unwrap().segments.is_empty());
    }

    #[tokio::test]
    async fn test_probe_with_api_key() {
        let base = serve(vec![Route::get("/videos?", 200, r#"{"items":[]}"#)]).await;
        let strategy = DataApiStrategy::api_key(client(), &config(&base));

        assert_eq!(strategy.probe().await.unwrap(), "API reachable");
    }
}
