//! Request/response shapes consumed by the CLI and other front ends.
//!
//! Every operation returns a `success` flag and never an `Err`; failures are
//! reported as `{ "success": false, "error": "..." }`.

use serde::{Deserialize, Serialize};

pub mod health;

pub use health::{health_check, HealthReport, HealthStatus, StrategyHealth};

use crate::extractors::TranscriptSource;
use crate::service::metadata::MetadataLookup;
use crate::service::{StoreOutcome, TranscriptService};
use crate::store::{SearchHit, TranscriptStore};
use crate::TubescriptError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchRequest {
    #[serde(rename = "videoId", default)]
    pub video_id: Option<String>,
    #[serde(rename = "videoUrl", default)]
    pub video_url: Option<String>,
}

impl FetchRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            video_id: None,
            video_url: Some(input.into()),
        }
    }

    fn input(&self) -> Option<&str> {
        self.video_id
            .as_deref()
            .or(self.video_url.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptLine {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptLine>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResponse {
    fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            video_info: None,
            transcript: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: Option<StoreOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Primary entry point: resolve a transcript and metadata without storing
pub async fn fetch_transcript<S, M>(service: &TranscriptService<S, M>, request: &FetchRequest) -> FetchResponse
where
    S: TranscriptSource,
    M: MetadataLookup,
{
    let Some(input) = request.input() else {
        return FetchResponse::failure("either videoId or videoUrl is required");
    };

    match service.resolve_with_info(input).await {
        Ok(resolved) => FetchResponse {
            success: true,
            video_info: Some(VideoInfo {
                video_id: resolved.transcript.video_id.to_string(),
                title: resolved.info.title,
                channel: resolved.info.channel,
                duration: resolved.info.duration,
            }),
            transcript: Some(
                resolved
                    .transcript
                    .segments
                    .into_iter()
                    .map(|s| TranscriptLine {
                        text: s.text,
                        start: s.start_seconds,
                        duration: s.duration_seconds,
                    })
                    .collect(),
            ),
            error: None,
        },
        Err(e) => {
            tracing::error!("Fetch failed for {}: {}", input, e);
            FetchResponse::failure(e)
        }
    }
}

pub fn search_transcripts(store: &TranscriptStore, request: &SearchRequest) -> SearchResponse {
    match store.search(&request.query) {
        Ok(results) => SearchResponse {
            success: true,
            results,
            error: None,
        },
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            SearchResponse {
                success: false,
                results: Vec::new(),
                error: Some(TubescriptError::from(e).to_string()),
            }
        }
    }
}

pub async fn store_transcript<S, M>(service: &TranscriptService<S, M>, input: &str) -> StoreResponse
where
    S: TranscriptSource,
    M: MetadataLookup,
{
    match service.fetch_and_store(input).await {
        Ok(outcome) => StoreResponse {
            success: true,
            outcome: Some(outcome),
            error: None,
        },
        Err(e) => {
            tracing::error!("Store failed for {}: {}", input, e);
            StoreResponse {
                success: false,
                outcome: None,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MockTranscriptSource, RawTranscript, StrategyError, StrategyKind, StrategyRegistry};
    use crate::resolver::Resolver;
    use crate::service::metadata::{MockMetadataLookup, VideoMetadata};
    use crate::transcript::RawSegment;
    use std::sync::Arc;

    fn service(result: fn() -> Result<RawTranscript, StrategyError>) -> TranscriptService<MockTranscriptSource, MockMetadataLookup> {
        let mut source = MockTranscriptSource::new();
        source.expect_kind().return_const(StrategyKind::WatchPage);
        source.expect_attempt().returning(move |_| result());

        let mut metadata = MockMetadataLookup::new();
        metadata.expect_lookup().returning(|_| {
            Ok(VideoMetadata {
                title: "Title".to_string(),
                channel: "Channel".to_string(),
                duration: Some(212.0),
            })
        });

        let store = Arc::new(TranscriptStore::in_memory().unwrap());
        TranscriptService::new(Resolver::new(StrategyRegistry::new(vec![source])), metadata, store)
    }

    fn lines() -> Result<RawTranscript, StrategyError> {
        Ok(RawTranscript::new(vec![RawSegment::new("Hello\nworld", 0.0, Some(2.0))]))
    }

    #[tokio::test]
    async fn test_fetch_response_field_names() {
        let service = service(lines);
        let request: FetchRequest = serde_json::from_str(r#"{"videoUrl":"https://youtu.be/dQw4w9WgXcQ"}"#).unwrap();

        let response = fetch_transcript(&service, &request).await;
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["video_info"]["video_id"], "dQw4w9WgXcQ");
        assert_eq!(json["video_info"]["title"], "Title");
        assert_eq!(json["video_info"]["channel"], "Channel");
        assert_eq!(json["video_info"]["duration"], 212.0);
        assert_eq!(json["transcript"][0]["text"], "Hello world");
        assert_eq!(json["transcript"][0]["start"], 0.0);
        assert_eq!(json["transcript"][0]["duration"], 2.0);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failures_become_error_strings() {
        let service = service(|| Ok(RawTranscript::new(vec![])));

        let response = fetch_transcript(&service, &FetchRequest::new("dQw4w9WgXcQ")).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("no transcript available for this video"));

        let response = fetch_transcript(&service, &FetchRequest::new("https://example.com/watch?v=x")).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("invalid video identifier"));

        let response = fetch_transcript(&service, &FetchRequest::default()).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_store_and_search_round() {
        let service = service(lines);

        let stored = store_transcript(&service, "dQw4w9WgXcQ").await;
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["videoId"], "dQw4w9WgXcQ");
        assert_eq!(json["transcriptLength"], 11);
        assert!(json.get("warning").is_none());

        let found = search_transcripts(service.store(), &SearchRequest { query: "world".to_string() });
        assert!(found.success);
        assert_eq!(found.results.len(), 1);
        assert!(found.results[0].snippet.contains("<mark>world</mark>"));

        let empty = search_transcripts(service.store(), &SearchRequest { query: String::new() });
        assert!(empty.success);
        assert!(empty.results.is_empty());
    }
}
