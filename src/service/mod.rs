use serde::Serialize;
use std::sync::Arc;

pub mod locks;
pub mod metadata;

use crate::config::Config;
use crate::extractors::credentials::{AccessTokenProvider, TokenFile};
use crate::extractors::{HttpClient, Strategy, StrategyRegistry, TranscriptSource};
use crate::resolver::{ResolutionFailure, Resolver};
use crate::store::{NewRecord, TranscriptStore};
use crate::transcript::{Transcript, VideoId};
use crate::TubescriptError;

use locks::KeyedLocks;
use metadata::{MetadataLookup, OEmbedClient, VideoMetadata};

/// Stored in place of transcript text when nothing could be fetched
pub const NO_TRANSCRIPT_PLACEHOLDER: &str = "No transcript available for this video. This could be because:\n\n\
- The video has no captions/subtitles\n\
- Captions are disabled by the creator\n\
- YouTube's transcript services are currently unavailable\n\n\
Try checking if the video has captions enabled on YouTube.";

pub const MESSAGE_EXISTS: &str = "Transcript already exists";
pub const MESSAGE_STORED: &str = "Transcript fetched and stored successfully";
pub const MESSAGE_NO_TRANSCRIPT: &str = "Video info stored - no transcript available";
pub const MESSAGE_FAILED: &str = "Video saved but transcript unavailable";

/// Summary returned by `fetch_and_store`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOutcome {
    pub message: String,
    pub record_id: i64,
    pub video_id: String,
    pub title: String,
    /// Length of the stored transcript text, in characters
    pub transcript_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A resolved transcript together with the video's metadata
#[derive(Debug, Clone)]
pub struct ResolvedVideo {
    pub info: VideoMetadata,
    pub transcript: Transcript,
}

/// Ties resolution, metadata lookup and persistence together
pub struct TranscriptService<S = Strategy, M = OEmbedClient> {
    resolver: Resolver<S>,
    metadata: M,
    store: Arc<TranscriptStore>,
    locks: KeyedLocks,
}

impl TranscriptService {
    /// Production wiring from configuration
    pub fn from_config(config: &Config, store: Arc<TranscriptStore>) -> anyhow::Result<Self> {
        let credentials = config
            .data_api
            .oauth_token_file
            .as_ref()
            .map(|path| Arc::new(TokenFile::new(path)) as Arc<dyn AccessTokenProvider>);

        let registry = StrategyRegistry::from_config(config, credentials)?;
        let resolver = Resolver::new(registry).with_attempt_timeout(config.resolver.attempt_timeout());
        let metadata = OEmbedClient::new(HttpClient::from_config(&config.http)?, &config.metadata);

        Ok(Self::new(resolver, metadata, store))
    }
}

impl<S: TranscriptSource, M: MetadataLookup> TranscriptService<S, M> {
    pub fn new(resolver: Resolver<S>, metadata: M, store: Arc<TranscriptStore>) -> Self {
        Self {
            resolver,
            metadata,
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn resolver(&self) -> &Resolver<S> {
        &self.resolver
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Metadata for a video, never failing
    pub async fn video_metadata(&self, video_id: &VideoId) -> VideoMetadata {
        match self.metadata.lookup(video_id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Metadata lookup failed for {}: {}", video_id, e);
                VideoMetadata::placeholder()
            }
        }
    }

    /// Resolve a transcript and look up metadata without persisting anything
    pub async fn resolve_with_info(&self, input: &str) -> Result<ResolvedVideo, TubescriptError> {
        let video_id = VideoId::parse(input)?;

        let (transcript, mut info) = tokio::join!(self.resolver.resolve(&video_id), self.video_metadata(&video_id));
        let transcript = transcript?;

        if info.duration.is_none() {
            info.duration = transcript.duration_hint();
        }

        Ok(ResolvedVideo { info, transcript })
    }

    /// Fetch a transcript and persist it, at most once per video.
    ///
    /// An existing record is returned as-is. When no strategy yields a
    /// transcript the video is still stored, with placeholder text.
    pub async fn fetch_and_store(&self, input: &str) -> Result<StoreOutcome, TubescriptError> {
        let video_id = VideoId::parse(input)?;
        let _guard = self.locks.lock(video_id.as_str()).await;

        if let Some(existing) = self.store.get_by_video_id(&video_id)? {
            tracing::info!("Transcript for {} already stored as record {}", video_id, existing.id);
            return Ok(StoreOutcome {
                message: MESSAGE_EXISTS.to_string(),
                record_id: existing.id,
                video_id: existing.video_id,
                title: existing.title,
                transcript_length: existing.transcript.chars().count(),
                warning: None,
            });
        }

        let (resolution, info) = tokio::join!(self.resolver.resolve(&video_id), self.video_metadata(&video_id));

        let (record, message, warning) = match resolution {
            Ok(transcript) => (stored_record(&video_id, &info, Some(&transcript)), MESSAGE_STORED, None),
            Err(failure) => {
                let message = failure_message(&failure);
                tracing::warn!("Storing {} without transcript: {}", video_id, failure);
                (stored_record(&video_id, &info, None), message, Some(failure.to_string()))
            }
        };

        let record_id = self.store.upsert(&record)?;
        tracing::info!("{} ({}): {}", video_id, record.title, message);

        Ok(StoreOutcome {
            message: message.to_string(),
            record_id,
            video_id: video_id.to_string(),
            title: record.title,
            transcript_length: record.transcript.chars().count(),
            warning,
        })
    }
}

fn failure_message(failure: &ResolutionFailure) -> &'static str {
    if failure.is_no_transcript() {
        MESSAGE_NO_TRANSCRIPT
    } else {
        MESSAGE_FAILED
    }
}

fn stored_record(video_id: &VideoId, info: &VideoMetadata, transcript: Option<&Transcript>) -> NewRecord {
    match transcript {
        Some(transcript) => NewRecord {
            video_id: video_id.clone(),
            title: info.title.clone(),
            channel: info.channel.clone(),
            duration: info.duration.or_else(|| transcript.duration_hint()),
            transcript: transcript.full_text(),
            segments: transcript.segments.clone(),
            source_strategy: Some(transcript.source_strategy),
            language_code: transcript.language_code.clone(),
            is_auto_generated: transcript.is_auto_generated,
        },
        None => NewRecord {
            video_id: video_id.clone(),
            title: info.title.clone(),
            channel: info.channel.clone(),
            duration: info.duration,
            transcript: NO_TRANSCRIPT_PLACEHOLDER.to_string(),
            segments: Vec::new(),
            source_strategy: None,
            language_code: None,
            is_auto_generated: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MockTranscriptSource, RawTranscript, StrategyError, StrategyKind};
    use crate::transcript::RawSegment;
    use metadata::{MetadataError, MockMetadataLookup};

    fn metadata_ok() -> MockMetadataLookup {
        let mut mock = MockMetadataLookup::new();
        mock.expect_lookup().returning(|_| {
            Ok(VideoMetadata {
                title: "Never Gonna Give You Up".to_string(),
                channel: "Rick Astley".to_string(),
                duration: None,
            })
        });
        mock
    }

    fn source(times: usize, result: fn() -> Result<RawTranscript, StrategyError>) -> MockTranscriptSource {
        let mut mock = MockTranscriptSource::new();
        mock.expect_kind().return_const(StrategyKind::Process);
        mock.expect_attempt().times(times).returning(move |_| result());
        mock
    }

    fn hello() -> Result<RawTranscript, StrategyError> {
        Ok(RawTranscript::new(vec![
            RawSegment::new("hello", 0.0, Some(2.0)),
            RawSegment::new("world", 2.0, Some(3.0)),
        ]))
    }

    fn service(source: MockTranscriptSource, metadata: MockMetadataLookup) -> TranscriptService<MockTranscriptSource, MockMetadataLookup> {
        let store = Arc::new(TranscriptStore::in_memory().unwrap());
        TranscriptService::new(Resolver::new(StrategyRegistry::new(vec![source])), metadata, store)
    }

    #[tokio::test]
    async fn test_fetch_and_store_is_idempotent() {
        let service = service(source(1, hello), metadata_ok());

        let first = service.fetch_and_store("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(first.message, MESSAGE_STORED);
        assert_eq!(first.title, "Never Gonna Give You Up");
        assert_eq!(first.transcript_length, "hello world".len());
        assert_eq!(first.warning, None);

        let second = service.fetch_and_store("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(second.message, MESSAGE_EXISTS);
        assert_eq!(second.record_id, first.record_id);
        assert_eq!(service.store().count().unwrap(), 1);

        let stored = service.store().get(first.record_id).unwrap().unwrap();
        assert_eq!(stored.transcript, "hello world");
        assert_eq!(stored.duration, Some(5.0));
        assert_eq!(stored.source_strategy, Some(StrategyKind::Process));
    }

    #[tokio::test]
    async fn test_concurrent_stores_for_same_video_produce_one_row() {
        let service = service(source(1, hello), metadata_ok());

        let (a, b) = tokio::join!(
            service.fetch_and_store("dQw4w9WgXcQ"),
            service.fetch_and_store("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.record_id, b.record_id);
        assert_eq!(service.store().count().unwrap(), 1);

        let mut messages = vec![a.message, b.message];
        messages.sort();
        assert_eq!(messages, vec![MESSAGE_EXISTS, MESSAGE_STORED]);
    }

    #[tokio::test]
    async fn test_zero_captions_store_placeholder_with_warning() {
        let service = service(source(1, || Ok(RawTranscript::new(vec![]))), metadata_ok());

        let outcome = service.fetch_and_store("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(outcome.message, MESSAGE_NO_TRANSCRIPT);
        assert!(outcome.warning.is_some());
        assert_eq!(outcome.transcript_length, NO_TRANSCRIPT_PLACEHOLDER.chars().count());

        let stored = service.store().get(outcome.record_id).unwrap().unwrap();
        assert_eq!(stored.transcript, NO_TRANSCRIPT_PLACEHOLDER);
        assert!(stored.segments.is_empty());

        // Still findable by title
        assert_eq!(service.store().search("Astley").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_strategies_store_placeholder() {
        let service = service(
            source(1, || Err(StrategyError::Unavailable("upstream down".to_string()))),
            metadata_ok(),
        );

        let outcome = service.fetch_and_store("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(outcome.message, MESSAGE_FAILED);
        assert!(outcome.warning.unwrap().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_metadata_failure_falls_back_to_placeholders() {
        let mut metadata = MockMetadataLookup::new();
        metadata
            .expect_lookup()
            .returning(|_| Err(MetadataError::Unavailable("offline".to_string())));
        let service = service(source(1, hello), metadata);

        let outcome = service.fetch_and_store("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(outcome.title, metadata::UNKNOWN_TITLE);
        assert_eq!(outcome.message, MESSAGE_STORED);

        let stored = service.store().get(outcome.record_id).unwrap().unwrap();
        assert_eq!(stored.channel, metadata::UNKNOWN_CHANNEL);
    }

    #[tokio::test]
    async fn test_invalid_identifier_resolves_nothing() {
        let service = service(source(0, hello), metadata_ok());

        let err = service.fetch_and_store("not a video").await.unwrap_err();
        assert!(matches!(err, TubescriptError::InvalidIdentifier(_)));
        assert_eq!(service.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resolve_with_info_uses_duration_hint() {
        let service = service(source(1, hello), metadata_ok());

        let resolved = service.resolve_with_info("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(resolved.info.duration, Some(5.0));
        assert_eq!(resolved.transcript.segments.len(), 2);
        assert_eq!(service.store().count().unwrap(), 0);
    }
}
