use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::MetadataConfig;
use crate::extractors::HttpClient;
use crate::transcript::VideoId;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";

/// Title and channel for a video; `duration` is a hint in seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub channel: String,
    pub duration: Option<f64>,
}

impl VideoMetadata {
    /// Used whenever the lookup fails
    pub fn placeholder() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            channel: UNKNOWN_CHANNEL.to_string(),
            duration: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, video_id: &VideoId) -> Result<VideoMetadata, MetadataError>;
}

/// oEmbed lookup; carries no duration
pub struct OEmbedClient {
    http: HttpClient,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
}

impl OEmbedClient {
    pub fn new(http: HttpClient, config: &MetadataConfig) -> Self {
        Self {
            http,
            endpoint: config.oembed_url.clone(),
        }
    }
}

#[async_trait]
impl MetadataLookup for OEmbedClient {
    async fn lookup(&self, video_id: &VideoId) -> Result<VideoMetadata, MetadataError> {
        let url = format!(
            "{}?url={}&format=json",
            self.endpoint,
            urlencoding::encode(&video_id.watch_url())
        );

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MetadataError::Unavailable(format!("oEmbed returned {}", response.status())));
        }

        let body: OEmbedResponse = response.json().await?;
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

        Ok(VideoMetadata {
            title: non_empty(body.title).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            channel: non_empty(body.author_name).unwrap_or_else(|| UNKNOWN_CHANNEL.to_string()),
            duration: None,
        })
    }
}
