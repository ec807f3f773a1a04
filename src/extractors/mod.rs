use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod credentials;
pub mod data_api;
pub mod http;
pub mod innertube;
pub mod process;
pub mod watch_page;

use crate::config::Config;
use crate::transcript::captions::parse_caption_body;
use crate::transcript::{ParseError, RawSegment, VideoId};

use credentials::AccessTokenProvider;
use data_api::DataApiStrategy;
pub use http::HttpClient;
use innertube::InnertubeStrategy;
use process::ProcessStrategy;
use watch_page::WatchPageStrategy;

/// Video used by health probes; known to carry manual English captions
pub const PROBE_VIDEO_ID: &str = "dQw4w9WgXcQ";

/// The kinds of extraction strategy, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Process,
    #[serde(rename = "oauth_api")]
    OAuthApi,
    ApiKeyApi,
    EmbeddedClient,
    WatchPage,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Process,
        StrategyKind::OAuthApi,
        StrategyKind::ApiKeyApi,
        StrategyKind::EmbeddedClient,
        StrategyKind::WatchPage,
    ];

    /// Lower runs first
    pub fn priority(&self) -> u8 {
        match self {
            StrategyKind::Process => 1,
            StrategyKind::OAuthApi => 2,
            StrategyKind::ApiKeyApi => 3,
            StrategyKind::EmbeddedClient => 4,
            StrategyKind::WatchPage => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Process => "process",
            StrategyKind::OAuthApi => "oauth_api",
            StrategyKind::ApiKeyApi => "api_key_api",
            StrategyKind::EmbeddedClient => "embedded_client",
            StrategyKind::WatchPage => "watch_page",
        }
    }

    /// Human-readable name for logs and the console
    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyKind::Process => "External transcript process",
            StrategyKind::OAuthApi => "YouTube Data API (OAuth2)",
            StrategyKind::ApiKeyApi => "YouTube Data API (API key)",
            StrategyKind::EmbeddedClient => "Innertube player client",
            StrategyKind::WatchPage => "Watch page captions",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown strategy kind: {}", s))
    }
}

/// Why a single strategy attempt failed. Every variant triggers fallback.
#[derive(thiserror::Error, Debug)]
pub enum StrategyError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unrecognized response format: {0}")]
    Parse(String),

    #[error("process exited with {status}: {stderr}")]
    ProcessExit { status: String, stderr: String },

    #[error("{0}")]
    Unavailable(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StrategyError {
    /// Parse failures may mean the upstream changed its format for every video
    pub fn is_parse(&self) -> bool {
        matches!(self, StrategyError::Parse(_))
    }
}

impl From<ParseError> for StrategyError {
    fn from(e: ParseError) -> Self {
        StrategyError::Parse(e.0)
    }
}

impl From<serde_json::Error> for StrategyError {
    fn from(e: serde_json::Error) -> Self {
        StrategyError::Parse(e.to_string())
    }
}

/// Successful strategy output, possibly with zero segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTranscript {
    pub segments: Vec<RawSegment>,
    pub language_code: Option<String>,
    pub is_auto_generated: Option<bool>,
}

impl RawTranscript {
    pub fn new(segments: Vec<RawSegment>) -> Self {
        Self {
            segments,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language_code: Option<String>, is_auto_generated: Option<bool>) -> Self {
        self.language_code = language_code;
        self.is_auto_generated = is_auto_generated;
        self
    }
}

/// One upstream surface that can produce caption segments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Try to fetch segments for a video
    async fn attempt(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError>;

    /// Check that the strategy can work at all; returns a short status message
    async fn probe(&self) -> Result<String, StrategyError>;
}

/// The closed set of production strategies
pub enum Strategy {
    Process(ProcessStrategy),
    OAuthApi(DataApiStrategy),
    ApiKeyApi(DataApiStrategy),
    EmbeddedClient(InnertubeStrategy),
    WatchPage(WatchPageStrategy),
}

#[async_trait]
impl TranscriptSource for Strategy {
    fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Process(_) => StrategyKind::Process,
            Strategy::OAuthApi(_) => StrategyKind::OAuthApi,
            Strategy::ApiKeyApi(_) => StrategyKind::ApiKeyApi,
            Strategy::EmbeddedClient(_) => StrategyKind::EmbeddedClient,
            Strategy::WatchPage(_) => StrategyKind::WatchPage,
        }
    }

    async fn attempt(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError> {
        match self {
            Strategy::Process(s) => s.fetch(video_id).await,
            Strategy::OAuthApi(s) | Strategy::ApiKeyApi(s) => s.fetch(video_id).await,
            Strategy::EmbeddedClient(s) => s.fetch(video_id).await,
            Strategy::WatchPage(s) => s.fetch(video_id).await,
        }
    }

    async fn probe(&self) -> Result<String, StrategyError> {
        match self {
            Strategy::Process(s) => s.probe().await,
            Strategy::OAuthApi(s) | Strategy::ApiKeyApi(s) => s.probe().await,
            Strategy::EmbeddedClient(s) => s.probe().await,
            Strategy::WatchPage(s) => s.probe().await,
        }
    }
}

/// Strategies in fixed priority order
pub struct StrategyRegistry<S = Strategy> {
    strategies: Vec<S>,
}

impl<S: TranscriptSource> StrategyRegistry<S> {
    /// Order is decided here, once, by `StrategyKind::priority`
    pub fn new(mut strategies: Vec<S>) -> Self {
        strategies.sort_by_key(|s| s.kind().priority());
        Self { strategies }
    }

    pub fn strategies(&self) -> &[S] {
        &self.strategies
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl StrategyRegistry<Strategy> {
    /// Build the production strategy set from configuration
    pub fn from_config(
        config: &Config,
        credentials: Option<Arc<dyn AccessTokenProvider>>,
    ) -> anyhow::Result<Self> {
        let http = HttpClient::from_config(&config.http)?;
        let mut strategies = Vec::new();

        if config.process.enabled {
            strategies.push(Strategy::Process(ProcessStrategy::from_config(&config.process)));
        }

        if let Some(credentials) = credentials {
            strategies.push(Strategy::OAuthApi(DataApiStrategy::oauth(
                http.clone(),
                &config.data_api,
                credentials,
            )));
        }

        strategies.push(Strategy::ApiKeyApi(DataApiStrategy::api_key(
            http.clone(),
            &config.data_api,
        )));
        strategies.push(Strategy::EmbeddedClient(InnertubeStrategy::new(
            http.clone(),
            &config.innertube,
        )));
        strategies.push(Strategy::WatchPage(WatchPageStrategy::new(
            http,
            &config.watch_page,
        )));

        let registry = Self::new(strategies);
        tracing::debug!("Registered strategies: {:?}", registry.kinds());
        Ok(registry)
    }
}

/// A timed-text track as the web player describes it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerCaptionTrack {
    pub base_url: String,
    #[serde(default)]
    pub language_code: String,
    /// `"asr"` for speech-recognition tracks
    #[serde(default)]
    pub kind: Option<String>,
}

impl PlayerCaptionTrack {
    pub fn is_auto_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Download a player caption track and run it through the shared parser.
///
/// `base_url` resolves relative track URLs; `format` replaces any `fmt` query
/// parameter already on the track URL.
pub(crate) async fn download_player_track(
    http: &HttpClient,
    base_url: &str,
    track: &PlayerCaptionTrack,
    format: Option<&str>,
) -> Result<RawTranscript, StrategyError> {
    let mut url = url::Url::parse(base_url)
        .and_then(|base| base.join(&track.base_url))
        .map_err(|e| StrategyError::Parse(format!("bad caption track url {:?}: {}", track.base_url, e)))?;

    if let Some(format) = format {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "fmt")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs).append_pair("fmt", format);
    }

    tracing::debug!("Downloading caption track {} ({})", track.language_code, url);
    let body = http.text(http.get(url)).await?;
    let segments = parse_caption_body(&body)?;

    let language = Some(track.language_code.clone()).filter(|l| !l.is_empty());
    Ok(RawTranscript::new(segments).with_language(language, Some(track.is_auto_generated())))
}

/// Prefer an `en` or `en-US` track, else the first one listed
pub(crate) fn pick_track<'a, T>(tracks: &'a [T], language: impl Fn(&T) -> &str) -> Option<&'a T> {
    tracks
        .iter()
        .find(|t| matches!(language(t), "en" | "en-US"))
        .or_else(|| tracks.first())
}
