use chrono::Utc;
use std::fmt;
use std::time::Duration;

use crate::extractors::{Strategy, StrategyError, StrategyKind, StrategyRegistry, TranscriptSource};
use crate::transcript::{normalize, Transcript, VideoId};

/// What happened to one strategy during a failed resolution
#[derive(Debug)]
pub enum AttemptReason {
    /// The strategy succeeded but produced no usable segments
    Empty,
    Failed(StrategyError),
}

#[derive(Debug)]
pub struct AttemptFailure {
    pub strategy: StrategyKind,
    pub reason: AttemptReason,
}

/// Every strategy was tried and none produced a transcript
#[derive(Debug)]
pub struct ResolutionFailure {
    /// One entry per attempted strategy, in attempt order
    pub attempts: Vec<AttemptFailure>,
}

impl ResolutionFailure {
    /// True when every strategy answered but none had captions
    pub fn is_no_transcript(&self) -> bool {
        !self.attempts.is_empty() && self.attempts.iter().all(|a| matches!(a.reason, AttemptReason::Empty))
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("no transcript strategies are configured");
        }
        if self.is_no_transcript() {
            return f.write_str("no transcript available for this video");
        }

        f.write_str("all transcript strategies failed")?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            match &attempt.reason {
                AttemptReason::Empty => write!(f, "{}{} returned no segments", sep, attempt.strategy)?,
                AttemptReason::Failed(e) => write!(f, "{}{}: {}", sep, attempt.strategy, e)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionFailure {}

/// Tries strategies one at a time in registry order until one yields segments
pub struct Resolver<S = Strategy> {
    registry: StrategyRegistry<S>,
    attempt_timeout: Option<Duration>,
}

impl<S: TranscriptSource> Resolver<S> {
    pub fn new(registry: StrategyRegistry<S>) -> Self {
        Self {
            registry,
            attempt_timeout: None,
        }
    }

    /// Guard every attempt with an outer deadline on top of the strategy's own
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry<S> {
        &self.registry
    }

    pub async fn resolve(&self, video_id: &VideoId) -> Result<Transcript, ResolutionFailure> {
        let mut attempts = Vec::new();

        for strategy in self.registry.strategies() {
            let kind = strategy.kind();
            tracing::debug!("Trying {} for {}", kind.display_name(), video_id);

            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, strategy.attempt(video_id)).await {
                    Ok(result) => result,
                    Err(_) => Err(StrategyError::Timeout(limit)),
                },
                None => strategy.attempt(video_id).await,
            };

            match result {
                Ok(raw) => {
                    let segments = normalize(raw.segments);
                    if segments.is_empty() {
                        tracing::info!("{} returned no segments for {}", kind, video_id);
                        attempts.push(AttemptFailure {
                            strategy: kind,
                            reason: AttemptReason::Empty,
                        });
                        continue;
                    }

                    tracing::info!("Resolved {} via {} ({} segments)", video_id, kind, segments.len());
                    return Ok(Transcript {
                        video_id: video_id.clone(),
                        segments,
                        source_strategy: kind,
                        language_code: raw.language_code,
                        is_auto_generated: raw.is_auto_generated.unwrap_or(false),
                        fetched_at: Utc::now(),
                    });
                }
                Err(e) => {
                    if e.is_parse() {
                        tracing::error!("{} could not parse upstream response for {}: {}", kind, video_id, e);
                    } else {
                        tracing::warn!("{} failed for {}: {}", kind, video_id, e);
                    }
                    attempts.push(AttemptFailure {
                        strategy: kind,
                        reason: AttemptReason::Failed(e),
                    });
                }
            }
        }

        Err(ResolutionFailure { attempts })
    }
}
