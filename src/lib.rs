//! tubescript - acquire YouTube transcripts through a chain of fallback strategies
//!
//! A video identifier is normalized, a fixed-priority list of extraction
//! strategies is tried one at a time until one yields caption segments, and the
//! result is stored in a local SQLite database with a full-text index.

pub mod api;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod resolver;
pub mod service;
pub mod store;
pub mod transcript;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{Strategy, StrategyError, StrategyKind, StrategyRegistry, TranscriptSource};
pub use resolver::{ResolutionFailure, Resolver};
pub use service::{StoreOutcome, TranscriptService};
pub use store::{StoreError, TranscriptStore};
pub use transcript::{Transcript, TranscriptSegment, VideoId};

/// Result type used by the binary and configuration glue
pub type Result<T> = anyhow::Result<T>;

/// Errors surfaced by the top-level operations
#[derive(thiserror::Error, Debug)]
pub enum TubescriptError {
    #[error("invalid video identifier: {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    #[error("storage error: {0}")]
    Persistence(#[from] StoreError),
}
