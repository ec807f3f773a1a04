//! Bearer-credential capability consumed by the OAuth strategy.
//!
//! Acquiring and refreshing tokens is someone else's job; this side only asks
//! "is there a usable token right now".

use serde::Deserialize;
use std::path::PathBuf;

pub trait AccessTokenProvider: Send + Sync {
    /// Current bearer token, or `None` if the caller is not authorized
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, mostly for tests and one-off runs
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl AccessTokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reads a token JSON file written by an external OAuth2 flow.
///
/// The file is re-read on every call so a refreshed token is picked up
/// without restarting.
pub struct TokenFile {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: Option<String>,
    /// Milliseconds since the epoch, as Google client libraries write it
    expiry_date: Option<i64>,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> anyhow::Result<StoredToken> {
        let content = fs_err::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl AccessTokenProvider for TokenFile {
    fn access_token(&self) -> Option<String> {
        let token = match self.read() {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!("No usable OAuth token at {}: {:#}", self.path.display(), e);
                return None;
            }
        };

        if let Some(expiry) = token.expiry_date {
            if expiry <= chrono::Utc::now().timestamp_millis() {
                tracing::debug!("OAuth token at {} has expired", self.path.display());
                return None;
            }
        }

        token.access_token.filter(|t| !t.is_empty())
    }
}
