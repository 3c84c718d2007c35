//! Translation backends behind a single `Translator` capability.
//!
//! Every adapter binds its configuration once at startup and exposes
//! `translate(text)`. Adapters never retry; falling back to the next backend
//! is the pipeline's job.

pub mod deepl;
pub mod duckduckgo;
pub mod google;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

/// A successful translation and the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub provider: String,
}

/// Why a single provider could not translate. Always recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("empty response")]
    EmptyResponse,
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl ProviderError {
    /// Short, stable label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unreachable(_) => "unreachable",
            ProviderError::EmptyResponse => "empty_response",
            ProviderError::RateLimited(_) => "rate_limited",
        }
    }

    /// Classify a non-success HTTP status.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 200));
        if status == StatusCode::TOO_MANY_REQUESTS {
            ProviderError::RateLimited(detail)
        } else {
            ProviderError::Unreachable(detail)
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            ProviderError::RateLimited(e.to_string())
        } else {
            ProviderError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Provider identity used in logs and attempt reports.
    fn name(&self) -> &str;

    async fn translate(&self, text: &str) -> Result<Translation, ProviderError>;
}

/// Wrap backend output, rejecting blank text.
pub(crate) fn translation(text: &str, provider: &str) -> Result<Translation, ProviderError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(Translation {
        text: text.to_string(),
        provider: provider.to_string(),
    })
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
