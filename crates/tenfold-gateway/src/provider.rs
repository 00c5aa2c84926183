//! Completion provider contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::prompt::PromptContext;

/// Lazy sequence of text fragments from one completion call.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Errors raised by a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("upstream returned http {status}")]
    Http { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered but the payload was unusable.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the same provider is worth retrying before failing over.
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited | Self::Transport(_) => true,
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// One upstream completion backend. A provider may expose several
/// candidate models; the gateway rotates through them across retries.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Stable configured name, used for preference selection and logs.
    fn name(&self) -> &str;

    /// Candidate models in preference order. Never empty.
    fn models(&self) -> &[String];

    /// Opens a streaming completion for the given context and model.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the call cannot be opened; errors
    /// after the stream is open travel inside the stream items.
    async fn open(&self, ctx: &PromptContext, model: &str)
    -> Result<FragmentStream, ProviderError>;
}
