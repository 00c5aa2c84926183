//! Turn-level error taxonomy.

use thiserror::Error;

/// Terminal outcomes of a turn that did not complete normally.
#[derive(Debug, Error)]
pub enum GameError {
    /// A turn is already in flight for this session. Recoverable; the
    /// client should wait for the running turn to finish.
    #[error("a turn is already in flight for this session")]
    SessionBusy,

    /// The action is not valid in the session's current state. The reason
    /// is safe to surface verbatim.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Every configured completion provider failed. Recoverable at the
    /// next action.
    #[error("all completion providers exhausted")]
    ProviderExhausted,

    /// Persistence could not complete after bounded retries. Fatal for the
    /// turn; the session is left unlocked so a future turn can retry.
    #[error("session persistence failed: {0}")]
    StorageFailure(String),

    /// The client went away mid-stream. Logged only, never surfaced.
    #[error("client disconnected mid-stream")]
    StreamAbort,
}

impl GameError {
    /// The message that may cross the client boundary. Provider and
    /// storage details never leak; only `InvalidAction` is verbatim.
    #[must_use]
    pub fn client_detail(&self) -> &str {
        match self {
            Self::SessionBusy => "the previous turn is still resolving; wait for it to finish",
            Self::InvalidAction(reason) => reason,
            Self::ProviderExhausted => "the storyteller is unreachable right now; try again shortly",
            Self::StorageFailure(_) => "your progress could not be saved; try again",
            Self::StreamAbort => "connection lost",
        }
    }
}
