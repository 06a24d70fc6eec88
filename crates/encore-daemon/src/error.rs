//! Error types for the continuation controller and its collaborators.
//!
//! Nothing here is fatal to the process: every failure degrades to "no
//! continuation happened this cycle" plus a log line.

use encore_proto::protocol::SessionKey;
use thiserror::Error;

/// Failures reported by an [`AudioEngine`](crate::ports::AudioEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine no longer knows this session (torn down asynchronously).
    #[error("session {0} is not known to the audio engine")]
    StaleSession(SessionKey),

    #[error("audio engine request failed: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Backend(e.to_string())
    }
}

/// Failures of the recommendation, search/resolve, synthesis and notify
/// collaborators.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    ProviderUnavailable(#[from] ProviderError),

    #[error("no recommendation candidates")]
    NoCandidates,

    #[error("no candidate resolved to a playable item")]
    NoPlayableResult,

    #[error("session {0} is gone")]
    StaleSession(SessionKey),

    #[error("autoplay already in progress")]
    GuardBusy,

    #[error("text-to-speech is not enabled for this session")]
    TtsDisabled,

    #[error("nothing to speak")]
    EmptyText,

    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for ControllerError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::StaleSession(key) => ControllerError::StaleSession(key),
            other => ControllerError::Engine(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
