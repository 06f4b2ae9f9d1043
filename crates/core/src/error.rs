//! Error types shared by the translation pipeline.

use thiserror::Error;

/// Failures a translation run can hit. Each one is scoped to the chunk or
/// job that produced it; none of them stops the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// The input produced no subtitle entries.
    #[error("the file does not seem to be a valid SRT file or is empty")]
    InvalidDocument,

    /// The backend answered with a different number of segments than it was sent.
    #[error(
        "translation output was malformed: expected {expected} subtitle blocks, but received {received}"
    )]
    MalformedTranslationOutput { expected: usize, received: usize },

    /// Transport or service failure while talking to the backend.
    #[error("translation backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No API key configured for the backend.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// A run was requested with unusable arguments.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

pub type Result<T, E = TranslationError> = std::result::Result<T, E>;
