use thiserror::Error;

/// Errors raised by the refresher and its fetch collaborators.
///
/// `InvalidConfig` and `NotRunning` are returned synchronously to the caller.
/// The fetch-time variants are never propagated out of the polling loop; they
/// are recorded in `RefreshState::last_error` and handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("refresher is not running")]
    NotRunning,
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    /// True for errors produced by a fetch attempt, as opposed to caller misuse.
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, Self::FetchFailed(_) | Self::MalformedResponse(_))
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::MalformedResponse(value.to_string())
        } else {
            Self::FetchFailed(value.to_string())
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedResponse(value.to_string())
    }
}
