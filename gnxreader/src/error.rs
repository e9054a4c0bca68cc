//! Error types for the reader
//!
//! Generic retry errors live next to the combinator in [`crate::poller`].

/// Failures of the audio channel and its output backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    /// The backend refused to start playback (autoplay policy, device busy...)
    #[error("Playback start refused: {0}")]
    StartFailed(String),

    /// The clip failed while playing
    #[error("Playback error: {0}")]
    Playback(String),

    /// The backend could not open the clip
    #[error("Audio output failure: {0}")]
    Output(String),

    #[error("No clip loaded")]
    NoClip,

    #[error("Audio channel disposed")]
    Disposed,
}

/// Failures while resolving the resources of one page
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// The image was still not generated when the polling budget ran out
    #[error("Image for page {page_id} not ready after {attempts} attempts")]
    ImageTimeout { page_id: String, attempts: u32 },

    /// Fetching a narration clip failed on every attempt
    #[error("Audio for detail {detail_id} failed after {attempts} attempts: {message}")]
    AudioFetch {
        detail_id: String,
        attempts: u32,
        message: String,
    },

    /// The page was abandoned (new page, disposal) before the load finished
    #[error("Page load cancelled")]
    Cancelled,

    #[error("No page initialized")]
    NotInitialized,
}

impl ResourceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResourceError::Cancelled)
    }
}

/// Errors reported by [`crate::ReadSession`] entry points
///
/// Every failure is also mirrored in `ReadState::error`, including a clip
/// the output refused to start or resume (the session then stays paused).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Comic or section metadata could not be fetched
    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    /// A newer `initialize` replaced the one this caller was waiting for
    #[error("Superseded by a newer initialization")]
    Superseded,

    /// Nothing has been loaded yet
    #[error("Session not initialized")]
    NotInitialized,

    /// The session is in the error state and must be initialized again
    #[error("Session not ready: {0}")]
    NotReady(String),

    /// The session worker is gone
    #[error("Session disposed")]
    Disposed,
}

impl SessionError {
    /// Wrap a backend error from a metadata call
    pub fn metadata(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Metadata(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ResourceError::AudioFetch {
            detail_id: "D1".into(),
            attempts: 3,
            message: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Audio for detail D1 failed after 3 attempts: boom"
        );

        let err: SessionError = err.into();
        assert!(err.to_string().starts_with("Audio for detail D1"));

        let err = SessionError::metadata("comic C1", "API error 404: Not Found");
        assert_eq!(
            err.to_string(),
            "Metadata error: comic C1: API error 404: Not Found"
        );
    }
}
