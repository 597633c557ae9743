//! Error taxonomy shared by every capture backend.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    /// Grabber used before `initialize` completed.
    #[error("screen grabber not initialized; call initialize first")]
    NotInitialized,

    /// Portal or compositor granted no capture streams.
    #[error("no capture streams available")]
    NoStreamsAvailable,

    /// Benign: the source has produced nothing new since the last read.
    #[error("no new frame available")]
    NoChangesAvailable,

    /// A platform API returned a null, zero or failure result.
    #[error("native call failed: {0}")]
    NativeCallFailure(String),

    /// A bounded wait was exceeded. Retryable.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Capability invoked on an OS that does not provide it.
    #[error("not supported on this platform: {0}")]
    PlatformNotSupported(String),

    #[error("display not found: {0}")]
    DisplayNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("image encoding failed: {0}")]
    Encoding(String),

    /// The native connection a watcher depends on is gone.
    #[error("native connection closed: {0}")]
    Disconnected(String),

    /// Shutdown was requested while waiting.
    #[error("cancelled")]
    Cancelled,
}

impl CaptureError {
    pub fn native(context: impl Into<String>) -> Self {
        CaptureError::NativeCallFailure(context.into())
    }

    /// Fatal errors end a watcher loop; every other error degrades one tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Disconnected(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::Timeout(_) | CaptureError::NoChangesAvailable
        )
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Encoding(err.to_string())
    }
}
