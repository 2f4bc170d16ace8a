//! Error types for the mr-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors raised by the
//! file watcher and the watch loop.

use camino::Utf8PathBuf;

/// Errors that can occur while watching the mock tree or rebuilding.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the subscription is gone
/// - **Path not found** ([`WatchError::PathNotFound`]): Fatal - the root must exist
/// - **Channel closed** ([`WatchError::ChannelClosed`]): Fatal - the loop has stopped
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip the notice
/// - **I/O errors** ([`WatchError::Io`]): Fatal
/// - **Rebuild failed** ([`WatchError::Rebuild`]): Recoverable - the previous
///   table is still being served
/// - **Rebuild aborted** ([`WatchError::RebuildAborted`]): Fatal - the loop stopped
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The path to watch does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The watch loop is no longer running.
    #[error("watch loop is closed")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A requested rebuild failed; the loop keeps running.
    #[error("rebuild failed: {0}")]
    Rebuild(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A rebuild failed in a way that stopped the loop.
    #[error("watch loop stopped: {0}")]
    RebuildAborted(String),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_) | Self::Rebuild(_))
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) => Some(path),
            Self::Notify(_)
            | Self::ChannelClosed
            | Self::NonUtf8Path(_)
            | Self::Io(_)
            | Self::Rebuild(_)
            | Self::RebuildAborted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_path_not_found() {
        let err = WatchError::path_not_found("mocks");
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("mocks"));
        assert_eq!(err.to_string(), "path does not exist: mocks");
    }

    #[test]
    fn test_channel_closed() {
        let err = WatchError::ChannelClosed;
        assert!(err.is_fatal());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_rebuild_failure_is_recoverable() {
        let source = io::Error::new(io::ErrorKind::NotFound, "mock root is gone");
        let err = WatchError::Rebuild(Box::new(source));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("mock root is gone"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_rebuild_aborted_is_fatal() {
        let err = WatchError::RebuildAborted("concurrent rebuild".to_owned());
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "watch loop stopped: concurrent rebuild");
    }
}
