//! Error types for the mr-routes crate.
//!
//! This module provides the [`RouteError`] type for everything that can go
//! wrong while deriving, loading, or serving mock routes.

use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};

use crate::naming::NameRejection;

/// Errors that can occur while building or serving the route table.
///
/// # Error Recovery Strategy
///
/// - **Per-entry errors** ([`InvalidName`](RouteError::InvalidName),
///   [`UnreadableDirectory`](RouteError::UnreadableDirectory),
///   [`Read`](RouteError::Read), [`MalformedPayload`](RouteError::MalformedPayload),
///   [`InvalidHandler`](RouteError::InvalidHandler), [`Conflict`](RouteError::Conflict),
///   [`NonUtf8Path`](RouteError::NonUtf8Path)): log, drop the entry, keep deriving.
/// - **Handler calls** ([`HandlerCall`](RouteError::HandlerCall)): answer the one
///   request with an error, nothing else is affected.
/// - **Structural** ([`RootUnavailable`](RouteError::RootUnavailable)): abort the
///   rebuild and keep serving the last-known-good table.
/// - **Fatal** ([`ConcurrentRebuild`](RouteError::ConcurrentRebuild)): the
///   single-rebuild guarantee was broken; the watch loop stops.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// A file or directory name failed validation.
    #[error("invalid file or folder name {path}: {reason}")]
    InvalidName {
        /// The rejected entry.
        path: PathBuf,
        /// Why the name was rejected.
        reason: NameRejection,
    },

    /// A directory could not be listed; its subtree was skipped.
    #[error("unreadable directory: {0}")]
    UnreadableDirectory(#[from] ignore::Error),

    /// A route source file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A static payload is not valid JSON.
    #[error("malformed JSON payload {path}: {source}")]
    MalformedPayload {
        /// The offending file.
        path: Utf8PathBuf,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A handler script failed to load or does not evaluate to a function.
    #[error("invalid handler {path}: {reason}")]
    InvalidHandler {
        /// The offending script.
        path: Utf8PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The router primitive refused a pattern next to an existing one.
    #[error("route {route} from {path} conflicts with an existing route: {reason}")]
    Conflict {
        /// `METHOD /pattern` of the dropped route.
        route: String,
        /// Source file of the dropped route.
        path: Utf8PathBuf,
        /// The router primitive's explanation.
        reason: String,
    },

    /// A handler script raised an error while serving a request.
    #[error("handler {path} failed: {reason}")]
    HandlerCall {
        /// The script that failed.
        path: Utf8PathBuf,
        /// The script error.
        reason: String,
    },

    /// The mock root itself cannot be read.
    #[error("mock root {path} is unavailable: {source}")]
    RootUnavailable {
        /// The mock root.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A rebuild was started while another was still running.
    #[error("rebuild started while another rebuild was in progress")]
    ConcurrentRebuild,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(PathBuf),
}

impl RouteError {
    /// Creates a new [`RouteError::InvalidName`] error.
    #[inline]
    pub fn invalid_name(path: impl Into<PathBuf>, reason: NameRejection) -> Self {
        Self::InvalidName {
            path: path.into(),
            reason,
        }
    }

    /// Creates a new [`RouteError::Read`] error.
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`RouteError::InvalidHandler`] error.
    #[inline]
    pub fn invalid_handler(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidHandler {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if only one entry (or one request) is affected.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::RootUnavailable { .. } | Self::ConcurrentRebuild
        )
    }

    /// Returns `true` if the whole rebuild was abandoned but serving can go on.
    #[inline]
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::RootUnavailable { .. })
    }

    /// Returns `true` if the rebuild invariant was violated.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConcurrentRebuild)
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::InvalidName { path, .. } | Self::NonUtf8Path(path) => Some(path),
            Self::Read { path, .. }
            | Self::MalformedPayload { path, .. }
            | Self::InvalidHandler { path, .. }
            | Self::Conflict { path, .. }
            | Self::HandlerCall { path, .. }
            | Self::RootUnavailable { path, .. } => Some(path.as_std_path()),
            Self::UnreadableDirectory(err) => walk_error_path(err),
            Self::ConcurrentRebuild => None,
        }
    }

    /// Returns the path as UTF-8, if it has one and it is valid UTF-8.
    #[must_use]
    pub fn utf8_path(&self) -> Option<&Utf8Path> {
        self.path().and_then(Utf8Path::from_path)
    }
}

/// Digs the offending path out of a walker error.
fn walk_error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_name_is_recoverable() {
        let err = RouteError::invalid_name("mocks/get/..secret", NameRejection::Hidden);
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert!(!err.is_structural());
        assert!(err.to_string().contains("..secret"));
    }

    #[test]
    fn test_root_unavailable_is_structural() {
        let err = RouteError::RootUnavailable {
            path: Utf8PathBuf::from("mocks"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(!err.is_recoverable());
        assert!(err.is_structural());
        assert!(!err.is_fatal());
        assert_eq!(err.utf8_path().map(Utf8Path::as_str), Some("mocks"));
    }

    #[test]
    fn test_concurrent_rebuild_is_fatal() {
        let err = RouteError::ConcurrentRebuild;
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_walk_error_path() {
        let err = RouteError::UnreadableDirectory(ignore::Error::WithPath {
            path: PathBuf::from("mocks/get/locked"),
            err: Box::new(ignore::Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "denied",
            ))),
        });
        assert_eq!(err.path(), Some(Path::new("mocks/get/locked")));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invalid_handler_display() {
        let err = RouteError::invalid_handler("mocks/get/a.lua", "script must return a function");
        assert_eq!(
            err.to_string(),
            "invalid handler mocks/get/a.lua: script must return a function"
        );
    }
}
