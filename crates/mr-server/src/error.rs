//! Error types for the dispatch front.
//!
//! [`DispatchError`] covers everything that can go wrong answering one
//! request and renders as a JSON `{ "error", "status" }` body.
//! [`ServerError`] covers the listener itself.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use mr_routes::RouteError;
use mr_watcher::WatchError;

/// Errors answering a single request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No route matches the method and path.
    #[error("no route for {method} {path}")]
    NotFound {
        /// The request method as sent.
        method: String,
        /// The request path.
        path: String,
    },

    /// The query string could not be decoded.
    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    /// A handler script failed.
    #[error(transparent)]
    Handler(#[from] RouteError),

    /// A forced rebuild failed.
    #[error(transparent)]
    Rebuild(#[from] WatchError),

    /// The blocking task running a handler did not complete.
    #[error("handler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DispatchError {
    /// Creates a [`DispatchError::NotFound`].
    #[inline]
    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Returns the HTTP status this error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Rebuild(err) if !err.is_fatal() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Handler(_) | Self::Rebuild(_) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

/// Errors starting or running the listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn test_not_found_status() {
        let err = DispatchError::not_found("GET", "/nope");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "no route for GET /nope");
    }

    #[test]
    fn test_handler_failure_is_server_error() {
        let err = DispatchError::from(RouteError::HandlerCall {
            path: Utf8PathBuf::from("mocks/post/users.lua"),
            reason: "boom".to_owned(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_rebuild_status_depends_on_fatality() {
        assert_eq!(
            DispatchError::from(WatchError::ChannelClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let root_gone = RouteError::RootUnavailable {
            path: Utf8PathBuf::from("mocks"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(
            DispatchError::from(WatchError::Rebuild(Box::new(root_gone))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
