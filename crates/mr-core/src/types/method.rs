//! HTTP method types.
//!
//! This module provides the [`HttpMethod`] enum. The directory convention
//! only knows four methods; a directory named after one of them (in any
//! letter case) sets the method context for everything beneath it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An HTTP method that a mock route can be registered under.
///
/// # Examples
///
/// ```
/// use mr_core::HttpMethod;
///
/// assert_eq!(HttpMethod::from_dir_name("Post"), Some(HttpMethod::Post));
/// assert_eq!(HttpMethod::from_dir_name("users"), None);
/// assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`, also the method used when no method directory encloses a file.
    #[default]
    Get,
    /// `POST`.
    Post,
    /// `PUT`.
    Put,
    /// `DELETE`.
    Delete,
}

impl HttpMethod {
    /// All methods, in declaration order.
    pub const ALL: [Self; 4] = [Self::Get, Self::Post, Self::Put, Self::Delete];

    /// Returns the method named by a directory, if any.
    ///
    /// Matching is case-insensitive: `get`, `GET` and `Get` all select
    /// [`HttpMethod::Get`].
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.dir_name().eq_ignore_ascii_case(name))
    }

    /// Returns the upper-case wire name (`"GET"`).
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns the lower-case directory name (`"get"`).
    #[inline]
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a supported method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseMethodError(pub String);

impl FromStr for HttpMethod {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dir_name(s).ok_or_else(|| ParseMethodError(s.to_owned()))
    }
}
