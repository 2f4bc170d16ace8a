//! Entry name validation.
//!
//! Every directory and file name in the mock tree becomes part of a URL, so
//! only a conservative token alphabet is accepted: ASCII letters, digits,
//! `_`, `-` and `.`. The one exception is a parameter segment written as
//! `[identifier]`, optionally followed by a file extension.

use std::fmt;

use mr_core::Segment;

/// Why an entry name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRejection {
    /// The name is empty.
    Empty,
    /// The name starts with `.`.
    Hidden,
    /// The name contains `..`.
    Traversal,
    /// The name contains `/` or `\`.
    Separator,
    /// The name contains characters outside the token alphabet.
    InvalidCharacters,
}

impl fmt::Display for NameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "name is empty",
            Self::Hidden => "name starts with '.'",
            Self::Traversal => "name contains '..'",
            Self::Separator => "name contains a path separator",
            Self::InvalidCharacters => "name contains characters outside [A-Za-z0-9_.-]",
        })
    }
}

/// Checks a single directory or file name.
///
/// # Examples
///
/// ```
/// use mr_routes::{check_entry_name, NameRejection};
///
/// assert!(check_entry_name("users.json").is_ok());
/// assert!(check_entry_name("[id].lua").is_ok());
/// assert_eq!(check_entry_name("..secret"), Err(NameRejection::Hidden));
/// assert_eq!(check_entry_name("a..b"), Err(NameRejection::Traversal));
/// ```
pub fn check_entry_name(name: &str) -> Result<(), NameRejection> {
    if name.is_empty() {
        return Err(NameRejection::Empty);
    }
    if name.starts_with('.') {
        return Err(NameRejection::Hidden);
    }
    if name.contains("..") {
        return Err(NameRejection::Traversal);
    }
    if name.contains(['/', '\\']) {
        return Err(NameRejection::Separator);
    }
    if name.chars().all(is_token_char) || is_param_name(name) {
        Ok(())
    } else {
        Err(NameRejection::InvalidCharacters)
    }
}

#[inline]
const fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// `[identifier]` with an optional `.ext` tail.
fn is_param_name(name: &str) -> bool {
    let Some(close) = name.find(']') else {
        return false;
    };
    let (head, tail) = name.split_at(close + 1);
    Segment::param_name(head).is_some()
        && (tail.is_empty() || (tail.starts_with('.') && tail.chars().all(is_token_char)))
}
