//! Change notices emitted by the file watcher.
//!
//! The watch loop only cares that *something* changed, but notices carry
//! the path and kind for logging.

use std::fmt;

use camino::Utf8PathBuf;
use notify::EventKind;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A file or directory was created.
    Created,
    /// A file's contents or metadata changed, or it was renamed.
    Modified,
    /// A file or directory was removed.
    Removed,
}

impl ChangeKind {
    /// Maps a notify event kind, ignoring pure access events.
    ///
    /// # Examples
    ///
    /// ```
    /// use mr_watcher::ChangeKind;
    /// use notify::event::{AccessKind, CreateKind, EventKind};
    ///
    /// assert_eq!(
    ///     ChangeKind::from_event_kind(&EventKind::Create(CreateKind::File)),
    ///     Some(ChangeKind::Created)
    /// );
    /// assert_eq!(ChangeKind::from_event_kind(&EventKind::Access(AccessKind::Any)), None);
    /// ```
    #[must_use]
    pub const fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) | EventKind::Any => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Removed),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        })
    }
}

/// A single change under the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// The path that changed.
    pub path: Utf8PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
}

impl ChangeNotice {
    /// Creates a notice.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the final path component, if any.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }
}
