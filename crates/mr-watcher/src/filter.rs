//! Filters applied to change notices before they reach the watch loop.

use camino::Utf8Path;

/// Decides which changed paths are worth a rebuild.
///
/// Filters run on the notify thread, so they must be [`Send`], [`Sync`]
/// and `'static`.
///
/// # Examples
///
/// ```
/// use mr_watcher::ChangeFilter;
/// use camino::Utf8Path;
///
/// struct JsonOnly;
///
/// impl ChangeFilter for JsonOnly {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.extension() == Some("json")
///     }
/// }
///
/// assert!(JsonOnly.should_process(Utf8Path::new("mocks/get/users.json")));
/// ```
pub trait ChangeFilter: Send + Sync + 'static {
    /// Returns `true` if a change to `path` should be forwarded.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// Forwards every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl ChangeFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Drops editor scratch files that can never become routes.
///
/// Hidden names (`.users.json.swp`, `.#users.json`), backup files
/// (`users.json~`) and swap or temp extensions are ignored. Everything
/// else, directories included, is forwarded.
///
/// # Examples
///
/// ```
/// use mr_watcher::{ChangeFilter, MockTreeFilter};
/// use camino::Utf8Path;
///
/// let filter = MockTreeFilter;
/// assert!(filter.should_process(Utf8Path::new("mocks/get/users.json")));
/// assert!(filter.should_process(Utf8Path::new("mocks/post")));
/// assert!(!filter.should_process(Utf8Path::new("mocks/get/.users.json.swp")));
/// assert!(!filter.should_process(Utf8Path::new("mocks/get/users.json~")));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTreeFilter;

/// Extensions editors use for swap and scratch files.
const SCRATCH_EXTENSIONS: &[&str] = &["swp", "swx", "tmp"];

impl ChangeFilter for MockTreeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        let Some(name) = path.file_name() else {
            return true;
        };
        if name.starts_with('.') || name.ends_with('~') {
            return false;
        }
        !path
            .extension()
            .is_some_and(|ext| SCRATCH_EXTENSIONS.contains(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all() {
        assert!(AcceptAllFilter.should_process(Utf8Path::new(".hidden")));
    }

    #[test]
    fn test_mock_tree_filter() {
        let filter = MockTreeFilter;
        assert!(filter.should_process(Utf8Path::new("mocks/get/users/[id].lua")));
        assert!(filter.should_process(Utf8Path::new("mocks/delete")));
        assert!(!filter.should_process(Utf8Path::new("mocks/get/.#users.json")));
        assert!(!filter.should_process(Utf8Path::new("mocks/get/users.json.tmp")));
        assert!(!filter.should_process(Utf8Path::new("mocks/get/users.swx")));
    }
}
