//! Route derivation from the mock directory tree.
//!
//! This module provides [`RouteDeriver`], which uses the `ignore` crate to
//! walk the mock root depth-first and turn every supported file into a
//! [`DerivedRoute`].
//!
//! # Directory Convention
//!
//! ```text
//! mocks/
//! ├── get/                 method context = GET, path reset to /
//! │   ├── users.json       GET  /users          (static)
//! │   ├── users/
//! │   │   └── [id].lua     GET  /users/[id]     (dynamic)
//! │   └── orders/
//! │       └── post/        method context = POST, path reset to /
//! │           └── items.json  POST /items
//! └── health.json          GET  /health         (no method directory)
//! ```
//!
//! Siblings are visited in byte-wise file-name order, which fixes the
//! registration order and therefore which of two duplicate routes wins.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use mr_core::{HandlerConfig, HttpMethod, PathPattern, RouteKey, Segment, SourceKind};

use crate::error::RouteError;
use crate::naming::check_entry_name;

/// Extension of static payload files.
const STATIC_EXTENSION: &str = "json";

/// One route produced by a derivation pass, not yet loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRoute {
    /// Method and path pattern.
    pub key: RouteKey,
    /// Absolute (root-joined) path of the source file.
    pub source: Utf8PathBuf,
    /// Whether the source is a payload or a script.
    pub kind: SourceKind,
}

/// The outcome of one derivation pass.
#[derive(Debug, Default)]
pub struct Derivation {
    /// Routes in registration order.
    pub routes: Vec<DerivedRoute>,
    /// Entries that were skipped, with the reason.
    pub skipped: Vec<RouteError>,
}

/// Walks a mock root and derives the route list.
///
/// # Examples
///
/// ```no_run
/// use mr_routes::RouteDeriver;
/// use mr_core::HandlerConfig;
/// use camino::Utf8Path;
///
/// let deriver = RouteDeriver::new(Utf8Path::new("./mocks"), &HandlerConfig::default());
/// let derivation = deriver.derive()?;
/// for route in &derivation.routes {
///     println!("{} <- {}", route.key, route.source);
/// }
/// # Ok::<(), mr_routes::RouteError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RouteDeriver {
    /// The mock root.
    root: Utf8PathBuf,
    /// Extension (without the dot) of handler scripts.
    script_extension: String,
    /// Whether to follow symbolic links.
    follow_links: bool,
}

impl RouteDeriver {
    /// Creates a deriver for the given mock root.
    #[must_use]
    pub fn new(root: &Utf8Path, handlers: &HandlerConfig) -> Self {
        Self {
            root: root.to_owned(),
            script_extension: handlers.script_extension.clone(),
            follow_links: false,
        }
    }

    /// Configures whether to follow symbolic links.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Returns the mock root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Performs one full derivation pass.
    ///
    /// Invalid names, unreadable subdirectories and unsupported files are
    /// skipped without affecting their siblings.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::RootUnavailable`] if the root itself cannot
    /// be listed.
    pub fn derive(&self) -> Result<Derivation, RouteError> {
        if let Err(source) = std::fs::read_dir(&self.root) {
            return Err(RouteError::RootUnavailable {
                path: self.root.clone(),
                source,
            });
        }

        let rejected = Arc::new(Mutex::new(Vec::new()));
        let mut derivation = Derivation::default();

        for result in self.build_walker(Arc::clone(&rejected)) {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "Skipping unreadable directory");
                    derivation.skipped.push(RouteError::UnreadableDirectory(err));
                    continue;
                }
            };

            if entry.depth() == 0 || !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                warn!(path = %entry.path().display(), "Skipping non-UTF-8 path");
                derivation
                    .skipped
                    .push(RouteError::NonUtf8Path(entry.path().to_owned()));
                continue;
            };

            if let Some(route) = self.route_for(path) {
                trace!(route = %route.key, source = %route.source, "Derived route");
                derivation.routes.push(route);
            }
        }

        let mut rejected = std::mem::take(&mut *rejected.lock());
        rejected.append(&mut derivation.skipped);
        derivation.skipped = rejected;

        debug!(
            root = %self.root,
            routes = derivation.routes.len(),
            skipped = derivation.skipped.len(),
            "Derivation complete"
        );
        Ok(derivation)
    }

    /// Builds the ignore walker with configured settings.
    ///
    /// Invalid names are pruned in `filter_entry`, so an invalid directory
    /// takes its whole subtree with it.
    fn build_walker(&self, rejected: Arc<Mutex<Vec<RouteError>>>) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            // Hidden entries are rejected by name validation, with a warning
            .standard_filters(false)
            .follow_links(self.follow_links)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Some(name) = entry.file_name().to_str() else {
                    warn!(path = %entry.path().display(), "Ignoring non-UTF-8 name");
                    rejected
                        .lock()
                        .push(RouteError::NonUtf8Path(entry.path().to_owned()));
                    return false;
                };
                match check_entry_name(name) {
                    Ok(()) => true,
                    Err(reason) => {
                        warn!(
                            path = %entry.path().display(),
                            %reason,
                            "Ignoring invalid file or folder name"
                        );
                        rejected
                            .lock()
                            .push(RouteError::invalid_name(entry.path(), reason));
                        false
                    }
                }
            })
            .build()
    }

    /// Maps a file below the root to its route, if it has a supported
    /// extension.
    fn route_for(&self, path: &Utf8Path) -> Option<DerivedRoute> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut components: Vec<&str> = relative.components().map(|c| c.as_str()).collect();
        let file_name = components.pop()?;

        let Some((stem, kind)) = self.classify(file_name) else {
            trace!(path = %path, "Ignoring file with unsupported extension");
            return None;
        };

        let mut method = HttpMethod::Get;
        let mut pattern = PathPattern::new();
        for dir in components {
            if let Some(context) = HttpMethod::from_dir_name(dir) {
                method = context;
                pattern = PathPattern::new();
            } else {
                pattern.push(Segment::from_name(dir));
            }
        }
        pattern.push(Segment::from_name(stem));

        Some(DerivedRoute {
            key: RouteKey::new(method, pattern),
            source: path.to_owned(),
            kind,
        })
    }

    /// Splits a file name into its stem and source kind.
    fn classify<'a>(&self, file_name: &'a str) -> Option<(&'a str, SourceKind)> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        if ext == STATIC_EXTENSION {
            Some((stem, SourceKind::Static))
        } else if ext == self.script_extension {
            Some((stem, SourceKind::Dynamic))
        } else {
            None
        }
    }
}
