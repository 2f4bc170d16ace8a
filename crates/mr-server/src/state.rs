//! Shared application state for the dispatch front.
//!
//! [`AppState`] gives every request access to the route engine (and
//! through it the current table snapshot) and to the watch loop that owns
//! rebuilds. Requests never hold a lock across a rebuild: they take a
//! snapshot and work from it.

use std::sync::Arc;

use mr_routes::{RebuildReport, RouteEngine, RouteTable};
use mr_watcher::{LoopState, WatchHandle};

/// State shared by all handlers.
#[derive(Debug)]
pub struct AppState {
    engine: Arc<RouteEngine>,
    watch: WatchHandle<RouteEngine>,
    prefix: String,
}

impl AppState {
    /// Creates the state for `engine`, whose rebuilds go through `watch`.
    ///
    /// `prefix` is the path under which the introspection routes are
    /// mounted, as accepted by `Config::validate`. Trailing slashes are
    /// dropped.
    #[must_use]
    pub fn new(engine: Arc<RouteEngine>, watch: WatchHandle<RouteEngine>, prefix: &str) -> Self {
        Self {
            engine,
            watch,
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Returns the current table snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.engine.table().snapshot()
    }

    /// Returns the number of routes currently served.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.engine.route_count()
    }

    /// Returns the introspection prefix, without a trailing slash.
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the watch loop state.
    #[must_use]
    pub fn loop_state(&self) -> LoopState {
        self.watch.state()
    }

    /// Rebuilds through the watch loop and waits for the result.
    pub async fn force_rebuild(&self) -> Result<RebuildReport, mr_watcher::WatchError> {
        self.watch.force_rebuild().await
    }
}

/// The state type handlers extract.
pub type SharedState = Arc<AppState>;
