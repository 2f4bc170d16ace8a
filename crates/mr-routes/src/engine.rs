//! The rebuild unit.
//!
//! [`RouteEngine::rebuild`] runs one derive, load, build and swap cycle:
//!
//! ```text
//!   mock tree ──derive──► DerivedRoute* ──load (rayon)──► RouteEntry*
//!                                                            │
//!   RouteTableHandle ◄──────swap────── RouteTable::build ◄───┘
//! ```
//!
//! The new table is fully built before the swap, so a failed or partial
//! rebuild never leaves readers looking at a half-populated table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use rayon::prelude::*;
use tracing::{error, info, warn};

use mr_core::{Config, RouteKey};

use crate::deriver::{Derivation, RouteDeriver};
use crate::error::RouteError;
use crate::loader::HandlerLoader;
use crate::table::{RouteEntry, RouteTable, RouteTableHandle, TableBuild};

/// Summary of a completed rebuild.
#[derive(Debug)]
pub struct RebuildReport {
    /// Generation of the installed table.
    pub generation: u64,
    /// Number of routes in the installed table.
    pub routes: usize,
    /// Entries left out, with the reason.
    pub skipped: Vec<RouteError>,
    /// Keys registered more than once.
    pub overridden: Vec<RouteKey>,
    /// Wall-clock time of the rebuild.
    pub duration: Duration,
}

/// Owns the route table and knows how to rebuild it from disk.
///
/// # Examples
///
/// ```no_run
/// use mr_core::Config;
/// use mr_routes::RouteEngine;
///
/// let engine = RouteEngine::new(&Config::default());
/// let report = engine.rebuild()?;
/// println!("{} routes at generation {}", report.routes, report.generation);
/// # Ok::<(), mr_routes::RouteError>(())
/// ```
#[derive(Debug)]
pub struct RouteEngine {
    deriver: RouteDeriver,
    loader: HandlerLoader,
    table: RouteTableHandle,
    rebuilding: AtomicBool,
}

impl RouteEngine {
    /// Creates an engine with an empty table.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            deriver: RouteDeriver::new(&config.mocks.root, &config.handlers)
                .with_follow_links(config.mocks.follow_links),
            loader: HandlerLoader::new(config.handlers.clone()),
            table: RouteTableHandle::default(),
            rebuilding: AtomicBool::new(false),
        }
    }

    /// Returns the mock root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.deriver.root()
    }

    /// Returns the handle readers use to get the current table.
    #[inline]
    #[must_use]
    pub fn table(&self) -> &RouteTableHandle {
        &self.table
    }

    /// Returns the number of routes in the current table.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.table.len()
    }

    /// Rebuilds the route table from the current state of the mock tree.
    ///
    /// Per-entry failures are logged and reported in
    /// [`RebuildReport::skipped`]; the rest of the tree still loads.
    ///
    /// # Errors
    ///
    /// - [`RouteError::RootUnavailable`] if the mock root cannot be read.
    ///   The previous table stays installed.
    /// - [`RouteError::ConcurrentRebuild`] if another rebuild is running.
    pub fn rebuild(&self) -> Result<RebuildReport, RouteError> {
        let _guard = RebuildGuard::acquire(&self.rebuilding)?;
        let started = Instant::now();

        let Derivation { routes, mut skipped } = self.deriver.derive().inspect_err(|err| {
            error!(root = %self.root(), error = %err, "Rebuild aborted, keeping previous routes");
        })?;

        let loaded: Vec<Result<RouteEntry, RouteError>> = routes
            .into_par_iter()
            .map(|route| {
                let responder = self.loader.load(&route)?;
                Ok(RouteEntry::new(route.key, route.source, responder))
            })
            .collect();

        let mut entries = Vec::with_capacity(loaded.len());
        for result in loaded {
            match result {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(error = %err, "Skipping route");
                    skipped.push(err);
                }
            }
        }

        let generation = self.table.generation() + 1;
        let TableBuild {
            table,
            overridden,
            conflicts,
        } = RouteTable::build(generation, entries);
        skipped.extend(conflicts);

        for entry in table.entries() {
            info!(kind = %entry.kind(), source = %entry.source(), "[{}] {}", entry.key().method, entry.key().pattern);
        }

        let routes = table.len();
        self.table.replace(table);

        let duration = started.elapsed();
        info!(
            generation,
            routes,
            skipped = skipped.len(),
            elapsed_ms = duration.as_millis(),
            "Route table swapped"
        );

        Ok(RebuildReport {
            generation,
            routes,
            skipped,
            overridden,
            duration,
        })
    }
}

/// Marks a rebuild as running until dropped.
struct RebuildGuard<'a>(&'a AtomicBool);

impl<'a> RebuildGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, RouteError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| RouteError::ConcurrentRebuild)
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockRequest, ResponseBody};
    use camino::Utf8PathBuf;
    use mr_core::{HttpMethod, SourceKind};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: Utf8PathBuf,
        engine: RouteEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("Failed to create temp directory");
            let root = Utf8PathBuf::from_path_buf(dir.path().join("mocks")).expect("Invalid path");
            fs::create_dir(&root).expect("Failed to create mock root");
            let mut config = Config::default();
            config.mocks.root = root.clone();
            let engine = RouteEngine::new(&config);
            Self {
                _dir: dir,
                root,
                engine,
            }
        }

        fn write(&self, relative: &str, contents: &str) {
            let path = self.root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create directories");
            }
            fs::write(path, contents).expect("Failed to write file");
        }

        fn listing(&self) -> String {
            self.engine
                .table()
                .snapshot()
                .describe()
                .iter()
                .map(|r| format!("{} {} {}", r.method, r.pattern, r.kind))
                .collect::<Vec<_>>()
                .join("\n")
        }

        fn get(&self, path: &str) -> Option<ResponseBody> {
            let table = self.engine.table().snapshot();
            let matched = table.lookup(HttpMethod::Get, path)?;
            let request = MockRequest::new(HttpMethod::Get, path).with_params(matched.params);
            let body = matched.entry.responder().respond(&request).expect("respond").body;
            // Compare static payloads by value; their text is checked in the loader.
            Some(match body {
                ResponseBody::RawJson(text) => {
                    ResponseBody::Json(serde_json::from_str(&text).expect("static JSON"))
                }
                other => other,
            })
        }
    }

    #[test]
    fn test_rebuild_reflects_tree() {
        let fx = Fixture::new();
        fx.write("get/users.json", r#"[{"id":1,"name":"Alice"}]"#);
        fx.write(
            "get/users/[id].lua",
            "return function(req, res) res:json({ id = req.params.id }) end",
        );
        fx.write("post/users.lua", "return function(req, res) res:status(201) end");
        fx.write("health.json", r#"{"ok":true}"#);

        let report = fx.engine.rebuild().unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.routes, 4);
        assert!(report.skipped.is_empty());

        // The `users` directory sorts before `users.json`.
        insta::assert_snapshot!(fx.listing(), @r"
        GET /users/[id] dynamic
        GET /users static
        GET /health static
        POST /users dynamic
        ");

        assert_eq!(
            fx.get("/users"),
            Some(ResponseBody::Json(json!([{"id":1,"name":"Alice"}])))
        );
        assert_eq!(
            fx.get("/users/5"),
            Some(ResponseBody::Json(json!({ "id": "5" })))
        );
    }

    #[test]
    fn test_rebuild_picks_up_changes() {
        let fx = Fixture::new();
        fx.write("get/a.json", r#""one""#);
        fx.engine.rebuild().unwrap();
        assert_eq!(fx.get("/a"), Some(ResponseBody::Json(json!("one"))));

        fx.write("get/a.json", r#""two""#);
        fx.write("get/b.json", "{}");
        let report = fx.engine.rebuild().unwrap();

        assert_eq!(report.generation, 2);
        assert_eq!(fx.engine.route_count(), 2);
        assert_eq!(fx.get("/a"), Some(ResponseBody::Json(json!("two"))));

        fs::remove_file(fx.root.join("get/b.json")).unwrap();
        fx.engine.rebuild().unwrap();
        assert_eq!(fx.get("/b"), None);
    }

    #[test]
    fn test_rebuild_of_unchanged_tree_is_identical() {
        let fx = Fixture::new();
        fx.write("get/users.json", "[]");
        fx.write("put/users/[id].lua", "return function() end");
        fx.write("delete/users/[id].json", "{}");

        fx.engine.rebuild().unwrap();
        let first = fx.engine.table().snapshot().describe();
        fx.engine.rebuild().unwrap();
        let second = fx.engine.table().snapshot().describe();

        assert_eq!(first, second);
    }

    #[test]
    fn test_bad_entries_do_not_affect_siblings() {
        let fx = Fixture::new();
        fx.write("get/broken.json", "{ nope");
        fx.write("get/empty.lua", "return nil");
        fx.write("get/..secret", "{}");
        fx.write("get/good.json", r#"{"good":true}"#);

        let report = fx.engine.rebuild().unwrap();
        assert_eq!(report.routes, 1);
        assert_eq!(report.skipped.len(), 3);
        assert!(report.skipped.iter().all(RouteError::is_recoverable));
        assert_eq!(fx.get("/good"), Some(ResponseBody::Json(json!({"good":true}))));
        assert_eq!(fx.get("/broken"), None);
    }

    #[test]
    fn test_structural_failure_keeps_previous_table() {
        let fx = Fixture::new();
        fx.write("get/users.json", "[]");
        fx.engine.rebuild().unwrap();

        fs::remove_dir_all(&fx.root).unwrap();
        let err = fx.engine.rebuild().unwrap_err();

        assert!(err.is_structural());
        assert_eq!(fx.engine.route_count(), 1);
        assert_eq!(fx.engine.table().generation(), 1);
        assert_eq!(fx.get("/users"), Some(ResponseBody::Json(json!([]))));
    }

    #[test]
    fn test_duplicate_route_later_registration_wins() {
        let fx = Fixture::new();
        // "a.json" sorts before "a.lua", so the script registers last.
        fx.write("get/a.json", r#""static""#);
        fx.write("get/a.lua", r#"return function(req, res) res:send("dynamic") end"#);

        let report = fx.engine.rebuild().unwrap();
        assert_eq!(report.routes, 1);
        assert_eq!(report.overridden.len(), 1);

        let table = fx.engine.table().snapshot();
        let hit = table.lookup(HttpMethod::Get, "/a").unwrap();
        assert_eq!(hit.entry.kind(), SourceKind::Dynamic);
        assert_eq!(fx.get("/a"), Some(ResponseBody::Text("dynamic".to_owned())));
    }

    #[test]
    fn test_concurrent_rebuild_is_refused() {
        let fx = Fixture::new();
        fx.engine.rebuilding.store(true, Ordering::SeqCst);

        let err = fx.engine.rebuild().unwrap_err();
        assert!(err.is_fatal());

        fx.engine.rebuilding.store(false, Ordering::SeqCst);
        assert!(fx.engine.rebuild().is_ok());
    }

    #[test]
    fn test_held_snapshot_survives_rebuild() {
        let fx = Fixture::new();
        fx.write("get/old.json", "1");
        fx.engine.rebuild().unwrap();
        let held = fx.engine.table().snapshot();

        fs::remove_file(fx.root.join("get/old.json")).unwrap();
        fx.write("get/new.json", "2");
        fx.engine.rebuild().unwrap();

        assert!(held.lookup(HttpMethod::Get, "/old").is_some());
        assert!(held.lookup(HttpMethod::Get, "/new").is_none());
        assert!(fx.engine.table().snapshot().lookup(HttpMethod::Get, "/new").is_some());
    }
}
