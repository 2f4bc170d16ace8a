//! The route table and its atomically swappable handle.
//!
//! A [`RouteTable`] is an immutable snapshot: once built it never changes.
//! Live reload works by building a complete new table off to the side and
//! then replacing the pointer held by a [`RouteTableHandle`]. Readers clone
//! the current `Arc` and keep using it for the rest of their request, so a
//! request is always served entirely by one generation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::warn;

use mr_core::{HttpMethod, RouteKey, SourceKind};

use crate::error::RouteError;
use crate::loader::Responder;

/// A registered route: key, source file and responder.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    key: RouteKey,
    source: Utf8PathBuf,
    responder: Responder,
}

impl RouteEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(key: RouteKey, source: Utf8PathBuf, responder: Responder) -> Self {
        Self {
            key,
            source,
            responder,
        }
    }

    /// Returns the route key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    /// Returns the source file.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Returns the responder.
    #[inline]
    #[must_use]
    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Returns the source kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.responder.kind()
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'t> {
    /// The matched entry.
    pub entry: &'t RouteEntry,
    /// Named path parameters.
    pub params: BTreeMap<String, String>,
}

/// One line of a route listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The pattern in on-disk spelling (`/users/[id]`).
    pub pattern: String,
    /// Static or dynamic.
    pub kind: SourceKind,
    /// The source file.
    pub source: Utf8PathBuf,
}

/// The result of [`RouteTable::build`].
#[derive(Debug)]
pub struct TableBuild {
    /// The new table.
    pub table: RouteTable,
    /// Keys registered more than once; the last registration was kept.
    pub overridden: Vec<RouteKey>,
    /// Entries the path matcher refused, which were left out.
    pub conflicts: Vec<RouteError>,
}

/// An immutable mapping from `(method, pattern)` to a responder.
pub struct RouteTable {
    generation: u64,
    entries: Vec<RouteEntry>,
    routers: FxHashMap<HttpMethod, matchit::Router<usize>>,
}

impl RouteTable {
    /// An empty table at generation 0.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            generation: 0,
            entries: Vec::new(),
            routers: FxHashMap::default(),
        }
    }

    /// Builds a table from entries in registration order.
    ///
    /// When two entries share a key the later one replaces the earlier one
    /// in place. The surviving patterns are then compiled into one matcher
    /// per method; a pattern the matcher refuses is dropped and reported.
    #[must_use]
    pub fn build(generation: u64, entries: impl IntoIterator<Item = RouteEntry>) -> TableBuild {
        let mut slots: Vec<RouteEntry> = Vec::new();
        let mut index: FxHashMap<RouteKey, usize> = FxHashMap::default();
        let mut overridden = Vec::new();

        for entry in entries {
            if let Some(&slot) = index.get(&entry.key) {
                warn!(
                    route = %entry.key,
                    previous = %slots[slot].source,
                    source = %entry.source,
                    "Duplicate route, later registration wins"
                );
                overridden.push(entry.key.clone());
                slots[slot] = entry;
            } else {
                index.insert(entry.key.clone(), slots.len());
                slots.push(entry);
            }
        }

        let mut routers: FxHashMap<HttpMethod, matchit::Router<usize>> = FxHashMap::default();
        let mut kept = Vec::with_capacity(slots.len());
        let mut conflicts = Vec::new();

        for entry in slots {
            let router = routers.entry(entry.key.method).or_default();
            match router.insert(entry.key.pattern.to_router_path(), kept.len()) {
                Ok(()) => kept.push(entry),
                Err(err) => {
                    warn!(
                        route = %entry.key,
                        source = %entry.source,
                        error = %err,
                        "Dropping route that conflicts with an existing pattern"
                    );
                    conflicts.push(RouteError::Conflict {
                        route: entry.key.to_string(),
                        path: entry.source,
                        reason: err.to_string(),
                    });
                }
            }
        }

        TableBuild {
            table: Self {
                generation,
                entries: kept,
                routers,
            },
            overridden,
            conflicts,
        }
    }

    /// Finds the entry serving `method` and `path`.
    ///
    /// A single trailing slash is ignored, so `/users/` matches `/users`.
    /// Parameter values are percent-decoded; a value that does not decode
    /// to UTF-8 is passed on as written.
    #[must_use]
    pub fn lookup(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        let router = self.routers.get(&method)?;
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path,
        };
        let matched = router.at(path).ok()?;
        let entry = self.entries.get(*matched.value)?;
        let params = matched
            .params
            .iter()
            .map(|(name, value)| {
                let value = urlencoding::decode(value)
                    .map_or_else(|_| value.to_owned(), std::borrow::Cow::into_owned);
                (name.to_owned(), value)
            })
            .collect();
        Some(RouteMatch { entry, params })
    }

    /// Returns the generation this table was built for.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of routes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no routes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries in registration order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Lists the routes in registration order.
    #[must_use]
    pub fn describe(&self) -> Vec<RouteSummary> {
        self.entries
            .iter()
            .map(|entry| RouteSummary {
                method: entry.key.method,
                pattern: entry.key.pattern.to_string(),
                kind: entry.kind(),
                source: entry.source.clone(),
            })
            .collect()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("generation", &self.generation)
            .field("routes", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Shared, swappable reference to the current [`RouteTable`].
///
/// Cloning the handle is cheap; all clones see the same table.
///
/// # Examples
///
/// ```
/// use mr_routes::{RouteTable, RouteTableHandle};
///
/// let handle = RouteTableHandle::default();
/// let before = handle.snapshot();
///
/// handle.replace(RouteTable::build(1, Vec::new()).table);
///
/// assert_eq!(before.generation(), 0);
/// assert_eq!(handle.generation(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTableHandle {
    current: Arc<RwLock<Arc<RouteTable>>>,
}

impl RouteTableHandle {
    /// Creates a handle holding `table`.
    #[must_use]
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    /// Returns the current table.
    ///
    /// The snapshot stays valid (and unchanged) however many swaps happen
    /// while it is held.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RouteTable> {
        Arc::clone(&self.current.read())
    }

    /// Installs `table` as the current table and returns the previous one.
    pub fn replace(&self, table: RouteTable) -> Arc<RouteTable> {
        let next = Arc::new(table);
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Returns the number of routes in the current table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Returns `true` if the current table has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Returns the generation of the current table.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_core::PathPattern;
    use serde_json::json;

    fn static_entry(method: HttpMethod, names: &[&str], payload: serde_json::Value) -> RouteEntry {
        let pattern = PathPattern::from_names(names);
        let source = Utf8PathBuf::from(format!("mocks/{}{}.json", method.dir_name(), pattern));
        RouteEntry::new(
            RouteKey::new(method, pattern),
            source,
            Responder::Static(Arc::from(payload.to_string())),
        )
    }

    fn payload_of(entry: &RouteEntry) -> serde_json::Value {
        match entry.responder() {
            Responder::Static(payload) => serde_json::from_str(payload).unwrap(),
            Responder::Dynamic(_) => serde_json::Value::Null,
        }
    }

    #[test]
    fn test_lookup_literal_and_param() {
        let build = RouteTable::build(
            1,
            vec![
                static_entry(HttpMethod::Get, &["users"], json!("list")),
                static_entry(HttpMethod::Get, &["users", "[id]"], json!("one")),
            ],
        );
        assert!(build.overridden.is_empty());
        assert!(build.conflicts.is_empty());
        let table = build.table;

        let list = table.lookup(HttpMethod::Get, "/users").unwrap();
        assert_eq!(payload_of(list.entry), json!("list"));
        assert!(list.params.is_empty());

        let one = table.lookup(HttpMethod::Get, "/users/42").unwrap();
        assert_eq!(payload_of(one.entry), json!("one"));
        assert_eq!(one.params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_lookup_decodes_params() {
        let table = RouteTable::build(
            1,
            vec![static_entry(HttpMethod::Get, &["users", "[id]"], json!({}))],
        )
        .table;

        let hit = table.lookup(HttpMethod::Get, "/users/a%20b").unwrap();
        assert_eq!(hit.params.get("id").map(String::as_str), Some("a b"));

        let hit = table.lookup(HttpMethod::Get, "/users/%FF").unwrap();
        assert_eq!(hit.params.get("id").map(String::as_str), Some("%FF"));
    }

    #[test]
    fn test_lookup_is_method_specific() {
        let table = RouteTable::build(
            1,
            vec![static_entry(HttpMethod::Post, &["users"], json!({}))],
        )
        .table;
        assert!(table.lookup(HttpMethod::Post, "/users").is_some());
        assert!(table.lookup(HttpMethod::Get, "/users").is_none());
        assert!(table.lookup(HttpMethod::Post, "/orders").is_none());
    }

    #[test]
    fn test_lookup_ignores_trailing_slash() {
        let table = RouteTable::build(
            1,
            vec![static_entry(HttpMethod::Get, &["users"], json!([]))],
        )
        .table;
        assert!(table.lookup(HttpMethod::Get, "/users/").is_some());
        assert!(table.lookup(HttpMethod::Get, "/").is_none());
    }

    #[test]
    fn test_duplicate_key_later_registration_wins() {
        let build = RouteTable::build(
            3,
            vec![
                static_entry(HttpMethod::Get, &["a"], json!("first")),
                static_entry(HttpMethod::Get, &["b"], json!("b")),
                static_entry(HttpMethod::Get, &["a"], json!("second")),
            ],
        );
        assert_eq!(build.overridden.len(), 1);
        let table = build.table;
        assert_eq!(table.len(), 2);
        assert_eq!(table.generation(), 3);

        let hit = table.lookup(HttpMethod::Get, "/a").unwrap();
        assert_eq!(payload_of(hit.entry), json!("second"));
        assert_eq!(
            table.describe().iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>(),
            vec!["/a", "/b"]
        );
    }

    #[test]
    fn test_conflicting_param_names_are_dropped() {
        let build = RouteTable::build(
            1,
            vec![
                static_entry(HttpMethod::Get, &["users", "[id]"], json!("id")),
                static_entry(HttpMethod::Get, &["users", "[uid]"], json!("uid")),
            ],
        );
        assert_eq!(build.conflicts.len(), 1);
        assert!(matches!(build.conflicts[0], RouteError::Conflict { .. }));

        let table = build.table;
        assert_eq!(table.len(), 1);
        let hit = table.lookup(HttpMethod::Get, "/users/9").unwrap();
        assert_eq!(payload_of(hit.entry), json!("id"));
    }

    #[test]
    fn test_describe_serializes() {
        let table = RouteTable::build(
            1,
            vec![static_entry(HttpMethod::Delete, &["users", "[id]"], json!({}))],
        )
        .table;
        let listing = serde_json::to_value(table.describe()).unwrap();
        assert_eq!(
            listing,
            json!([{
                "method": "DELETE",
                "pattern": "/users/[id]",
                "kind": "static",
                "source": "mocks/delete/users/[id].json"
            }])
        );
    }

    #[test]
    fn test_handle_replace_keeps_old_snapshot_alive() {
        let handle = RouteTableHandle::new(
            RouteTable::build(1, vec![static_entry(HttpMethod::Get, &["old"], json!(1))]).table,
        );
        let held = handle.snapshot();

        let previous = handle.replace(
            RouteTable::build(2, vec![static_entry(HttpMethod::Get, &["new"], json!(2))]).table,
        );

        assert_eq!(previous.generation(), 1);
        assert!(held.lookup(HttpMethod::Get, "/old").is_some());
        assert!(held.lookup(HttpMethod::Get, "/new").is_none());
        assert_eq!(handle.generation(), 2);
        assert_eq!(handle.len(), 1);
        assert!(handle.snapshot().lookup(HttpMethod::Get, "/new").is_some());
    }

    #[test]
    fn test_readers_never_observe_a_mixed_table() {
        fn table(generation: u64) -> RouteTable {
            let marker = json!(generation);
            RouteTable::build(
                generation,
                ["a", "b", "c", "d"]
                    .into_iter()
                    .map(|name| static_entry(HttpMethod::Get, &[name], marker.clone())),
            )
            .table
        }

        let handle = RouteTableHandle::new(table(0));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let handle = handle.clone();
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = handle.snapshot();
                        let expected = json!(snapshot.generation());
                        for entry in snapshot.entries() {
                            assert_eq!(payload_of(entry), expected);
                        }
                    }
                });
            }

            for generation in 1..=200 {
                handle.replace(table(generation));
            }
        });

        assert_eq!(handle.generation(), 200);
    }
}
