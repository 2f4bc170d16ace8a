//! Route derivation, handler loading, and the swappable route table.
//!
//! This crate turns a mock directory tree into a table of HTTP routes and
//! keeps that table current without ever exposing a half-built state.
//!
//! # Overview
//!
//! The main entry point is [`RouteEngine`], which combines:
//!
//! - [`RouteDeriver`]: Depth-first walk of the mock root (`ignore` crate),
//!   mapping each file to a `(method, pattern)` key
//! - [`HandlerLoader`]: Parses static JSON payloads and evaluates Lua
//!   handler scripts, in parallel with rayon
//! - [`RouteTable`]: An immutable snapshot compiled into one `matchit`
//!   router per method
//! - [`RouteTableHandle`]: The shared pointer readers snapshot and the
//!   rebuild swaps
//!
//! # Example
//!
//! ```no_run
//! use mr_core::{Config, HttpMethod};
//! use mr_routes::{MockRequest, RouteEngine};
//!
//! let engine = RouteEngine::new(&Config::default());
//! engine.rebuild()?;
//!
//! let table = engine.table().snapshot();
//! if let Some(hit) = table.lookup(HttpMethod::Get, "/users/42") {
//!     let request = MockRequest::new(HttpMethod::Get, "/users/42").with_params(hit.params);
//!     let response = hit.entry.responder().respond(&request)?;
//!     println!("{}", response.status);
//! }
//! # Ok::<(), mr_routes::RouteError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! RouteEngine::rebuild
//!     │
//!     ├── RouteDeriver::derive ──► Derivation { routes, skipped }
//!     │
//!     ├── HandlerLoader::load (rayon, one Lua state per script)
//!     │
//!     ├── RouteTable::build (last registration wins, matchit compile)
//!     │
//!     └── RouteTableHandle::replace (single pointer swap)
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod deriver;
mod engine;
mod error;
mod exchange;
mod loader;
mod naming;
mod script;
mod table;

pub use deriver::{Derivation, DerivedRoute, RouteDeriver};
pub use engine::{RebuildReport, RouteEngine};
pub use error::RouteError;
pub use exchange::{MockRequest, MockResponse, ResponseBody};
pub use loader::{HandlerLoader, Responder};
pub use naming::{NameRejection, check_entry_name};
pub use script::ScriptHandler;
pub use table::{RouteEntry, RouteMatch, RouteSummary, RouteTable, RouteTableHandle, TableBuild};
