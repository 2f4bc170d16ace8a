//! File change notifications and the debounced rebuild loop.
//!
//! This crate watches the mock root with `notify` and drives rebuilds of
//! the route table from a single tokio task.
//!
//! # Overview
//!
//! - [`FileWatcher`]: Recursive `notify` subscription bridged to a bounded
//!   tokio channel, filtered by a [`ChangeFilter`]
//! - [`WatchLoop`]: The IDLE / PENDING / REBUILDING / CLOSED state machine
//!   that coalesces notices into rebuilds and never runs two at once
//! - [`WatchHandle`]: Forced rebuilds, state inspection and shutdown
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mr_core::Config;
//! use mr_routes::RouteEngine;
//! use mr_watcher::{FileWatcher, MockTreeFilter, WatchLoop};
//!
//! # async fn example() -> Result<(), mr_watcher::WatchError> {
//! let config = Config::default();
//! let engine = Arc::new(RouteEngine::new(&config));
//!
//! let watcher = FileWatcher::new(&config.mocks.root, &config.watch, MockTreeFilter).await?;
//! let watch = WatchLoop::spawn(Arc::clone(&engine), watcher, config.watch.debounce());
//!
//! // Initial table, without waiting for a change.
//! watch.handle().force_rebuild().await?;
//!
//! // ... serve requests from engine.table() ...
//!
//! watch.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! ```
//! use mr_watcher::WatchError;
//!
//! fn report(err: &WatchError) -> &'static str {
//!     if err.is_fatal() { "stop watching" } else { "keep serving" }
//! }
//!
//! assert_eq!(report(&WatchError::ChannelClosed), "stop watching");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod watch_loop;
pub mod watcher;

pub use error::WatchError;
pub use events::{ChangeKind, ChangeNotice};
pub use filter::{AcceptAllFilter, ChangeFilter, MockTreeFilter};
pub use watch_loop::{ChangeSource, LoopState, NoChanges, Rebuild, WatchHandle, WatchLoop};
pub use watcher::FileWatcher;
