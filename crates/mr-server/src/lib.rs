//! HTTP dispatch front for mockroute.
//!
//! Serves the live route table over axum. Fixed introspection routes
//! live under a configurable prefix; everything else falls through to
//! [`dispatch::dispatch`], which matches against the current snapshot.
//!
//! # Architecture
//!
//! ```text
//!  request ──► Router ──► {prefix}/routes | /health | /rebuild
//!                 │
//!                 └─fallback─► dispatch ──► RouteTableHandle::snapshot
//!                                               │
//!                                 static ◄──────┴──────► dynamic (spawn_blocking)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mr_core::Config;
//! use mr_routes::RouteEngine;
//! use mr_server::{AppState, start_server};
//! use mr_watcher::{NoChanges, WatchLoop};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let engine = Arc::new(RouteEngine::new(&config));
//! let watch = WatchLoop::spawn(Arc::clone(&engine), NoChanges, config.watch.debounce());
//! watch.handle().force_rebuild().await?;
//!
//! let state = Arc::new(AppState::new(engine, watch.handle(), &config.server.introspection_prefix));
//! start_server(&config.server, state).await?;
//! watch.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::{DispatchError, ServerError};
pub use router::build_router;
pub use server::{serve, shutdown_signal, start_server};
pub use state::{AppState, SharedState};
