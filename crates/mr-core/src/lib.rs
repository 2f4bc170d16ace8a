//! Core types, configuration, and errors for the mockroute tool.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - Domain types ([`HttpMethod`], [`Segment`], [`PathPattern`], [`RouteKey`], [`SourceKind`])
//! - Configuration structures ([`Config`] and its sections)
//! - The [`ConfigError`] type for configuration loading and validation
//!
//! # Crate Dependencies
//!
//! ```text
//! mr-cli ──► mr-server ──► mr-routes ──► mr-core
//!                │              ▲
//!                └──► mr-watcher┘
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, DEFAULT_PORT, HandlerConfig, MocksConfig, ServerConfig, WatchConfig};
pub use error::ConfigError;
pub use types::{HttpMethod, ParseMethodError, PathPattern, RouteKey, Segment, SourceKind};
