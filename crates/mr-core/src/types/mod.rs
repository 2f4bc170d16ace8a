//! Domain types for the mockroute tool.
//!
//! - [`method`] - HTTP methods recognised by the directory convention
//! - [`pattern`] - Path segments, path patterns, and route keys
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use mr_core::{HttpMethod, PathPattern, RouteKey, Segment, SourceKind};
//! ```

mod method;
mod pattern;

pub use method::{HttpMethod, ParseMethodError};
pub use pattern::{PathPattern, RouteKey, Segment, SourceKind};
