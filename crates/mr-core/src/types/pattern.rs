//! Path patterns and route keys.
//!
//! A [`PathPattern`] is the ordered list of URL segments derived from a
//! file's position in the mock tree. A segment written as `[name]` is a
//! named parameter; everything else is a literal. The pattern is kept in
//! its on-disk spelling (`/users/[id]`) and translated to the router
//! primitive's syntax (`/users/{id}`) only when a dispatch table is
//! compiled.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;

use super::method::HttpMethod;

/// One segment of a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A literal segment matched verbatim.
    Literal(String),
    /// A named parameter (`[id]` on disk).
    Param(String),
}

impl Segment {
    /// Builds a segment from a directory name or file stem.
    ///
    /// `[name]` becomes [`Segment::Param`] when `name` is an identifier;
    /// anything else is taken literally.
    ///
    /// # Examples
    ///
    /// ```
    /// use mr_core::Segment;
    ///
    /// assert_eq!(Segment::from_name("[id]"), Segment::Param("id".to_owned()));
    /// assert_eq!(Segment::from_name("users"), Segment::Literal("users".to_owned()));
    /// assert_eq!(Segment::from_name("[1x]"), Segment::Literal("[1x]".to_owned()));
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match Self::param_name(name) {
            Some(param) => Self::Param(param.to_owned()),
            None => Self::Literal(name.to_owned()),
        }
    }

    /// Returns the parameter name if `name` is written as `[identifier]`.
    #[must_use]
    pub fn param_name(name: &str) -> Option<&str> {
        let inner = name.strip_prefix('[')?.strip_suffix(']')?;
        is_identifier(inner).then_some(inner)
    }

    /// Returns `true` for [`Segment::Param`].
    #[inline]
    #[must_use]
    pub const fn is_param(&self) -> bool {
        matches!(self, Self::Param(_))
    }

    /// Returns the segment text without brackets.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) | Self::Param(s) => s,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::Param(s) => write!(f, "[{s}]"),
        }
    }
}

/// Returns `true` if `s` is `[A-Za-z_][A-Za-z0-9_]*`.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An ordered sequence of path segments.
///
/// # Examples
///
/// ```
/// use mr_core::{PathPattern, Segment};
///
/// let pattern = PathPattern::from_names(["users", "[id]"]);
/// assert_eq!(pattern.to_string(), "/users/[id]");
/// assert_eq!(pattern.to_router_path(), "/users/{id}");
/// assert_eq!(pattern.params().collect::<Vec<_>>(), vec!["id"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathPattern {
    segments: SmallVec<[Segment; 4]>,
}

impl PathPattern {
    /// Creates an empty pattern (the root path `/`).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pattern from raw on-disk names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            segments: names
                .into_iter()
                .map(|name| Segment::from_name(name.as_ref()))
                .collect(),
        }
    }

    /// Appends a segment.
    #[inline]
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Returns the segments in order.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the pattern has no segments.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterates over the parameter names in order of appearance.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|segment| segment.is_param())
            .map(Segment::as_str)
    }

    /// Renders the pattern in the router primitive's syntax (`/users/{id}`).
    #[must_use]
    pub fn to_router_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_owned();
        }
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(s) => path.push_str(s),
                Segment::Param(s) => {
                    path.push('{');
                    path.push_str(s);
                    path.push('}');
                }
            }
        }
        path
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for PathPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Whether a route is served from a parsed JSON file or a handler script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A `.json` file parsed once at load time.
    Static,
    /// A handler script evaluated once per load.
    Dynamic,
}

impl SourceKind {
    /// Returns a lower-case label (`"static"` / `"dynamic"`).
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The uniqueness key of a route: `(method, pattern)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteKey {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The path pattern.
    pub pattern: PathPattern,
}

impl RouteKey {
    /// Creates a new route key.
    #[inline]
    #[must_use]
    pub const fn new(method: HttpMethod, pattern: PathPattern) -> Self {
        Self { method, pattern }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}
