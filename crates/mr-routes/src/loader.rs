//! Handler loading.
//!
//! [`HandlerLoader`] turns a [`DerivedRoute`] into a [`Responder`]: a
//! static payload is validated once and its text shared, a handler script
//! is evaluated once in its own Lua state.

use std::sync::Arc;

use mr_core::{HandlerConfig, SourceKind};
use serde::de::IgnoredAny;
use tracing::debug;

use crate::deriver::DerivedRoute;
use crate::error::RouteError;
use crate::exchange::{MockRequest, MockResponse};
use crate::script::ScriptHandler;

/// Produces the response for a matched route.
#[derive(Debug, Clone)]
pub enum Responder {
    /// The text of a valid JSON file, returned as is for every request.
    Static(Arc<str>),
    /// A handler script invoked per request.
    Dynamic(Arc<ScriptHandler>),
}

impl Responder {
    /// Returns the source kind this responder was loaded from.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::Static(_) => SourceKind::Static,
            Self::Dynamic(_) => SourceKind::Dynamic,
        }
    }

    /// Returns `true` if [`respond`](Self::respond) may block on script
    /// execution.
    #[inline]
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Produces the response for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::HandlerCall`] if a handler script fails.
    pub fn respond(&self, request: &MockRequest) -> Result<MockResponse, RouteError> {
        match self {
            Self::Static(payload) => Ok(MockResponse::raw_json(Arc::clone(payload))),
            Self::Dynamic(handler) => handler.call(request),
        }
    }
}

/// Loads responders for derived routes.
#[derive(Debug, Clone, Default)]
pub struct HandlerLoader {
    config: HandlerConfig,
}

impl HandlerLoader {
    /// Creates a loader with the given handler settings.
    #[must_use]
    pub fn new(config: HandlerConfig) -> Self {
        Self { config }
    }

    /// Loads the responder for `route`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Read`] if the source cannot be read.
    /// - [`RouteError::MalformedPayload`] for a static file that is not JSON.
    /// - [`RouteError::InvalidHandler`] for a script that does not
    ///   evaluate to a function.
    pub fn load(&self, route: &DerivedRoute) -> Result<Responder, RouteError> {
        let responder = match route.kind {
            SourceKind::Static => {
                let text = std::fs::read_to_string(&route.source)
                    .map_err(|err| RouteError::read(&route.source, err))?;
                // Key order and number spelling must survive, so only the
                // syntax is checked and the text itself is served.
                serde_json::from_str::<IgnoredAny>(&text).map_err(|source| {
                    RouteError::MalformedPayload {
                        path: route.source.clone(),
                        source,
                    }
                })?;
                Responder::Static(Arc::from(text))
            }
            SourceKind::Dynamic => Responder::Dynamic(Arc::new(ScriptHandler::load(
                &route.source,
                self.config.load_timeout(),
                self.config.call_timeout(),
            )?)),
        };

        debug!(route = %route.key, source = %route.source, kind = %route.kind, "Loaded handler");
        Ok(responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use mr_core::{HttpMethod, PathPattern, RouteKey};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn derived(dir: &TempDir, name: &str, contents: &str, kind: SourceKind) -> DerivedRoute {
        let source = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        fs::write(&source, contents).unwrap();
        DerivedRoute {
            key: RouteKey::new(HttpMethod::Get, PathPattern::from_names(["users"])),
            source,
            kind,
        }
    }

    #[test]
    fn test_static_payload_is_returned_verbatim() {
        let dir = TempDir::new().unwrap();
        let text = "[\n  {\"name\": \"Alice\", \"id\": 1, \"balance\": 1.50}\n]\n";
        let route = derived(&dir, "users.json", text, SourceKind::Static);

        let responder = HandlerLoader::default().load(&route).unwrap();
        assert_eq!(responder.kind(), SourceKind::Static);
        assert!(!responder.is_blocking());

        let response = responder.respond(&MockRequest::default()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, crate::ResponseBody::RawJson(Arc::from(text)));
    }

    #[test]
    fn test_malformed_payload() {
        let dir = TempDir::new().unwrap();
        let route = derived(&dir, "users.json", "{ not json", SourceKind::Static);

        let err = HandlerLoader::default().load(&route).unwrap_err();
        assert!(matches!(err, RouteError::MalformedPayload { .. }));
        assert!(err.is_recoverable());

        let trailing = derived(&dir, "orders.json", "{} {}", SourceKind::Static);
        let err = HandlerLoader::default().load(&trailing).unwrap_err();
        assert!(matches!(err, RouteError::MalformedPayload { .. }));
    }

    #[test]
    fn test_dynamic_handler_loads() {
        let dir = TempDir::new().unwrap();
        let route = derived(
            &dir,
            "users.lua",
            r#"return function(req, res) res:send("hi") end"#,
            SourceKind::Dynamic,
        );

        let responder = HandlerLoader::default().load(&route).unwrap();
        assert_eq!(responder.kind(), SourceKind::Dynamic);
        assert!(responder.is_blocking());
    }

    #[test]
    fn test_dynamic_handler_without_function() {
        let dir = TempDir::new().unwrap();
        let route = derived(&dir, "users.lua", "return 42", SourceKind::Dynamic);

        let err = HandlerLoader::default().load(&route).unwrap_err();
        assert!(matches!(err, RouteError::InvalidHandler { .. }));
    }

    #[test]
    fn test_each_load_gets_fresh_state() {
        let dir = TempDir::new().unwrap();
        let route = derived(
            &dir,
            "counter.lua",
            r"
            local count = 0
            return function(req, res)
              count = count + 1
              res:json({ count = count })
            end
            ",
            SourceKind::Dynamic,
        );
        let loader = HandlerLoader::default();

        let first = loader.load(&route).unwrap();
        first.respond(&MockRequest::default()).unwrap();
        first.respond(&MockRequest::default()).unwrap();

        let second = loader.load(&route).unwrap();
        let response = second.respond(&MockRequest::default()).unwrap();
        assert_eq!(response.body, crate::ResponseBody::Json(json!({ "count": 1 })));
    }
}
