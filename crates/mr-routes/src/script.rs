//! Lua handler scripts.
//!
//! A handler script is a Lua chunk that evaluates to a single function:
//!
//! ```lua
//! return function(req, res)
//!   res:status(201):json({ id = req.params.id, name = req.body.name })
//! end
//! ```
//!
//! Every script gets its own Lua state, created when the script is loaded
//! and dropped with the route table that owns it. Evaluation and every
//! call run under an instruction-count hook that aborts the script once
//! its time bound has passed.

use std::fmt;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use mlua::{
    AnyUserData, Function, HookTriggers, Lua, LuaSerdeExt, SerializeOptions, UserData,
    UserDataMethods, Value, VmState,
};
use parking_lot::Mutex;

use crate::error::RouteError;
use crate::exchange::{MockRequest, MockResponse, ResponseBody};

/// Number of VM instructions between deadline checks.
const DEADLINE_CHECK_INTERVAL: u32 = 10_000;

/// A loaded handler script.
pub struct ScriptHandler {
    path: Utf8PathBuf,
    lua: Lua,
    function: Function,
    call_timeout: Duration,
    /// One call at a time per state, so the deadline hook belongs to it.
    call_lock: Mutex<()>,
}

impl ScriptHandler {
    /// Reads and evaluates the script at `path` in a fresh Lua state.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Read`] if the file cannot be read.
    /// - [`RouteError::InvalidHandler`] if evaluation fails, exceeds
    ///   `load_timeout`, or produces anything other than a function.
    pub fn load(
        path: &Utf8Path,
        load_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, RouteError> {
        let source = std::fs::read_to_string(path).map_err(|err| RouteError::read(path, err))?;

        let lua = Lua::new();
        arm_deadline(&lua, load_timeout);
        let evaluated = lua
            .load(source.as_str())
            .set_name(format!("@{path}"))
            .eval::<Value>();
        lua.remove_hook();

        let function = match evaluated {
            Ok(Value::Function(function)) => function,
            Ok(other) => {
                return Err(RouteError::invalid_handler(
                    path,
                    format!("script must return a handler function, got {}", other.type_name()),
                ));
            }
            Err(err) => return Err(RouteError::invalid_handler(path, err.to_string())),
        };

        Ok(Self {
            path: path.to_owned(),
            lua,
            function,
            call_timeout,
            call_lock: Mutex::new(()),
        })
    }

    /// Returns the script path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Invokes the handler function with `request`.
    ///
    /// Blocks until the script returns or its call bound expires. Calls on
    /// the same handler are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::HandlerCall`] if the script raises an error,
    /// misuses the response object, or runs past its bound.
    pub fn call(&self, request: &MockRequest) -> Result<MockResponse, RouteError> {
        let _guard = self.call_lock.lock();
        arm_deadline(&self.lua, self.call_timeout);
        let result = self.invoke(request);
        self.lua.remove_hook();

        result.map_err(|err| RouteError::HandlerCall {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    fn invoke(&self, request: &MockRequest) -> mlua::Result<MockResponse> {
        let options = SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false);
        let req = self.lua.to_value_with(request, options)?;
        let res = self.lua.create_userdata(ResponseSink::default())?;

        self.function.call::<()>((req, res.clone()))?;

        Ok(res.take::<ResponseSink>()?.into_response())
    }
}

impl fmt::Debug for ScriptHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHandler")
            .field("path", &self.path)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Installs a hook that raises an error once `limit` has elapsed.
fn arm_deadline(lua: &Lua, limit: Duration) {
    let started = Instant::now();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
        move |_, _| {
            if started.elapsed() > limit {
                Err(mlua::Error::runtime(format!(
                    "script exceeded its time limit of {}ms",
                    limit.as_millis()
                )))
            } else {
                Ok(VmState::Continue)
            }
        },
    );
}

/// The `res` object handed to a handler.
///
/// Every method returns the object itself, so calls chain:
/// `res:status(404):json({ error = "nope" })`.
#[derive(Debug)]
struct ResponseSink {
    status: u16,
    headers: Vec<(String, String)>,
    body: ResponseBody,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }
}

impl ResponseSink {
    fn into_response(self) -> MockResponse {
        MockResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl UserData for ResponseSink {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_function("status", |_, (ud, code): (AnyUserData, i64)| {
            let code = u16::try_from(code)
                .ok()
                .filter(|code| (100..=599).contains(code))
                .ok_or_else(|| mlua::Error::runtime(format!("invalid status code {code}")))?;
            ud.borrow_mut::<Self>()?.status = code;
            Ok(ud)
        });

        methods.add_function(
            "header",
            |_, (ud, name, value): (AnyUserData, String, String)| {
                ud.borrow_mut::<Self>()?.headers.push((name, value));
                Ok(ud)
            },
        );

        methods.add_function("json", |lua, (ud, value): (AnyUserData, Value)| {
            let json: serde_json::Value = lua.from_value(value)?;
            ud.borrow_mut::<Self>()?.body = ResponseBody::Json(json);
            Ok(ud)
        });

        methods.add_function("send", |_, (ud, text): (AnyUserData, String)| {
            ud.borrow_mut::<Self>()?.body = ResponseBody::Text(text);
            Ok(ud)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    use mr_core::HttpMethod;
    use serde_json::json;
    use tempfile::TempDir;

    const SECOND: Duration = Duration::from_secs(1);

    fn script(dir: &TempDir, name: &str, source: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        fs::write(&path, source).unwrap();
        path
    }

    fn load(dir: &TempDir, source: &str) -> Result<ScriptHandler, RouteError> {
        let path = script(dir, "handler.lua", source);
        ScriptHandler::load(&path, SECOND, SECOND)
    }

    #[test]
    fn test_handler_reads_request_and_writes_json() {
        let dir = TempDir::new().unwrap();
        let handler = load(
            &dir,
            r#"
            return function(req, res)
              res:status(201):json({ id = req.params.id, name = req.body.name, method = req.method })
            end
            "#,
        )
        .unwrap();

        let mut params = BTreeMap::new();
        params.insert("id".to_owned(), "7".to_owned());
        let request = MockRequest::new(HttpMethod::Put, "/users/7")
            .with_params(params)
            .with_body(json!({ "name": "Carol" }));

        let response = handler.call(&request).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(
            response.body,
            ResponseBody::Json(json!({ "id": "7", "name": "Carol", "method": "PUT" }))
        );
    }

    #[test]
    fn test_handler_headers_and_text() {
        let dir = TempDir::new().unwrap();
        let handler = load(
            &dir,
            r#"return function(req, res) res:header("X-Mock", "yes"):send("created") end"#,
        )
        .unwrap();

        let response = handler.call(&MockRequest::default()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("x-mock"), Some("yes"));
        assert_eq!(response.body, ResponseBody::Text("created".to_owned()));
    }

    #[test]
    fn test_handler_that_writes_nothing_is_empty_ok() {
        let dir = TempDir::new().unwrap();
        let handler = load(&dir, "return function(req, res) end").unwrap();

        let response = handler.call(&MockRequest::default()).unwrap();
        assert_eq!(response, MockResponse::empty());
    }

    #[test]
    fn test_missing_body_is_nil() {
        let dir = TempDir::new().unwrap();
        let handler = load(
            &dir,
            r#"return function(req, res) res:send(tostring(req.body == nil)) end"#,
        )
        .unwrap();

        let response = handler.call(&MockRequest::default()).unwrap();
        assert_eq!(response.body, ResponseBody::Text("true".to_owned()));
    }

    #[test]
    fn test_script_must_return_function() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir, "return { users = {} }").unwrap_err();
        assert!(matches!(err, RouteError::InvalidHandler { .. }));
        assert!(err.to_string().contains("got table"));
    }

    #[test]
    fn test_syntax_error_is_invalid_handler() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir, "return function(req, res").unwrap_err();
        assert!(matches!(err, RouteError::InvalidHandler { .. }));
    }

    #[test]
    fn test_runaway_load_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "spin.lua", "while true do end");

        let err = ScriptHandler::load(&path, Duration::from_millis(50), SECOND).unwrap_err();
        assert!(matches!(err, RouteError::InvalidHandler { .. }));
        assert!(err.to_string().contains("time limit"));
    }

    #[test]
    fn test_runaway_call_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "spin.lua", "return function() while true do end end");
        let handler = ScriptHandler::load(&path, SECOND, Duration::from_millis(50)).unwrap();

        let err = handler.call(&MockRequest::default()).unwrap_err();
        assert!(matches!(err, RouteError::HandlerCall { .. }));

        // The state is still usable afterwards.
        let again = handler.call(&MockRequest::default()).unwrap_err();
        assert!(again.to_string().contains("time limit"));
    }

    #[test]
    fn test_script_error_is_handler_call_error() {
        let dir = TempDir::new().unwrap();
        let handler = load(&dir, r#"return function() error("boom") end"#).unwrap();

        let err = handler.call(&MockRequest::default()).unwrap_err();
        assert!(matches!(err, RouteError::HandlerCall { .. }));
        assert!(err.to_string().contains("boom"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let dir = TempDir::new().unwrap();
        let handler = load(&dir, "return function(req, res) res:status(42) end").unwrap();

        let err = handler.call(&MockRequest::default()).unwrap_err();
        assert!(err.to_string().contains("invalid status code 42"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.lua")).unwrap();
        let err = ScriptHandler::load(&path, SECOND, SECOND).unwrap_err();
        assert!(matches!(err, RouteError::Read { .. }));
    }
}
