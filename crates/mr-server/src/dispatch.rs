//! Request dispatch against the current route table.
//!
//! Every request the fixed routes do not claim lands in [`dispatch`],
//! which takes one table snapshot, matches the method and path against
//! it and runs the responder. A rebuild that swaps the table mid-request
//! does not affect a request that already holds its snapshot.

use std::collections::BTreeMap;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use mr_core::HttpMethod;
use mr_routes::{MockRequest, MockResponse, ResponseBody};

use crate::error::DispatchError;
use crate::state::SharedState;

/// Fallback handler serving derived routes.
pub async fn dispatch(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, DispatchError> {
    let path = uri.path();
    let Some(http_method) = route_method(&method) else {
        return Err(DispatchError::not_found(method.as_str(), path));
    };

    let table = state.snapshot();
    let Some(matched) = table.lookup(http_method, path) else {
        return Err(DispatchError::not_found(method.as_str(), path));
    };
    debug!(
        method = %http_method,
        route = %matched.entry.key().pattern,
        kind = %matched.entry.kind(),
        generation = table.generation(),
        "Dispatching request"
    );

    let responder = matched.entry.responder().clone();
    let request = MockRequest {
        method: http_method,
        path: path.to_owned(),
        params: matched.params,
        query: parse_query(&uri)?,
        headers: lower_case_headers(&headers),
        body: parse_body(&body),
    };
    drop(table);

    let response = if responder.is_blocking() {
        tokio::task::spawn_blocking(move || responder.respond(&request)).await??
    } else {
        responder.respond(&request)?
    };

    Ok(render(response))
}

/// Maps the request method to the route method serving it.
///
/// `HEAD` is answered by the `GET` route; hyper leaves the body out.
fn route_method(method: &Method) -> Option<HttpMethod> {
    if method == Method::HEAD {
        return Some(HttpMethod::Get);
    }
    method.as_str().parse().ok()
}

/// Decodes the query string. Repeated keys keep the last value.
fn parse_query(uri: &Uri) -> Result<BTreeMap<String, String>, DispatchError> {
    if uri.query().is_none() {
        return Ok(BTreeMap::new());
    }
    Query::<BTreeMap<String, String>>::try_from_uri(uri)
        .map(|Query(query)| query)
        .map_err(|rejection| DispatchError::InvalidQuery(rejection.body_text()))
}

/// Collects headers by name. Values that are not visible ASCII are left out.
fn lower_case_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_ascii_lowercase(), value.to_owned()))
        })
        .collect()
}

/// Parses the body as JSON, falling back to the raw text, then to null.
fn parse_body(body: &Bytes) -> serde_json::Value {
    if body.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(value) = serde_json::from_slice(body) {
        return value;
    }
    match std::str::from_utf8(body) {
        Ok(text) => serde_json::Value::String(text.to_owned()),
        Err(_) => serde_json::Value::Null,
    }
}

/// Renders a responder's output as an HTTP response.
fn render(response: MockResponse) -> Response {
    let MockResponse {
        status,
        headers,
        body,
    } = response;

    let status = StatusCode::from_u16(status).unwrap_or_else(|_| {
        warn!(status, "Handler set an unusable status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let (default_type, body) = match body {
        ResponseBody::Empty => (None, Body::empty()),
        ResponseBody::Json(value) => (
            Some("application/json"),
            Body::from(serde_json::to_vec(&value).unwrap_or_default()),
        ),
        ResponseBody::RawJson(text) => (
            Some("application/json"),
            Body::from(Bytes::copy_from_slice(text.as_bytes())),
        ),
        ResponseBody::Text(text) => (Some("text/plain; charset=utf-8"), Body::from(text)),
    };

    let mut rendered = (status, body).into_response();
    let out = rendered.headers_mut();
    if let Some(content_type) = default_type {
        out.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(&Bytes::new()), serde_json::Value::Null);
        assert_eq!(
            parse_body(&Bytes::from_static(br#"{"name":"Carol"}"#)),
            serde_json::json!({"name": "Carol"})
        );
        assert_eq!(
            parse_body(&Bytes::from_static(b"plain words")),
            serde_json::json!("plain words")
        );
        assert_eq!(
            parse_body(&Bytes::from_static(&[0xff, 0xfe])),
            serde_json::Value::Null
        );
    }

    #[test]
    fn test_route_method() {
        assert_eq!(route_method(&Method::GET), Some(HttpMethod::Get));
        assert_eq!(route_method(&Method::HEAD), Some(HttpMethod::Get));
        assert_eq!(route_method(&Method::DELETE), Some(HttpMethod::Delete));
        assert_eq!(route_method(&Method::PATCH), None);
    }

    #[tokio::test]
    async fn test_render_raw_json_is_sent_unchanged() {
        let text = r#"{"name":"Alice","id":1,"balance":1.50}"#;
        let rendered = render(MockResponse::raw_json(std::sync::Arc::from(text)));
        assert_eq!(rendered.status(), StatusCode::OK);
        assert_eq!(rendered.headers()[CONTENT_TYPE], "application/json");

        let body = axum::body::to_bytes(rendered.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], text.as_bytes());
    }

    #[test]
    fn test_parse_query() {
        let uri: Uri = "/users?page=2&sort=name&page=3".parse().unwrap();
        let query = parse_query(&uri).unwrap();
        assert_eq!(query.get("page").map(String::as_str), Some("3"));
        assert_eq!(query.get("sort").map(String::as_str), Some("name"));

        let uri: Uri = "/users".parse().unwrap();
        assert!(parse_query(&uri).unwrap().is_empty());
    }

    #[test]
    fn test_render_sets_content_type() {
        let rendered = render(MockResponse::json(serde_json::json!([1, 2])));
        assert_eq!(rendered.status(), StatusCode::OK);
        assert_eq!(rendered.headers()[CONTENT_TYPE], "application/json");

        let mut custom = MockResponse::text("<p>hi</p>");
        custom.status = 201;
        custom
            .headers
            .push(("Content-Type".to_owned(), "text/html".to_owned()));
        let rendered = render(custom);
        assert_eq!(rendered.status(), StatusCode::CREATED);
        assert_eq!(rendered.headers()[CONTENT_TYPE], "text/html");
    }

    #[test]
    fn test_render_empty_and_invalid_headers() {
        let mut response = MockResponse::empty();
        response.status = 204;
        response
            .headers
            .push(("bad header".to_owned(), "x".to_owned()));
        let rendered = render(response);
        assert_eq!(rendered.status(), StatusCode::NO_CONTENT);
        assert!(rendered.headers().get(CONTENT_TYPE).is_none());
        assert!(rendered.headers().is_empty());
    }
}
