//! Request helpers for route tests: drive the full router with `oneshot`.

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use tower::ServiceExt;

use crate::state::AppState;
use crate::state::test_helpers::session_cookie;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn message(&self) -> &str {
        self.json["message"].as_str().unwrap_or_default()
    }
}

pub async fn send(
    state: &AppState,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, session_cookie(token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    };

    let response = super::app(state.clone())
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    TestResponse { status, headers, json }
}

pub async fn get(state: &AppState, uri: &str, token: Option<&str>) -> TestResponse {
    send(state, Method::GET, uri, token, None).await
}

pub async fn post(state: &AppState, uri: &str, token: Option<&str>, body: serde_json::Value) -> TestResponse {
    send(state, Method::POST, uri, token, Some(body)).await
}

pub async fn patch(state: &AppState, uri: &str, token: Option<&str>, body: serde_json::Value) -> TestResponse {
    send(state, Method::PATCH, uri, token, Some(body)).await
}
