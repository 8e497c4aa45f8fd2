//! Per-request data handed to handlers.

use crate::cancel::CancelSignal;
use crate::response::ResponseWriter;
use axum::http::{
    HeaderMap, HeaderValue, Method, StatusCode,
    header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
};
use serde::Serialize;
use std::collections::HashMap;
use std::io;

/// Inbound request data.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Literal request path, without query string.
    pub path: String,
    pub headers: HeaderMap,
    /// Form fields from the query string or an urlencoded body.
    pub form: HashMap<String, String>,
    cancel: CancelSignal,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            form: HashMap::new(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_form(mut self, form: HashMap<String, String>) -> Self {
        self.form = form;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }

    /// Tie the request to a connection lifecycle.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }
}

/// Bundle of request, response sink and route parameters for one dispatch.
pub struct Context {
    request: Request,
    response: Box<dyn ResponseWriter>,
    /// Route parameters. The router matches literal paths only, so this is
    /// always empty today.
    params: HashMap<String, String>,
}

impl Context {
    pub fn new(request: Request, response: Box<dyn ResponseWriter>) -> Self {
        Self {
            request,
            response,
            params: HashMap::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.request.form.get(key).map(String::as_str)
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.request.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.request.cancel.is_cancelled()
    }

    pub fn response(&mut self) -> &mut dyn ResponseWriter {
        self.response.as_mut()
    }

    pub fn set_header(&mut self, name: axum::http::HeaderName, value: &'static str) {
        self.response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }

    /// Plain-text error reply, as a browser-facing HTTP error.
    pub fn error(&mut self, status: StatusCode, message: &str) {
        self.set_header(CONTENT_TYPE, "text/plain; charset=utf-8");
        self.set_header(X_CONTENT_TYPE_OPTIONS, "nosniff");
        self.response.write_status(status);
        if let Err(e) = self.response.write(format!("{}\n", message).as_bytes()) {
            tracing::debug!(target: "sigma::dispatch", "Failed to write error body: {}", e);
        }
    }

    pub fn text(&mut self, status: StatusCode, body: &str) -> io::Result<()> {
        self.set_header(CONTENT_TYPE, "text/plain; charset=utf-8");
        self.response.write_status(status);
        self.response.write(body.as_bytes())
    }

    pub fn html(&mut self, body: &str) -> io::Result<()> {
        self.set_header(CONTENT_TYPE, "text/html; charset=utf-8");
        self.response.write_status(StatusCode::OK);
        self.response.write(body.as_bytes())
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.set_header(CONTENT_TYPE, "application/json");
        self.response.write_status(StatusCode::OK);
        self.response.write(&body)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseRecorder;

    #[test]
    fn test_error_writes_plain_text() {
        let recorder = ResponseRecorder::new();
        let mut ctx = Context::new(
            Request::new(Method::GET, "/missing"),
            Box::new(recorder.clone()),
        );
        ctx.error(StatusCode::NOT_FOUND, "Not found");

        let recorded = recorder.snapshot();
        assert_eq!(recorded.status(), StatusCode::NOT_FOUND);
        assert_eq!(recorded.body_text(), "Not found\n");
        assert_eq!(recorded.header("x-content-type-options"), Some("nosniff"));
        assert!(ctx.params().is_empty());
    }

    #[test]
    fn test_form_value() {
        let request = Request::new(Method::POST, "/update/todo")
            .with_field("action", "add")
            .with_field("text", "milk");
        let ctx = Context::new(request, Box::new(ResponseRecorder::new()));
        assert_eq!(ctx.form_value("action"), Some("add"));
        assert_eq!(ctx.form_value("id"), None);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_json_reply() {
        let recorder = ResponseRecorder::new();
        let mut ctx = Context::new(Request::new(Method::GET, "/"), Box::new(recorder.clone()));
        ctx.json(&serde_json::json!({"ok": true})).unwrap();

        let recorded = recorder.snapshot();
        assert_eq!(recorded.header("content-type"), Some("application/json"));
        assert_eq!(recorded.body_text(), r#"{"ok":true}"#);
    }
}
