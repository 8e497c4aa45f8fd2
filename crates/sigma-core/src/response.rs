//! Response sinks.

use axum::http::{HeaderMap, StatusCode};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outbound side of a request.
///
/// Mirrors a classic HTTP response writer: headers may be edited until the
/// status is written, the first `write` implies `200 OK`, and `flush` pushes
/// buffered bytes to the client for writers that can stream.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the status line. Later calls are ignored.
    fn write_status(&mut self, status: StatusCode);

    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Whether `flush` delivers data incrementally.
    fn supports_flush(&self) -> bool {
        false
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "response writer cannot flush",
        ))
    }
}

/// Snapshot of everything written to a [`ResponseRecorder`].
#[derive(Debug, Clone, Default)]
pub struct RecordedResponse {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Number of successful flushes.
    pub flushes: usize,
}

impl RecordedResponse {
    /// Status as the client would see it: an untouched response is `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// In-memory response writer.
///
/// Clones share one buffer, so a caller can hand one clone to the
/// dispatcher and inspect the result through another.
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    inner: Arc<Mutex<RecordedResponse>>,
    headers: HeaderMap,
    flushable: bool,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecordedResponse::default())),
            headers: HeaderMap::new(),
            flushable: true,
        }
    }

    /// A recorder that reports no incremental flush capability.
    pub fn without_flush() -> Self {
        Self {
            flushable: false,
            ..Self::new()
        }
    }

    /// Everything committed so far. Headers appear once the status is written.
    pub fn snapshot(&self) -> RecordedResponse {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RecordedResponse> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_headers(&self, recorded: &mut RecordedResponse, status: StatusCode) {
        if recorded.status.is_none() {
            recorded.status = Some(status);
            recorded.headers = self.headers.clone();
        }
    }
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        let mut recorded = self.lock();
        self.commit_headers(&mut recorded, status);
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut recorded = self.lock();
        self.commit_headers(&mut recorded, StatusCode::OK);
        recorded.body.extend_from_slice(chunk);
        Ok(())
    }

    fn supports_flush(&self) -> bool {
        self.flushable
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.flushable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "response writer cannot flush",
            ));
        }
        let mut recorded = self.lock();
        self.commit_headers(&mut recorded, StatusCode::OK);
        recorded.flushes += 1;
        Ok(())
    }
}
