//! Bridge from axum to the Sigma dispatcher.
//!
//! Every inbound request lands in [`dispatch`], which runs the matched
//! handler on its own task with a channel-backed [`ResponseWriter`]. Status
//! and headers reach axum on the first flush (or when the handler returns);
//! body bytes stream through as they are flushed, which is what lets a push
//! stream stay open indefinitely.

use crate::state::AppState;
use axum::{
    Router,
    body::{Body, Bytes},
    extract::{FromRequest, Form, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use sigma_core::{Request, ResponseWriter};
use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

/// Build the axum router: everything goes through the dispatcher.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Status line and headers, committed once.
#[derive(Debug)]
pub struct Head {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// [`ResponseWriter`] that forwards to an axum response body over channels.
pub struct ChannelResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Head>>,
    body_tx: mpsc::UnboundedSender<Bytes>,
    pending: Vec<u8>,
}

/// Resolves when the client side of a [`ChannelResponse`] goes away.
pub struct Disconnect(mpsc::UnboundedSender<Bytes>);

impl Disconnect {
    pub async fn wait(&self) {
        self.0.closed().await;
    }
}

impl ChannelResponse {
    pub fn channel() -> (Self, oneshot::Receiver<Head>, mpsc::UnboundedReceiver<Bytes>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let writer = Self {
            status: None,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx,
            pending: Vec::new(),
        };
        (writer, head_rx, body_rx)
    }

    /// Watch for the body receiver being dropped. Holding the handle keeps
    /// the body open, so drop it once the handler is done.
    pub fn disconnect(&self) -> Disconnect {
        Disconnect(self.body_tx.clone())
    }

    fn send_head(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            let head = Head {
                status: self.status.unwrap_or(StatusCode::OK),
                headers: std::mem::take(&mut self.headers),
            };
            let _ = tx.send(head);
        }
    }

    fn send_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.pending));
        self.body_tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }
}

impl ResponseWriter for ChannelResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_some() {
            debug!(target: "sigma::http", "Superfluous status {} ignored", status);
            return;
        }
        self.status = Some(status);
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.body_tx.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"));
        }
        self.status.get_or_insert(StatusCode::OK);
        self.pending.extend_from_slice(chunk);
        Ok(())
    }

    fn supports_flush(&self) -> bool {
        true
    }

    fn flush(&mut self) -> io::Result<()> {
        self.status.get_or_insert(StatusCode::OK);
        self.send_head();
        self.send_pending()
    }
}

impl Drop for ChannelResponse {
    fn drop(&mut self) {
        // A panicking handler leaves the head unsent; `dispatch` turns that
        // into a 500.
        if std::thread::panicking() {
            return;
        }
        self.send_head();
        let _ = self.send_pending();
    }
}

/// Fallback handler: translate, dispatch, stream back.
pub async fn dispatch(State(state): State<Arc<AppState>>, req: axum::extract::Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();
    let form = read_form(req).await;

    let (canceller, signal) = state.request_cancellation();
    let request = Request::new(method, path)
        .with_headers(headers)
        .with_form(form)
        .with_cancel(signal);

    let (writer, head_rx, body_rx) = ChannelResponse::channel();
    let disconnect = writer.disconnect();
    let sigma = state.sigma.clone();

    tokio::spawn(async move {
        let handled = sigma.dispatch(request, Box::new(writer));
        tokio::pin!(handled);

        let result = tokio::select! {
            result = &mut handled => result,
            _ = disconnect.wait() => {
                debug!(target: "sigma::http", "Client disconnected; cancelling request");
                canceller.cancel();
                handled.await
            }
        };
        if let Err(e) = result {
            debug!(target: "sigma::http", "Dispatch rejected request: {}", e);
        }
        canceller.cancel();
    });

    match head_rx.await {
        Ok(head) => {
            let stream = UnboundedReceiverStream::new(body_rx).map(Ok::<_, Infallible>);
            let mut response = Response::new(Body::from_stream(stream));
            *response.status_mut() = head.status;
            *response.headers_mut() = head.headers;
            response
        }
        Err(_) => {
            tracing::error!(target: "sigma::http", "Handler ended without a response");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Fields from the query string (GET) or an urlencoded body (POST).
/// Anything else yields no fields.
async fn read_form(req: axum::extract::Request) -> HashMap<String, String> {
    match Form::<HashMap<String, String>>::from_request(req, &()).await {
        Ok(Form(fields)) => fields,
        Err(rejection) => {
            debug!(target: "sigma::http", "No form fields: {}", rejection);
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_head_sent_on_flush() {
        let (mut writer, head_rx, mut body_rx) = ChannelResponse::channel();
        writer
            .headers_mut()
            .insert("content-type", "text/event-stream".parse().unwrap());
        writer.write(b"data: x\n\n").unwrap();
        writer.flush().unwrap();

        let head = head_rx.await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers["content-type"], "text/event-stream");
        assert_eq!(body_rx.recv().await.unwrap(), Bytes::from_static(b"data: x\n\n"));
    }

    #[tokio::test]
    async fn test_drop_sends_head_and_body() {
        let (mut writer, head_rx, mut body_rx) = ChannelResponse::channel();
        writer.write_status(StatusCode::NOT_FOUND);
        writer.write_status(StatusCode::OK);
        writer.write(b"Not found\n").unwrap();
        drop(writer);

        assert_eq!(head_rx.await.unwrap().status, StatusCode::NOT_FOUND);
        assert_eq!(body_rx.recv().await.unwrap(), Bytes::from_static(b"Not found\n"));
        assert!(body_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_disconnect_fails() {
        let (mut writer, _head_rx, body_rx) = ChannelResponse::channel();
        let disconnect = writer.disconnect();
        drop(body_rx);
        disconnect.wait().await;

        let err = writer.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
