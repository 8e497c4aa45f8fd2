//! Handler factories wrapping a component.

use crate::component::Component;
use crate::context::Context;
use crate::dispatcher::Handler;
use axum::http::{Method, StatusCode};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// POST handler that runs the component's update hook.
///
/// Non-POST requests get `405` without touching the hook. A hook that
/// returns a [`CallbackFault`](crate::CallbackFault) or panics yields
/// `500 Server error`; the fault stops here and the process keeps serving.
pub fn update_component(component: Arc<Component>) -> impl Handler {
    move |mut ctx: Context| {
        let component = component.clone();
        async move {
            if *ctx.method() != Method::POST {
                ctx.error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
                return;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| component.update(&mut ctx)));
            match outcome {
                Ok(Ok(())) => {
                    debug!(target: "sigma::update", "Updated component {}", component.name());
                    if let Err(e) = ctx.text(StatusCode::OK, "OK") {
                        debug!(target: "sigma::update", "Failed to acknowledge update: {}", e);
                    }
                }
                Ok(Err(fault)) => {
                    warn!(target: "sigma::update", "Update hook for {} failed: {}", component.name(), fault);
                    ctx.error(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
                }
                Err(payload) => {
                    error!(
                        target: "sigma::update",
                        "Update hook for {} panicked: {}",
                        component.name(),
                        panic_message(payload.as_ref())
                    );
                    ctx.error(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
                }
            }
        }
    }
}

/// GET handler returning the component's rendered fragment.
pub fn render_component(component: Arc<Component>) -> impl Handler {
    move |mut ctx: Context| {
        let component = component.clone();
        async move {
            match component.render() {
                Ok(html) => {
                    if let Err(e) = ctx.html(&html) {
                        debug!(target: "sigma::dispatch", "Failed to write fragment: {}", e);
                    }
                }
                Err(e) => {
                    warn!(target: "sigma::dispatch", "Failed to render {}: {}", component.name(), e);
                    ctx.error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render component");
                }
            }
        }
    }
}

/// GET handler returning a JSON snapshot of the component's state.
pub fn debug_state(component: Arc<Component>) -> impl Handler {
    move |mut ctx: Context| {
        let state = component.state();
        async move {
            if let Err(e) = ctx.json(&state) {
                debug!(target: "sigma::dispatch", "Failed to write state: {}", e);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Request;
    use crate::dispatcher::Sigma;
    use crate::error::CallbackFault;
    use crate::response::{RecordedResponse, ResponseRecorder};
    use sigma_types::{StateMap, StateValue, state_map};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn call(handler: &impl Handler, request: Request) -> RecordedResponse {
        let recorder = ResponseRecorder::new();
        handler
            .call(Context::new(request, Box::new(recorder.clone())))
            .await;
        recorder.snapshot()
    }

    fn counting_component(calls: Arc<AtomicUsize>) -> Arc<Component> {
        Arc::new(
            Component::new("counter", "Count: {{.Count}}", state_map([("Count", 0)])).on_update(
                move |c: &Component, _ctx: &mut Context| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    c.modify(|state| {
                        let next = state.get("Count").and_then(StateValue::as_i64).unwrap_or(0) + 1;
                        state.insert("Count".into(), next.into());
                    });
                    Ok(())
                },
            ),
        )
    }

    #[tokio::test]
    async fn test_update_acknowledges_post() {
        let calls = Arc::new(AtomicUsize::new(0));
        let component = counting_component(calls.clone());
        let handler = update_component(component.clone());

        let response = call(&handler, Request::new(Method::POST, "/update/counter")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body_text(), "OK");
        assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(component.get("Count"), Some(StateValue::Int(1)));
    }

    #[tokio::test]
    async fn test_update_rejects_non_post_before_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = update_component(counting_component(calls.clone()));

        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let response = call(&handler, Request::new(method, "/update/counter")).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_fault_becomes_500() {
        let component = Arc::new(
            Component::new("faulty", "x", StateMap::new())
                .on_update(|_c: &Component, _ctx: &mut Context| Err(CallbackFault::new("bad input"))),
        );
        let response = call(
            &update_component(component),
            Request::new(Method::POST, "/update/faulty"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body_text(), "Server error\n");
    }

    #[tokio::test]
    async fn test_update_panic_is_isolated() {
        let app = Sigma::new();
        let panicking = Arc::new(
            Component::new("panicky", "x", StateMap::new())
                .on_update(|_c: &Component, _ctx: &mut Context| panic!("hook exploded")),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let healthy = counting_component(calls.clone());
        app.post("/update/panicky", update_component(panicking));
        app.post("/update/counter", update_component(healthy.clone()));

        let recorder = ResponseRecorder::new();
        app.dispatch(
            Request::new(Method::POST, "/update/panicky"),
            Box::new(recorder.clone()),
        )
        .await
        .unwrap();
        assert_eq!(recorder.snapshot().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let recorder = ResponseRecorder::new();
        app.dispatch(
            Request::new(Method::POST, "/update/counter"),
            Box::new(recorder.clone()),
        )
        .await
        .unwrap();
        assert_eq!(recorder.snapshot().status(), StatusCode::OK);
        assert_eq!(healthy.get("Count"), Some(StateValue::Int(1)));
    }

    #[tokio::test]
    async fn test_render_component() {
        let component = counting_component(Arc::new(AtomicUsize::new(0)));
        let response = call(
            &render_component(component),
            Request::new(Method::GET, "/counter"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body_text(), "Count: 0");
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_render_failure_is_500() {
        let component = Arc::new(Component::new("broken", "{{if .A}}", StateMap::new()));
        let response = call(
            &render_component(component),
            Request::new(Method::GET, "/broken"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body_text(), "Failed to render component\n");
    }

    #[tokio::test]
    async fn test_debug_state_json() {
        let component = counting_component(Arc::new(AtomicUsize::new(0)));
        let response = call(&debug_state(component), Request::new(Method::GET, "/state")).await;
        let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(json, serde_json::json!({"Count": 0, "name": "counter"}));
    }
}
