//! Click counter: one integer, incremented by POST, pushed over SSE.

use super::{install_inspection_routes, page_handler};
use sigma_core::{CallbackFault, Component, Context, PushStream, Sigma, update_component};
use sigma_types::{StateValue, state_map};
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "counter";
pub const TEMPLATE: &str = r#"<div id="counter">Count: {{.Count}}</div>"#;

const SCRIPT: &str = r#"const source = new EventSource("/sse/counter");
source.onmessage = (event) => {
  document.getElementById("counter").outerHTML = event.data;
};
document.getElementById("increment").addEventListener("submit", (event) => {
  event.preventDefault();
  fetch("/update/counter", { method: "POST" });
});"#;

/// Build the counter component, starting at zero.
pub fn component() -> Component {
    Component::new(NAME, TEMPLATE, state_map([("Count", 0)])).on_update(increment)
}

fn increment(component: &Component, _ctx: &mut Context) -> Result<(), CallbackFault> {
    component.modify(|state| match state.get_mut("Count") {
        Some(StateValue::Int(n)) => {
            *n = n.saturating_add(1);
            Ok(())
        }
        Some(other) => Err(CallbackFault::new(format!(
            "Count holds a {}, expected an integer",
            other.kind()
        ))),
        None => {
            state.insert("Count".into(), StateValue::Int(1));
            Ok(())
        }
    })
}

/// Register the component with `GET /`, `POST /update/counter` and
/// `GET /sse/counter`.
pub fn install(sigma: &Sigma, interval: Duration) -> sigma_core::Result<Arc<Component>> {
    let counter = Arc::new(component());
    sigma.register_component(counter.clone())?;

    sigma.get("/", page_handler(counter.clone(), "Counter", SCRIPT, FORM));
    sigma.post("/update/counter", update_component(counter.clone()));
    sigma.get(
        "/sse/counter",
        PushStream::new(counter.clone()).interval(interval).into_handler(),
    );
    install_inspection_routes(sigma, &counter);
    Ok(counter)
}

const FORM: &str = r#"<form id="increment" method="post" action="/update/counter"><button type="submit">Increment</button></form>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use sigma_core::{Request, ResponseRecorder};
    use axum::http::Method;

    fn post() -> Context {
        Context::new(
            Request::new(Method::POST, "/update/counter"),
            Box::new(ResponseRecorder::new()),
        )
    }

    #[test]
    fn test_initial_render() {
        let counter = component();
        assert_eq!(counter.render().unwrap(), r#"<div id="counter">Count: 0</div>"#);
    }

    #[test]
    fn test_increment() {
        let counter = component();
        counter.update(&mut post()).unwrap();
        counter.update(&mut post()).unwrap();
        assert_eq!(counter.get("Count"), Some(StateValue::Int(2)));
        assert_eq!(counter.render().unwrap(), r#"<div id="counter">Count: 2</div>"#);
    }

    #[test]
    fn test_increment_rejects_non_integer() {
        let counter = component();
        counter.set_state("Count", "many").unwrap();
        assert!(counter.update(&mut post()).is_err());
        assert_eq!(counter.get("Count"), Some(StateValue::from("many")));
    }

    #[test]
    fn test_install_registers_routes() {
        let sigma = Sigma::new();
        install(&sigma, Duration::from_millis(10)).unwrap();

        let routes = sigma.routes();
        assert!(routes.contains(&(Method::GET, "/".to_string())));
        assert!(routes.contains(&(Method::POST, "/update/counter".to_string())));
        assert!(routes.contains(&(Method::GET, "/sse/counter".to_string())));
        assert_eq!(sigma.component_names(), vec!["counter".to_string()]);
    }
}
