//! Todo list: add, toggle and delete items by form POST.

use super::{install_inspection_routes, page_handler};
use sigma_core::{CallbackFault, Component, Context, PushStream, Sigma, update_component};
use sigma_types::{StateMap, StateValue, state_map};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub const NAME: &str = "todo";
pub const TEMPLATE: &str = concat!(
    r#"<div id="todo"><ul>"#,
    r#"{{range .Items}}<li data-id="{{.ID}}"{{if .Done}} class="done"{{end}}>{{.Text}}</li>"#,
    r#"{{else}}<li class="empty">Nothing to do</li>{{end}}"#,
    r#"</ul><p>{{.Remaining}} remaining</p></div>"#,
);

/// Longest accepted item text, in characters.
pub const MAX_TEXT_LEN: usize = 200;

const CONTROLS: &str = r#"<form id="add"><input name="text" placeholder="What needs doing?"><button type="submit">Add</button></form>"#;

const SCRIPT: &str = r#"const post = (fields) =>
  fetch("/update/todo", { method: "POST", body: new URLSearchParams(fields) });
const source = new EventSource("/sse/todo");
source.onmessage = (event) => {
  document.getElementById("todo").outerHTML = event.data;
};
document.getElementById("add").addEventListener("submit", (event) => {
  event.preventDefault();
  const input = event.target.elements.text;
  post({ action: "add", text: input.value });
  input.value = "";
});
document.addEventListener("click", (event) => {
  const item = event.target.closest("li[data-id]");
  if (!item) return;
  post({ action: event.altKey ? "delete" : "toggle", id: item.dataset.id });
});"#;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TodoError {
    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Item text is empty")]
    EmptyText,

    #[error("Item text exceeds {} characters", MAX_TEXT_LEN)]
    TextTooLong,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("No item with id {0}")]
    UnknownItem(String),

    #[error("Items holds a {0}, expected a list")]
    Corrupt(&'static str),
}

impl From<TodoError> for CallbackFault {
    fn from(e: TodoError) -> Self {
        CallbackFault::new(e.to_string())
    }
}

/// One requested change to the list.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Add(String),
    Toggle(String),
    Delete(String),
}

impl Action {
    /// Read `action`, `text` and `id` form fields.
    pub fn from_form(ctx: &Context) -> Result<Self, TodoError> {
        let action = ctx.form_value("action").unwrap_or("add");
        let id = || {
            ctx.form_value("id")
                .map(str::to_string)
                .ok_or(TodoError::MissingField("id"))
        };
        match action {
            "add" => {
                let text = ctx.form_value("text").ok_or(TodoError::MissingField("text"))?.trim();
                if text.is_empty() {
                    return Err(TodoError::EmptyText);
                }
                if text.chars().count() > MAX_TEXT_LEN {
                    return Err(TodoError::TextTooLong);
                }
                Ok(Action::Add(text.to_string()))
            }
            "toggle" => Ok(Action::Toggle(id()?)),
            "delete" => Ok(Action::Delete(id()?)),
            other => Err(TodoError::UnknownAction(other.to_string())),
        }
    }

    /// Apply to a state map holding `Items`, then refresh `Remaining`.
    pub fn apply(self, state: &mut StateMap) -> Result<(), TodoError> {
        let items = match state
            .entry("Items".to_string())
            .or_insert_with(|| StateValue::List(Vec::new()))
        {
            StateValue::List(items) => items,
            other => return Err(TodoError::Corrupt(other.kind())),
        };

        match self {
            Action::Add(text) => items.push(new_item(&text)),
            Action::Toggle(id) => {
                let item = items
                    .iter_mut()
                    .filter_map(StateValue::as_map_mut)
                    .find(|item| item_id(item) == Some(id.as_str()))
                    .ok_or(TodoError::UnknownItem(id))?;
                let done = item.get("Done").is_some_and(StateValue::is_truthy);
                item.insert("Done".into(), StateValue::Bool(!done));
            }
            Action::Delete(id) => {
                let before = items.len();
                items.retain(|item| item.as_map().and_then(item_id) != Some(id.as_str()));
                if items.len() == before {
                    return Err(TodoError::UnknownItem(id));
                }
            }
        }

        let remaining = items
            .iter()
            .filter_map(StateValue::as_map)
            .filter(|item| !item.get("Done").is_some_and(StateValue::is_truthy))
            .count();
        state.insert("Remaining".into(), StateValue::Int(remaining as i64));
        Ok(())
    }
}

fn new_item(text: &str) -> StateValue {
    StateValue::Map(state_map([
        ("ID", StateValue::from(Uuid::new_v4().to_string())),
        ("Text", StateValue::from(text)),
        ("Done", StateValue::Bool(false)),
    ]))
}

fn item_id(item: &StateMap) -> Option<&str> {
    item.get("ID").and_then(StateValue::as_str)
}

fn update(component: &Component, ctx: &mut Context) -> Result<(), CallbackFault> {
    let action = Action::from_form(ctx)?;
    tracing::debug!(target: "sigma::update", "Todo action {:?}", action);
    component.modify(|state| action.apply(state))?;
    Ok(())
}

/// Build the todo component with an empty list.
pub fn component() -> Component {
    let initial = state_map([
        ("Items", StateValue::List(Vec::new())),
        ("Remaining", StateValue::Int(0)),
    ]);
    Component::new(NAME, TEMPLATE, initial).on_update(update)
}

/// Register the component with `GET /todo`, `POST /update/todo` and
/// `GET /sse/todo`.
pub fn install(sigma: &Sigma, interval: Duration) -> sigma_core::Result<Arc<Component>> {
    let todo = Arc::new(component());
    sigma.register_component(todo.clone())?;

    sigma.get("/todo", page_handler(todo.clone(), "Todo", SCRIPT, CONTROLS));
    sigma.post("/update/todo", update_component(todo.clone()));
    sigma.get(
        "/sse/todo",
        PushStream::new(todo.clone()).interval(interval).into_handler(),
    );
    install_inspection_routes(sigma, &todo);
    Ok(todo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use sigma_core::{Request, ResponseRecorder};

    fn post(fields: &[(&str, &str)]) -> Context {
        let request = fields.iter().fold(
            Request::new(Method::POST, "/update/todo"),
            |request, (key, value)| request.with_field(*key, *value),
        );
        Context::new(request, Box::new(ResponseRecorder::new()))
    }

    fn first_id(todo: &Component) -> String {
        let items = todo.get("Items").unwrap();
        let first = &items.as_list().unwrap()[0];
        item_id(first.as_map().unwrap()).unwrap().to_string()
    }

    #[test]
    fn test_empty_list_renders_placeholder() {
        let todo = component();
        let html = todo.render().unwrap();
        assert!(html.contains("Nothing to do"));
        assert!(html.contains("0 remaining"));
    }

    #[test]
    fn test_add_toggle_delete() {
        let todo = component();
        todo.update(&mut post(&[("action", "add"), ("text", "write <tests>")])).unwrap();

        let html = todo.render().unwrap();
        assert!(html.contains("write &lt;tests&gt;"));
        assert!(html.contains("1 remaining"));
        assert!(!html.contains("class=\"done\""));

        let id = first_id(&todo);
        todo.update(&mut post(&[("action", "toggle"), ("id", id.as_str())])).unwrap();
        let html = todo.render().unwrap();
        assert!(html.contains("class=\"done\""));
        assert!(html.contains("0 remaining"));

        todo.update(&mut post(&[("action", "delete"), ("id", id.as_str())])).unwrap();
        assert!(todo.render().unwrap().contains("Nothing to do"));
    }

    #[test]
    fn test_action_defaults_to_add() {
        let todo = component();
        todo.update(&mut post(&[("text", "  trimmed  ")])).unwrap();
        assert!(todo.render().unwrap().contains(">trimmed<"));
    }

    #[test]
    fn test_invalid_forms() {
        let cases = vec![
            (vec![("action", "add")], TodoError::MissingField("text")),
            (vec![("action", "add"), ("text", "   ")], TodoError::EmptyText),
            (vec![("action", "toggle")], TodoError::MissingField("id")),
            (vec![("action", "rename")], TodoError::UnknownAction("rename".into())),
            (vec![("action", "delete"), ("id", "nope")], TodoError::UnknownItem("nope".into())),
        ];
        for (fields, expected) in cases {
            let ctx = post(&fields);
            let result = Action::from_form(&ctx).and_then(|action| {
                let mut state = component().state();
                action.apply(&mut state)
            });
            assert_eq!(result, Err(expected));
        }
    }

    #[test]
    fn test_text_length_limit() {
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        let ctx = post(&[("action", "add"), ("text", &long)]);
        assert_eq!(Action::from_form(&ctx), Err(TodoError::TextTooLong));
    }

    #[test]
    fn test_failed_update_leaves_state() {
        let todo = component();
        let before = todo.state();
        let fault = todo.update(&mut post(&[("action", "toggle"), ("id", "missing")])).unwrap_err();
        assert!(fault.to_string().contains("missing"));
        assert_eq!(todo.state(), before);
    }
}
