//! Stateful, template-rendered components.

use crate::Result;
use crate::context::Context;
use crate::error::{CallbackFault, RenderError, SigmaError};
use crate::template::Template;
use sigma_types::{StateMap, StateValue};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// State key mirroring the component's name, so templates can print it.
/// The authoritative name is [`Component::name`]; this key is read-only
/// through the public accessors.
pub const NAME_KEY: &str = "name";

/// Application-supplied mutation logic run by [`Component::update`].
///
/// Implementations read and write state through the component's
/// synchronized accessors. Nothing is locked for the duration of the call.
pub trait UpdateHook: Send + Sync {
    fn update(&self, component: &Component, ctx: &mut Context) -> std::result::Result<(), CallbackFault>;
}

impl<F> UpdateHook for F
where
    F: Fn(&Component, &mut Context) -> std::result::Result<(), CallbackFault> + Send + Sync,
{
    fn update(&self, component: &Component, ctx: &mut Context) -> std::result::Result<(), CallbackFault> {
        self(component, ctx)
    }
}

/// A named UI fragment: mutable state, an immutable template and an
/// optional update hook.
///
/// A single lock guards the state map. [`render`](Self::render),
/// [`state`](Self::state), [`set_state`](Self::set_state) and
/// [`modify`](Self::modify) are mutually exclusive on one component;
/// separate components never contend.
pub struct Component {
    name: String,
    template: std::result::Result<Template, RenderError>,
    state: Mutex<StateMap>,
    on_update: Option<Box<dyn UpdateHook>>,
}

impl Component {
    /// Create a component. The template is parsed here; a parse failure is
    /// kept and reported by every render.
    pub fn new(name: impl Into<String>, template: &str, initial_state: StateMap) -> Self {
        let name = name.into();
        let mut state = initial_state;
        state.insert(NAME_KEY.to_string(), StateValue::String(name.clone()));

        let template = Template::parse(&name, template);
        if let Err(e) = &template {
            warn!(target: "sigma::component", "Component {} has an invalid template: {}", name, e);
        }

        Self {
            name,
            template,
            state: Mutex::new(state),
            on_update: None,
        }
    }

    /// Bind an update closure.
    pub fn on_update<F>(self, hook: F) -> Self
    where
        F: Fn(&Component, &mut Context) -> std::result::Result<(), CallbackFault>
            + Send
            + Sync
            + 'static,
    {
        self.with_hook(hook)
    }

    /// Bind an update hook.
    pub fn with_hook(mut self, hook: impl UpdateHook + 'static) -> Self {
        self.on_update = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_update_hook(&self) -> bool {
        self.on_update.is_some()
    }

    /// Merge the current state into the template.
    ///
    /// The state lock is held for the whole evaluation.
    pub fn render(&self) -> std::result::Result<String, RenderError> {
        let template = self.template.as_ref().map_err(Clone::clone)?;
        let state = self.lock();
        template.render(&state)
    }

    /// Run the update hook, if any.
    pub fn update(&self, ctx: &mut Context) -> std::result::Result<(), CallbackFault> {
        match &self.on_update {
            Some(hook) => {
                debug!(target: "sigma::component", "Running update hook for {}", self.name);
                hook.update(self, ctx)
            }
            None => Ok(()),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StateMap {
        self.lock().clone()
    }

    /// Clone of one state value.
    pub fn get(&self, key: &str) -> Option<StateValue> {
        self.lock().get(key).cloned()
    }

    /// Insert or replace one key. No coercion is performed.
    pub fn set_state(&self, key: impl Into<String>, value: impl Into<StateValue>) -> Result<()> {
        let key = key.into();
        if key == NAME_KEY {
            return Err(SigmaError::ReservedKey(key));
        }
        self.lock().insert(key, value.into());
        Ok(())
    }

    /// Remove one key, returning its previous value.
    pub fn remove_state(&self, key: &str) -> Result<Option<StateValue>> {
        if key == NAME_KEY {
            return Err(SigmaError::ReservedKey(key.to_string()));
        }
        Ok(self.lock().remove(key))
    }

    /// Read-modify-write under a single lock acquisition.
    ///
    /// The reserved name key is restored afterwards if `f` changed it.
    pub fn modify<R>(&self, f: impl FnOnce(&mut StateMap) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        if state.get(NAME_KEY).and_then(StateValue::as_str) != Some(self.name.as_str()) {
            warn!(target: "sigma::component", "Update to {} touched reserved key '{}'; restored", self.name, NAME_KEY);
            state.insert(NAME_KEY.to_string(), StateValue::String(self.name.clone()));
        }
        result
    }

    // A hook that panics mid-write poisons the mutex; the map itself is
    // still a valid map, so keep serving it.
    fn lock(&self) -> MutexGuard<'_, StateMap> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("has_update_hook", &self.on_update.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Request;
    use crate::response::ResponseRecorder;
    use axum::http::Method;
    use sigma_types::state_map;
    use std::sync::Arc;
    use std::thread;

    fn counter() -> Component {
        Component::new(
            "counter",
            r#"<div id="counter">Count: {{.Count}}</div>"#,
            state_map([("Count", 0)]),
        )
        .on_update(|c: &Component, _ctx: &mut Context| {
            c.modify(|state| {
                let next = state.get("Count").and_then(StateValue::as_i64).unwrap_or(0) + 1;
                state.insert("Count".into(), next.into());
            });
            Ok(())
        })
    }

    fn context() -> Context {
        Context::new(
            Request::new(Method::POST, "/update/counter"),
            Box::new(ResponseRecorder::new()),
        )
    }

    #[test]
    fn test_name_mirrored_into_state() {
        let component = counter();
        assert_eq!(component.name(), "counter");
        assert_eq!(component.get(NAME_KEY), Some(StateValue::from("counter")));
    }

    #[test]
    fn test_render_round_trip() {
        let component = counter();
        assert!(component.render().unwrap().contains("Count: 0"));

        component.set_state("Count", 1).unwrap();
        assert!(component.render().unwrap().contains("Count: 1"));
    }

    #[test]
    fn test_update_runs_hook() {
        let component = counter();
        component.update(&mut context()).unwrap();
        component.update(&mut context()).unwrap();
        assert_eq!(component.get("Count"), Some(StateValue::Int(2)));
    }

    #[test]
    fn test_update_without_hook_is_noop() {
        let component = Component::new("static", "<p>hi</p>", StateMap::new());
        assert!(!component.has_update_hook());
        component.update(&mut context()).unwrap();
        assert_eq!(component.state().len(), 1);
    }

    #[test]
    fn test_hook_may_call_accessors_without_deadlock() {
        let component = Component::new("echo", "{{.Last}}", StateMap::new()).on_update(
            |c: &Component, ctx: &mut Context| {
                let text = ctx.form_value("text").unwrap_or_default().to_string();
                let _ = c.state();
                c.set_state("Last", text).map_err(|e| CallbackFault::new(e.to_string()))
            },
        );
        let mut ctx = Context::new(
            Request::new(Method::POST, "/update/echo").with_field("text", "hello"),
            Box::new(ResponseRecorder::new()),
        );
        component.update(&mut ctx).unwrap();
        assert_eq!(component.render().unwrap(), "hello");
    }

    #[test]
    fn test_reserved_key_is_protected() {
        let component = counter();
        assert!(matches!(
            component.set_state(NAME_KEY, "other"),
            Err(SigmaError::ReservedKey(_))
        ));
        assert!(component.remove_state(NAME_KEY).is_err());

        component.modify(|state| {
            state.insert(NAME_KEY.into(), "hijacked".into());
        });
        assert_eq!(component.get(NAME_KEY), Some(StateValue::from("counter")));
    }

    #[test]
    fn test_remove_state() {
        let component = counter();
        assert_eq!(component.remove_state("Count").unwrap(), Some(StateValue::Int(0)));
        assert_eq!(component.remove_state("Count").unwrap(), None);
        assert_eq!(component.render().unwrap(), r#"<div id="counter">Count: </div>"#);
    }

    #[test]
    fn test_state_is_a_snapshot() {
        let component = counter();
        let before = component.state();
        component.set_state("Count", 5).unwrap();
        assert_eq!(before["Count"], StateValue::Int(0));
    }

    #[test]
    fn test_invalid_template_reported_on_render() {
        let component = Component::new("broken", "{{.Count", StateMap::new());
        assert!(matches!(component.render(), Err(RenderError::Parse { .. })));
        assert!(matches!(component.render(), Err(RenderError::Parse { .. })));
    }

    #[test]
    fn test_unprintable_state_fails_without_partial_output() {
        let component = Component::new("list", "before {{.Items}} after", StateMap::new());
        component.set_state("Items", vec![1, 2]).unwrap();
        assert!(matches!(
            component.render(),
            Err(RenderError::Unprintable { .. })
        ));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let component = Arc::new(counter());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let component = component.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        component.update(&mut context()).unwrap();
                        component.render().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(component.get("Count"), Some(StateValue::Int(800)));
    }

    #[test]
    fn test_survives_panicking_writer() {
        let component = Arc::new(counter());
        let poisoner = component.clone();
        let _ = thread::spawn(move || {
            poisoner.modify(|_| panic!("hook exploded"));
        })
        .join();

        component.set_state("Count", 9).unwrap();
        assert!(component.render().unwrap().contains("Count: 9"));
    }
}
