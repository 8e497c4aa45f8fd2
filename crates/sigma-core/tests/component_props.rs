//! Property tests for component state and rendering.
//!
//! These tests verify:
//! - Renders never observe a multi-key write half-applied
//! - State values round-trip into rendered output
//! - Rendered text never contains unescaped markup from state

use proptest::prelude::*;
use sigma_core::Component;
use sigma_types::{StateValue, state_map};
use std::sync::Arc;
use std::thread;

fn pair_component() -> Arc<Component> {
    Arc::new(Component::new(
        "pair",
        "{{.A}}|{{.B}}",
        state_map([("A", 0), ("B", 0)]),
    ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn renders_never_see_torn_writes(values in prop::collection::vec(any::<i64>(), 1..64)) {
        let component = pair_component();

        let writer = {
            let component = component.clone();
            thread::spawn(move || {
                for value in values {
                    component.modify(|state| {
                        state.insert("A".into(), value.into());
                        state.insert("B".into(), value.into());
                    });
                }
            })
        };

        for _ in 0..200 {
            let html = component.render().unwrap();
            let (a, b) = html.split_once('|').unwrap();
            prop_assert_eq!(a, b);

            let snapshot = component.state();
            prop_assert_eq!(snapshot.get("A"), snapshot.get("B"));
        }
        writer.join().unwrap();
    }

    #[test]
    fn set_state_round_trips_into_render(n in any::<i64>()) {
        let component = Component::new("counter", "Count: {{.Count}}", state_map([("Count", 0)]));
        component.set_state("Count", n).unwrap();
        prop_assert_eq!(component.render().unwrap(), format!("Count: {}", n));
        prop_assert_eq!(component.get("Count"), Some(StateValue::Int(n)));
    }

    #[test]
    fn rendered_text_is_escaped(text in ".*") {
        let component = Component::new("echo", "<p>{{.Text}}</p>", state_map([("Text", text.as_str())]));
        let html = component.render().unwrap();
        let inner = html.strip_prefix("<p>").and_then(|s| s.strip_suffix("</p>")).unwrap();
        prop_assert!(!inner.contains('<'));
        prop_assert!(!inner.contains('>'));
        prop_assert!(!inner.contains('"'));
    }
}
