//! Demo applications served by the binary.

pub mod counter;
pub mod todo;

use crate::config::Config;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use sigma_core::{Component, Context, Sigma, debug_state, render_component};
use sigma_types::HealthResponse;
use std::sync::{Arc, Weak};

/// Register every demo component and route, plus `/health`.
pub fn install(sigma: &Arc<Sigma>, config: &Config, started_at: DateTime<Utc>) -> sigma_core::Result<()> {
    let interval = config.push_interval();
    counter::install(sigma, interval)?;
    todo::install(sigma, interval)?;
    install_health(sigma, started_at);
    Ok(())
}

/// `GET /fragment/<name>` and `GET /state/<name>` for a registered component.
fn install_inspection_routes(sigma: &Sigma, component: &Arc<Component>) {
    let name = component.name();
    sigma.get(format!("/fragment/{}", name), render_component(component.clone()));
    sigma.get(format!("/state/{}", name), debug_state(component.clone()));
}

fn install_health(sigma: &Arc<Sigma>, started_at: DateTime<Utc>) {
    // Weak: the route table lives inside the dispatcher itself.
    let registry: Weak<Sigma> = Arc::downgrade(sigma);
    sigma.get("/health", move |mut ctx: Context| {
        let components = registry
            .upgrade()
            .map(|sigma| sigma.component_names())
            .unwrap_or_default();
        async move {
            let health = HealthResponse {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                started_at,
                components,
            };
            if let Err(e) = ctx.json(&health) {
                ctx.error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            }
        }
    });
}

/// Full HTML document around a rendered fragment.
fn page(title: &str, fragment: &str, controls: &str, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<h1>{title}</h1>
{fragment}
{controls}
<script>
{script}
</script>
</body>
</html>
"#
    )
}

/// Page handler: render `component` into a document, or 500.
fn page_handler(
    component: Arc<Component>,
    title: &'static str,
    script: &'static str,
    controls: &'static str,
) -> impl sigma_core::Handler {
    move |mut ctx: Context| {
        let rendered = component.render();
        let name = component.name().to_string();
        async move {
            match rendered {
                Ok(fragment) => {
                    if let Err(e) = ctx.html(&page(title, &fragment, controls, script)) {
                        tracing::debug!(target: "sigma::http", "Failed to write page: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "sigma::dispatch", "Failed to render {}: {}", name, e);
                    ctx.error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render component");
                }
            }
        }
    }
}
