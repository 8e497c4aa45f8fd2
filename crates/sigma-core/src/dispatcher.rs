//! Exact-match request dispatcher and component registry.

use crate::Result;
use crate::component::Component;
use crate::context::{Context, Request};
use crate::error::SigmaError;
use crate::response::ResponseWriter;
use axum::http::Method;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// A request handler.
///
/// Implemented for any `Fn(Context) -> impl Future<Output = ()>` closure, so
/// routes can be registered as plain async closures.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture<'static, ()>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, ()> {
        Box::pin(self(ctx))
    }
}

type Routes = HashMap<Method, HashMap<String, Arc<dyn Handler>>>;

/// Owns the route table and the component registry.
///
/// Constructed once at startup and shared as `Arc<Sigma>` with every
/// request task. Registration takes a write lock, so it is safe at any time,
/// but locks are never held while a handler runs.
#[derive(Default)]
pub struct Sigma {
    routes: RwLock<Routes>,
    components: RwLock<HashMap<String, Arc<Component>>>,
}

impl Sigma {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for an exact method and path, replacing any
    /// previous handler for the pair.
    pub fn handle(&self, method: Method, path: impl Into<String>, handler: impl Handler) {
        let path = path.into();
        let mut routes = write(&self.routes);
        let replaced = routes
            .entry(method.clone())
            .or_default()
            .insert(path.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            debug!(target: "sigma::dispatch", "Replaced handler for {} {}", method, path);
        } else {
            debug!(target: "sigma::dispatch", "Registered handler for {} {}", method, path);
        }
    }

    pub fn get(&self, path: impl Into<String>, handler: impl Handler) {
        self.handle(Method::GET, path, handler);
    }

    pub fn post(&self, path: impl Into<String>, handler: impl Handler) {
        self.handle(Method::POST, path, handler);
    }

    /// Add a component to the registry under its name. A later component
    /// with the same name replaces the earlier one.
    pub fn register_component(&self, component: Arc<Component>) -> Result<()> {
        let name = component.name().to_string();
        if name.trim().is_empty() {
            return Err(SigmaError::InvalidComponentName(name));
        }
        info!(target: "sigma::component", "Registered component {}", name);
        write(&self.components).insert(name, component);
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<Arc<Component>> {
        read(&self.components).get(name).cloned()
    }

    /// Registered component names, sorted.
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.components).keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered (method, path) pairs, sorted.
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut pairs: Vec<(Method, String)> = read(&self.routes)
            .iter()
            .flat_map(|(method, paths)| {
                paths.keys().map(move |path| (method.clone(), path.clone()))
            })
            .collect();
        pairs.sort_by(|a, b| (a.1.as_str(), a.0.as_str()).cmp(&(b.1.as_str(), b.0.as_str())));
        pairs
    }

    /// Route one request to its handler.
    ///
    /// An unknown method gets `405 Method not allowed`, an unknown path under
    /// a known method gets `404 Not found`; in both cases no handler runs
    /// and the corresponding error is returned after the response is written.
    pub async fn dispatch(&self, request: Request, response: Box<dyn ResponseWriter>) -> Result<()> {
        let lookup = {
            let routes = read(&self.routes);
            match routes.get(&request.method) {
                None => Err(SigmaError::MethodNotAllowed(request.method.clone())),
                Some(paths) => paths
                    .get(&request.path)
                    .cloned()
                    .ok_or_else(|| SigmaError::NotFound {
                        method: request.method.clone(),
                        path: request.path.clone(),
                    }),
            }
        };

        let mut ctx = Context::new(request, response);
        match lookup {
            Ok(handler) => {
                debug!(target: "sigma::dispatch", "{} {}", ctx.method(), ctx.path());
                handler.call(ctx).await;
                Ok(())
            }
            Err(e) => {
                debug!(target: "sigma::dispatch", "Rejected {} {}: {}", ctx.method(), ctx.path(), e);
                let message = match e {
                    SigmaError::MethodNotAllowed(_) => "Method not allowed",
                    _ => "Not found",
                };
                ctx.error(e.status_code(), message);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Sigma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sigma")
            .field("routes", &self.routes())
            .field("components", &self.component_names())
            .finish()
    }
}

// Registration happens outside handlers, so a poisoned lock still holds a
// consistent table.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
