//! Ordered route table.
//!
//! Routes are kept in registration order and scanned linearly. The first
//! route whose pattern accepts the path *and* whose method matches wins:
//! first registered, first matched, not most specific. Register specific
//! patterns before catch-alls for the same method.
//!
//! Registration takes the write lock; lookups share the read lock, so any
//! number of requests can route concurrently while startup registration is
//! serialized against them.

use std::sync::Arc;

use http::{Method, StatusCode};
use parking_lot::RwLock;

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, Next};
use crate::middleware::{self, BoxedMiddleware};
use crate::pattern::{self, Matcher, Params, PatternError};

/// One registered route. Immutable once registered.
pub struct Route {
    method: Method,
    pattern: String,
    matcher: Matcher,
    handler: Next,
    middleware: Vec<BoxedMiddleware>,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The pattern exactly as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> &[String] {
        self.matcher.param_names()
    }

    /// The route handler wrapped in its middleware, group layers outermost.
    pub(crate) fn compose(&self) -> Next {
        middleware::wrap(self.handler.clone(), &self.middleware)
    }
}

/// Outcome of [`RouteTable::lookup`].
pub enum Lookup {
    Found { route: Arc<Route>, params: Params },
    /// Some route accepts the path, none of them for this method.
    MethodNotAllowed,
    NotFound,
}

struct Fallbacks {
    not_found: Next,
    method_not_allowed: Next,
}

/// The application's routes plus its 404/405 terminal handlers.
pub struct RouteTable {
    routes: RwLock<Vec<Arc<Route>>>,
    fallbacks: RwLock<Fallbacks>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            fallbacks: RwLock::new(Fallbacks {
                not_found: Next::new(default_not_found),
                method_not_allowed: Next::new(default_method_not_allowed),
            }),
        }
    }

    /// Compiles `pattern` and appends the route.
    ///
    /// Overlapping and duplicate patterns are accepted; lookup order decides.
    pub fn register(
        &self,
        method: Method,
        pattern: &str,
        handler: Next,
        middleware: Vec<BoxedMiddleware>,
    ) -> Result<(), PatternError> {
        let matcher = pattern::compile(pattern)?;
        let route = Arc::new(Route {
            method,
            pattern: pattern.to_owned(),
            matcher,
            handler,
            middleware,
        });
        self.routes.write().push(route);
        Ok(())
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let routes = self.routes.read();
        let mut path_matched = false;
        for route in routes.iter() {
            let Some(params) = route.matcher.captures(path) else {
                continue;
            };
            if route.method == *method {
                return Lookup::Found { route: Arc::clone(route), params };
            }
            path_matched = true;
        }
        if path_matched {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }

    pub fn set_not_found(&self, handler: impl Handler) {
        self.fallbacks.write().not_found = Next::new(handler);
    }

    pub fn set_method_not_allowed(&self, handler: impl Handler) {
        self.fallbacks.write().method_not_allowed = Next::new(handler);
    }

    pub fn not_found(&self) -> Next {
        self.fallbacks.read().not_found.clone()
    }

    pub fn method_not_allowed(&self) -> Next {
        self.fallbacks.read().method_not_allowed.clone()
    }

    /// Snapshot of the registered routes, in registration order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// The dispatcher's terminal step: route `ctx`, then run the matched
    /// route's chain or the matching fallback.
    pub(crate) fn route(&self, ctx: Context) -> BoxFuture {
        match self.lookup(ctx.method(), ctx.path()) {
            Lookup::Found { route, params } => {
                ctx.set_params(params);
                route.compose().run(ctx)
            }
            Lookup::MethodNotAllowed => self.method_not_allowed().run(ctx),
            Lookup::NotFound => self.not_found().run(ctx),
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

async fn default_not_found(c: Context) -> Result<(), Error> {
    c.error(StatusCode::NOT_FOUND, "route not found")
}

async fn default_method_not_allowed(c: Context) -> Result<(), Error> {
    c.error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
