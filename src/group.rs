//! Route groups: a shared prefix plus shared middleware.
//!
//! ```rust,no_run
//! # use switchyard::{App, Context, Result, middleware};
//! # async fn list_users(_: Context) -> Result { Ok(()) }
//! # async fn stats(_: Context) -> Result { Ok(()) }
//! # let auth = middleware::boxed(|n| n);
//! # let admin_only = middleware::boxed(|n| n);
//! let app = App::new();
//!
//! let api = app.group("/api/v1", [auth]);
//! api.get("/users", list_users);            // GET /api/v1/users, [auth]
//!
//! let admin = api.group("/admin", [admin_only]);
//! admin.get("/stats", stats);               // GET /api/v1/admin/stats, [auth, admin_only]
//! ```
//!
//! A child copies its parent's middleware when it is created. Adding
//! middleware to a group later affects only routes registered on that group
//! afterwards, never its existing children or its parent.

use std::sync::Arc;

use http::Method;

use crate::handler::{Handler, Next};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::router::RouteTable;
use crate::static_files;

/// Methods registered by [`Group::any`], in registration order.
const ANY_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
    Method::HEAD,
];

/// A prefix and middleware accumulator that registers into a shared
/// [`RouteTable`].
#[derive(Clone)]
pub struct Group {
    prefix: String,
    table: Arc<RouteTable>,
    middleware: Vec<BoxedMiddleware>,
}

impl Group {
    pub(crate) fn new(
        table: Arc<RouteTable>,
        prefix: &str,
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
    ) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            table,
            middleware: middleware.into_iter().collect(),
        }
    }

    /// Creates a nested group. Its prefix is this group's prefix followed by
    /// `prefix`; its middleware is this group's list followed by `middleware`.
    pub fn group(
        &self,
        prefix: &str,
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
    ) -> Group {
        let mut combined = self.middleware.clone();
        combined.extend(middleware);
        Group {
            prefix: format!("{}{}", self.prefix, normalize_prefix(prefix)),
            table: Arc::clone(&self.table),
            middleware: combined,
        }
    }

    /// Appends middleware for routes registered on this group from now on.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registers `handler` for `method` at `prefix + pattern`, wrapped in the
    /// group's middleware followed by `middleware`.
    ///
    /// # Panics
    ///
    /// Panics if a `{name:constraint}` constraint is not a valid regex.
    pub fn handle(
        &self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
    ) -> &Self {
        self.register(method, pattern, Next::new(handler), middleware.into_iter().collect());
        self
    }

    pub fn get(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::GET, pattern, handler, [])
    }

    pub fn post(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::POST, pattern, handler, [])
    }

    pub fn put(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PUT, pattern, handler, [])
    }

    pub fn patch(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PATCH, pattern, handler, [])
    }

    pub fn delete(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::DELETE, pattern, handler, [])
    }

    pub fn options(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::OPTIONS, pattern, handler, [])
    }

    pub fn head(&self, pattern: &str, handler: impl Handler) -> &Self {
        self.handle(Method::HEAD, pattern, handler, [])
    }

    /// Registers `handler` for GET, POST, PUT, PATCH, DELETE, OPTIONS and HEAD.
    pub fn any(&self, pattern: &str, handler: impl Handler) -> &Self {
        let handler = Next::new(handler);
        for method in ANY_METHODS {
            self.register(method, pattern, handler.clone(), Vec::new());
        }
        self
    }

    /// Serves files under `root` at `GET prefix + relative/{filepath:.*}`.
    pub fn static_files(&self, relative: &str, root: impl Into<std::path::PathBuf>) -> &Self {
        let pattern = format!("{}/{{filepath:.*}}", relative.trim_end_matches('/'));
        self.handle(Method::GET, &pattern, static_files::handler(root.into()), [])
    }

    fn register(&self, method: Method, pattern: &str, handler: Next, middleware: Vec<BoxedMiddleware>) {
        let mut all = self.middleware.clone();
        all.extend(middleware);
        let full = format!("{}{pattern}", self.prefix);
        self.table
            .register(method, &full, handler, all)
            .unwrap_or_else(|e| panic!("invalid route `{full}`: {e}"));
    }
}

/// Drops trailing separators and guarantees a leading one, so `"api/"`,
/// `"/api"` and `"/api/"` are the same prefix. `""` and `"/"` are empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Error;
    use crate::middleware::boxed;

    async fn noop(_c: Context) -> Result<(), Error> {
        Ok(())
    }

    fn patterns(table: &RouteTable) -> Vec<(Method, String)> {
        table
            .routes()
            .iter()
            .map(|r| (r.method().clone(), r.pattern().to_owned()))
            .collect()
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/api/v1//"), "/api/v1");
    }

    #[test]
    fn nested_prefixes_concatenate() {
        let table = Arc::new(RouteTable::new());
        let api = Group::new(Arc::clone(&table), "/api/", []);
        let admin = api.group("admin", []);
        admin.get("/stats", noop);
        api.post("/users", noop);
        assert_eq!(admin.prefix(), "/api/admin");
        assert_eq!(
            patterns(&table),
            [
                (Method::GET, "/api/admin/stats".to_owned()),
                (Method::POST, "/api/users".to_owned()),
            ]
        );
    }

    #[test]
    fn child_never_mutates_parent_middleware() {
        let table = Arc::new(RouteTable::new());
        let mut parent = Group::new(Arc::clone(&table), "/p", [boxed(|n: Next| n)]);
        let child = parent.group("/c", [boxed(|n: Next| n)]);
        parent.use_middleware(|n: Next| n);
        assert_eq!(parent.middleware.len(), 2);
        assert_eq!(child.middleware.len(), 2);

        let grandchild = child.group("/g", []);
        assert_eq!(grandchild.middleware.len(), 2);
    }

    #[test]
    fn any_registers_seven_methods() {
        let table = Arc::new(RouteTable::new());
        Group::new(Arc::clone(&table), "", []).any("/x", noop);
        let methods: Vec<_> = patterns(&table).into_iter().map(|(m, _)| m).collect();
        assert_eq!(methods, ANY_METHODS);
    }

    #[test]
    #[should_panic(expected = "invalid route `/g/{id:[}`")]
    fn invalid_constraint_panics_at_registration() {
        let table = Arc::new(RouteTable::new());
        Group::new(table, "/g", []).get("/{id:[}", noop);
    }
}
